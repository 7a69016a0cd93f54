//! Append-only run history (`runs.jsonl`), one JSON object per bot run.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub project_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exec_secs: f64,
    pub success: bool,
    pub attempts: u32,
    pub timed_out: bool,
    pub note: String,
}

/// Append one record. A torn final line is terminated first so the new
/// record starts on a line of its own.
pub fn append_run(path: &Path, record: &RunRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open run log {}", path.display()))?;

    let mut line = String::new();
    let at_line_start = ends_with_newline(&mut file)
        .with_context(|| format!("read run log {}", path.display()))?;
    if !at_line_start {
        line.push('\n');
    }
    line.push_str(&serde_json::to_string(record).context("serialize run record")?);
    line.push('\n');
    file.write_all(line.as_bytes())
        .with_context(|| format!("append run log {}", path.display()))?;
    debug!(project = %record.project_name, "recorded run");
    Ok(())
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// The newest `limit` records, oldest first. A missing log is empty.
///
/// Unparseable lines (e.g. a torn final write) are skipped with a warning.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<RunRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("open run log {}", path.display()))?;
    let mut recent = VecDeque::with_capacity(limit.min(1024));
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read run log {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RunRecord>(&line) {
            Ok(record) => {
                if limit == 0 {
                    continue;
                }
                if recent.len() == limit {
                    recent.pop_front();
                }
                recent.push_back(record);
            }
            Err(err) => warn!(line = lineno + 1, err = %err, "skipping malformed run record"),
        }
    }
    Ok(recent.into())
}
