//! CSV persistence for the task table.
//!
//! Timestamps are stored as Unix seconds (UTC, fractional) and absent values
//! as empty cells, so the file stays readable by spreadsheet tools.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::task::{SuccessHistory, Task};

/// Column order of the persisted table.
pub const COLUMNS: [&str; 16] = [
    "project_name",
    "project_path",
    "entry_module",
    "next_run",
    "schedule_interval",
    "skip_intervals",
    "status_change_date",
    "notify_on_run",
    "date_created",
    "status",
    "last_run",
    "run_count",
    "last_exec_time",
    "avg_exec_time",
    "prev_five_success",
    "last_note",
];

/// One CSV row, field for field.
#[derive(Debug, Serialize, Deserialize)]
struct TaskRecord {
    project_name: String,
    project_path: String,
    entry_module: String,
    next_run: Option<f64>,
    schedule_interval: String,
    #[serde(default)]
    skip_intervals: Option<f64>,
    status_change_date: Option<f64>,
    #[serde(default)]
    notify_on_run: Option<f64>,
    date_created: Option<f64>,
    status: String,
    last_run: Option<f64>,
    #[serde(default)]
    run_count: Option<f64>,
    last_exec_time: Option<f64>,
    avg_exec_time: Option<f64>,
    #[serde(default)]
    prev_five_success: String,
    #[serde(default)]
    last_note: String,
}

impl TaskRecord {
    fn from_task(task: &Task) -> Self {
        Self {
            project_name: task.project_name.clone(),
            project_path: task.project_path.display().to_string(),
            entry_module: task.entry_module.clone(),
            next_run: Some(to_epoch(task.next_run)),
            schedule_interval: task.schedule_interval.to_string(),
            skip_intervals: Some(f64::from(task.skip_intervals)),
            status_change_date: task.status_change_date.map(to_epoch),
            notify_on_run: Some(if task.notify_on_run { 1.0 } else { 0.0 }),
            date_created: Some(to_epoch(task.date_created)),
            status: task.status.to_string(),
            last_run: task.last_run.map(to_epoch),
            run_count: Some(f64::from(task.run_count)),
            last_exec_time: task.last_exec_time,
            avg_exec_time: task.avg_exec_time,
            prev_five_success: task.prev_five_success.to_string(),
            last_note: task.last_note.clone(),
        }
    }

    fn into_task(self) -> Result<Task> {
        let next_run = self
            .next_run
            .and_then(from_epoch)
            .ok_or_else(|| anyhow!("missing or invalid next_run"))?;
        let date_created = self.date_created.and_then(from_epoch).unwrap_or(next_run);
        Ok(Task {
            project_name: self.project_name,
            project_path: PathBuf::from(self.project_path),
            entry_module: self.entry_module,
            next_run,
            schedule_interval: self.schedule_interval.parse()?,
            skip_intervals: whole(self.skip_intervals, "skip_intervals")?,
            status_change_date: self.status_change_date.and_then(from_epoch),
            notify_on_run: self.notify_on_run.is_some_and(|v| v != 0.0),
            date_created,
            status: self.status.parse()?,
            last_run: self.last_run.and_then(from_epoch),
            run_count: whole(self.run_count, "run_count")?,
            last_exec_time: self.last_exec_time,
            avg_exec_time: self.avg_exec_time,
            prev_five_success: SuccessHistory::parse(&self.prev_five_success),
            last_note: self.last_note,
        })
    }
}

/// Load the task table; a missing file yields an empty table and is created.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    if !path.exists() {
        info!(path = %path.display(), "tasks file not found, creating an empty table");
        save_tasks(path, &[])?;
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("open tasks {}", path.display()))?;
    let tasks =
        read_tasks(file).with_context(|| format!("parse tasks {}", path.display()))?;
    debug!(path = %path.display(), count = tasks.len(), "loaded tasks");
    Ok(tasks)
}

/// Atomically write the task table (temp file + rename).
pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("tasks path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("csv.tmp");
    let file = fs::File::create(&tmp_path)
        .with_context(|| format!("create temp tasks {}", tmp_path.display()))?;
    write_tasks(file, tasks).with_context(|| format!("write temp tasks {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace tasks {}", path.display()))?;
    debug!(path = %path.display(), count = tasks.len(), "saved tasks");
    Ok(())
}

fn read_tasks<R: Read>(rdr: R) -> Result<Vec<Task>> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut tasks = Vec::new();
    for (row, result) in reader.deserialize::<TaskRecord>().enumerate() {
        let record = result.with_context(|| format!("row {row}"))?;
        tasks.push(record.into_task().with_context(|| format!("row {row}"))?);
    }
    Ok(tasks)
}

fn write_tasks<W: Write>(wtr: W, tasks: &[Task]) -> Result<()> {
    // Header written by hand so an empty table still carries it.
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(wtr);
    writer.write_record(COLUMNS).context("write header")?;
    for task in tasks {
        writer
            .serialize(TaskRecord::from_task(task))
            .with_context(|| format!("write task {}", task.project_name))?;
    }
    writer.flush().context("flush tasks")?;
    Ok(())
}

fn to_epoch(dt: DateTime<Utc>) -> f64 {
    dt.timestamp_millis() as f64 / 1000.0
}

fn from_epoch(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

fn whole(value: Option<f64>, column: &str) -> Result<u32> {
    let value = value.unwrap_or(0.0);
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(anyhow!("{column} must be a non-negative integer, got {value}"));
    }
    Ok(value as u32)
}
