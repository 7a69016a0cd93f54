//! Manager configuration stored as `config.toml` in the home directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Manager configuration (TOML).
///
/// Edited by hand; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Interpreter used to run entry modules.
    pub python: String,

    /// Tasks due within this many minutes of a wake-up run in the same batch.
    pub lookahead_minutes: u32,

    /// Wall-clock limit for a single bot attempt.
    pub bot_timeout_secs: u64,

    /// Bytes of stdout/stderr kept per bot attempt.
    pub bot_output_limit_bytes: usize,

    /// Extra attempts after a failed bot run.
    pub retries: u32,

    /// Post desktop notifications for tasks with `notify_on_run`.
    pub notifications: bool,

    pub launchd: LaunchdConfig,

    pub editor: EditorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LaunchdConfig {
    /// Arm a launchd agent; off macOS the schedule is only logged.
    pub enabled: bool,
    pub label: String,
    /// Defaults to `~/Library/LaunchAgents`.
    pub agents_dir: Option<PathBuf>,
}

impl Default for LaunchdConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(target_os = "macos"),
            label: "com.life_manager.execute".to_string(),
            agents_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EditorConfig {
    /// Command that opens a project; the project path is appended.
    pub command: Vec<String>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            command: vec!["open".to_string(), "-a".to_string(), "PyCharm CE".to_string()],
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            lookahead_minutes: 5,
            bot_timeout_secs: 60 * 60,
            bot_output_limit_bytes: 100_000,
            retries: 1,
            notifications: true,
            launchd: LaunchdConfig::default(),
            editor: EditorConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.python.trim().is_empty() {
            return Err(anyhow!("python must be non-empty"));
        }
        if self.bot_timeout_secs == 0 {
            return Err(anyhow!("bot_timeout_secs must be > 0"));
        }
        if self.bot_output_limit_bytes == 0 {
            return Err(anyhow!("bot_output_limit_bytes must be > 0"));
        }
        if self.launchd.label.trim().is_empty() {
            return Err(anyhow!("launchd.label must be non-empty"));
        }
        if self.editor.command.is_empty() || self.editor.command[0].trim().is_empty() {
            return Err(anyhow!("editor.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn lookahead(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.lookahead_minutes))
    }

    pub fn bot_timeout(&self) -> Duration {
        Duration::from_secs(self.bot_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ManagerConfig::default()`.
pub fn load_config(path: &Path) -> Result<ManagerConfig> {
    if !path.exists() {
        let cfg = ManagerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ManagerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ManagerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
