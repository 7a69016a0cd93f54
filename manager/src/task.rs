//! Task (bot) data model shared by the store, the form and the executor.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of recent runs tracked in [`SuccessHistory`].
pub const HISTORY_LEN: usize = 5;

/// Unit a task's schedule repeats in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScheduleInterval {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl ScheduleInterval {
    pub const ALL: [ScheduleInterval; 6] = [
        ScheduleInterval::Minutes,
        ScheduleInterval::Hours,
        ScheduleInterval::Days,
        ScheduleInterval::Weeks,
        ScheduleInterval::Months,
        ScheduleInterval::Years,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleInterval::Minutes => "Minutes",
            ScheduleInterval::Hours => "Hours",
            ScheduleInterval::Days => "Days",
            ScheduleInterval::Weeks => "Weeks",
            ScheduleInterval::Months => "Months",
            ScheduleInterval::Years => "Years",
        }
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleInterval {
    type Err = anyhow::Error;

    /// Case-insensitive; stored tables may carry `weeks` as well as `Weeks`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        ScheduleInterval::ALL
            .into_iter()
            .find(|interval| interval.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| anyhow!("unsupported interval: {trimmed}"))
    }
}

/// Whether the executor picks a task up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Active,
    Paused,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Active => "Active",
            TaskStatus::Paused => "Paused",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::Active => TaskStatus::Paused,
            TaskStatus::Paused => TaskStatus::Active,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("active") => Ok(TaskStatus::Active),
            v if v.eq_ignore_ascii_case("paused") => Ok(TaskStatus::Paused),
            other => Err(anyhow!("unknown status: {other}")),
        }
    }
}

/// Outcome slot in the recent-runs strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMark {
    Success,
    Failure,
    Unknown,
}

impl RunMark {
    fn as_char(self) -> char {
        match self {
            RunMark::Success => '1',
            RunMark::Failure => '0',
            RunMark::Unknown => '-',
        }
    }

    fn parse(s: &str) -> Self {
        match s.trim() {
            "1" => RunMark::Success,
            "0" => RunMark::Failure,
            _ => RunMark::Unknown,
        }
    }
}

/// Outcomes of the last five runs, newest first (`1|0|-|-|-`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessHistory([RunMark; HISTORY_LEN]);

impl Default for SuccessHistory {
    fn default() -> Self {
        Self([RunMark::Unknown; HISTORY_LEN])
    }
}

impl SuccessHistory {
    /// Push the newest outcome to the front, dropping the oldest.
    pub fn record(&mut self, success: bool) {
        self.0.rotate_right(1);
        self.0[0] = if success {
            RunMark::Success
        } else {
            RunMark::Failure
        };
    }

    pub fn marks(&self) -> &[RunMark; HISTORY_LEN] {
        &self.0
    }

    /// Parse the persisted form, padding with `-` or truncating to five slots.
    pub fn parse(raw: &str) -> Self {
        let mut marks = [RunMark::Unknown; HISTORY_LEN];
        if raw.trim().is_empty() {
            return Self(marks);
        }
        for (slot, part) in marks.iter_mut().zip(raw.split('|')) {
            *slot = RunMark::parse(part);
        }
        Self(marks)
    }
}

impl fmt::Display for SuccessHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mark) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{}", mark.as_char())?;
        }
        Ok(())
    }
}

/// One scheduled bot and its run statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub project_name: String,
    pub project_path: PathBuf,
    pub entry_module: String,
    pub next_run: DateTime<Utc>,
    pub schedule_interval: ScheduleInterval,
    pub skip_intervals: u32,
    pub status_change_date: Option<DateTime<Utc>>,
    pub notify_on_run: bool,
    pub date_created: DateTime<Utc>,
    pub status: TaskStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u32,
    pub last_exec_time: Option<f64>,
    pub avg_exec_time: Option<f64>,
    pub prev_five_success: SuccessHistory,
    pub last_note: String,
}

impl Task {
    /// A fresh, active task with empty statistics.
    pub fn new(
        project_name: impl Into<String>,
        project_path: impl Into<PathBuf>,
        entry_module: impl Into<String>,
        next_run: DateTime<Utc>,
        schedule_interval: ScheduleInterval,
        date_created: DateTime<Utc>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            project_path: project_path.into(),
            entry_module: entry_module.into(),
            next_run,
            schedule_interval,
            skip_intervals: 0,
            status_change_date: None,
            notify_on_run: true,
            date_created,
            status: TaskStatus::Active,
            last_run: None,
            run_count: 0,
            last_exec_time: None,
            avg_exec_time: None,
            prev_five_success: SuccessHistory::default(),
            last_note: String::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TaskStatus::Active
    }

    /// Path of the entry module the executor runs.
    pub fn script_path(&self) -> PathBuf {
        self.project_path.join(Path::new(&self.entry_module))
    }
}
