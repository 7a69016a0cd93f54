//! Bookkeeping applied to a task after its bot ran.

use chrono::{DateTime, TimeZone, Utc};

use crate::core::schedule::{ScheduleOverflow, advance_next_run};
use crate::task::Task;

/// What one executor run of a bot produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exec_secs: f64,
    pub finished_at: DateTime<Utc>,
}

/// Round to millisecond precision, the resolution stats are stored at.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Fold a run into the task's schedule and statistics.
pub fn apply_run_result<Tz: TimeZone>(
    task: &mut Task,
    result: &RunResult,
    tz: &Tz,
) -> Result<(), ScheduleOverflow> {
    task.next_run = advance_next_run(
        task.next_run,
        task.schedule_interval,
        task.skip_intervals,
        result.finished_at,
        tz,
    )?;
    task.last_run = Some(result.finished_at);
    task.run_count = task.run_count.saturating_add(1);

    let last = round3(result.exec_secs.max(0.0));
    task.last_exec_time = Some(last);
    let prev_avg = task.avg_exec_time.unwrap_or(0.0);
    let count = f64::from(task.run_count);
    task.avg_exec_time = Some(round3((prev_avg * (count - 1.0) + last) / count));

    task.prev_five_success.record(result.success);
    task.last_note = run_note(result);
    Ok(())
}

fn run_note(result: &RunResult) -> String {
    let stderr = result.stderr.trim();
    if !result.success && !stderr.is_empty() {
        return stderr.to_string();
    }
    result.stdout.trim().to_string()
}
