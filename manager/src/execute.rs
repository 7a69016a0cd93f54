//! Orchestration for `life-manager run-due`, the launchd wake-up entry point.
//!
//! Runs every active task due within the lookahead window, in next-run order,
//! then re-arms the wake-up for whatever comes next.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{info, instrument, warn};

use crate::core::selector::{due_tasks, next_wake};
use crate::core::stats::{RunResult, apply_run_result, round3};
use crate::io::bot_runner::{BotRequest, BotRunner, run_with_retry};
use crate::io::clock::Clock;
use crate::io::config::ManagerConfig;
use crate::io::launchd::Scheduler;
use crate::io::notify::Notifier;
use crate::io::run_log::{RunRecord, append_run};
use crate::manager::TaskManager;
use crate::task::Task;

/// Executor knobs, taken from [`ManagerConfig`].
#[derive(Debug, Clone)]
pub struct ExecuteSettings {
    pub interpreter: String,
    pub lookahead: chrono::Duration,
    pub bot_timeout: Duration,
    pub output_limit_bytes: usize,
    pub retries: u32,
    pub notifications: bool,
    pub run_log_path: PathBuf,
}

impl ExecuteSettings {
    pub fn from_config(cfg: &ManagerConfig, run_log_path: &Path) -> Self {
        Self {
            interpreter: cfg.python.clone(),
            lookahead: cfg.lookahead(),
            bot_timeout: cfg.bot_timeout(),
            output_limit_bytes: cfg.bot_output_limit_bytes,
            retries: cfg.retries,
            notifications: cfg.notifications,
            run_log_path: run_log_path.to_path_buf(),
        }
    }
}

/// One executed task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub project_name: String,
    pub success: bool,
    pub attempts: u32,
    pub timed_out: bool,
    pub exec_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutcome {
    /// Tasks whose status change date was reached.
    pub status_changes: usize,
    pub runs: Vec<TaskRun>,
    /// Earliest active next run or pending status change after the batch.
    pub next_wake: Option<DateTime<Utc>>,
}

impl ExecuteOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.runs.iter().all(|run| run.success)
    }
}

/// Run the due tasks and persist their statistics.
///
/// A failing bot never stops the batch; errors are limited to the task table
/// and the schedule itself.
#[instrument(skip_all)]
pub fn run_due<S, R, N, C, Tz>(
    manager: &mut TaskManager<S>,
    runner: &R,
    notifier: &N,
    clock: &C,
    tz: &Tz,
    settings: &ExecuteSettings,
) -> Result<ExecuteOutcome>
where
    S: Scheduler,
    R: BotRunner,
    N: Notifier,
    C: Clock,
    Tz: TimeZone,
{
    let now = clock.now();
    manager.reload()?;
    let status_changes = manager.apply_status_changes(now)?.len();
    let due: Vec<Task> = due_tasks(manager.tasks(), now, settings.lookahead)
        .into_iter()
        .map(|index| manager.tasks()[index].clone())
        .collect();
    info!(due = due.len(), status_changes, "executor woke up");

    let mut runs = Vec::with_capacity(due.len());
    for selected in due {
        if selected.next_run > clock.now() {
            clock.sleep_until(selected.next_run);
        }

        // The table may have been edited while earlier bots ran.
        manager.reload()?;
        let Some(index) = manager.position_of(&selected) else {
            info!(project = %selected.project_name, "task deleted before its run, skipping");
            continue;
        };
        let mut task = manager.tasks()[index].clone();
        if !task.is_active() {
            info!(project = %task.project_name, "task paused before its run, skipping");
            continue;
        }

        let request = BotRequest::for_task(
            &task,
            &settings.interpreter,
            settings.bot_timeout,
            settings.output_limit_bytes,
            settings.retries,
        );
        let started_at = clock.now();
        let output = run_with_retry(runner, &request);
        let finished_at = clock.now();
        let exec_secs = round3((finished_at - started_at).num_milliseconds() as f64 / 1000.0);

        let result = RunResult {
            success: output.success,
            stdout: output.stdout,
            stderr: output.stderr,
            exec_secs,
            finished_at,
        };
        apply_run_result(&mut task, &result, tz)?;
        manager.update_latest(&task, |row| {
            apply_run_result(row, &result, tz)?;
            Ok(())
        })?;

        let record = RunRecord {
            project_name: task.project_name.clone(),
            started_at,
            finished_at,
            exec_secs,
            success: output.success,
            attempts: output.attempts,
            timed_out: output.timed_out,
            note: task.last_note.clone(),
        };
        if let Err(err) = append_run(&settings.run_log_path, &record) {
            let reason = format!("{err:#}");
            warn!(project = %task.project_name, err = %reason, "failed to record run");
        }
        if settings.notifications && task.notify_on_run {
            notify_run(notifier, &task, output.success);
        }

        runs.push(TaskRun {
            project_name: task.project_name,
            success: output.success,
            attempts: output.attempts,
            timed_out: output.timed_out,
            exec_secs,
        });
    }

    manager.reload()?;
    manager.sync_schedule_at(clock.now())?;
    let next_wake = next_wake(manager.tasks());
    Ok(ExecuteOutcome {
        status_changes,
        runs,
        next_wake,
    })
}

fn notify_run<N: Notifier>(notifier: &N, task: &Task, success: bool) {
    let first_line = task.last_note.lines().next().unwrap_or("");
    let message = match (success, first_line.is_empty()) {
        (true, true) => "Run succeeded".to_string(),
        (true, false) => format!("Run succeeded: {first_line}"),
        (false, true) => "Run failed".to_string(),
        (false, false) => format!("Run failed: {first_line}"),
    };
    if let Err(err) = notifier.notify(&task.project_name, &message) {
        warn!(project = %task.project_name, err = %err, "notification failed");
    }
}
