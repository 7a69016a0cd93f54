//! Command implementations behind the `life-manager` binary.
//!
//! Commands print user-facing output to stdout; diagnostics go through
//! `tracing` to stderr.

use std::fmt::Display;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone, Utc};
use clap::Args;

use crate::core::selector::next_wake;
use crate::execute::{ExecuteSettings, run_due};
use crate::exit_codes;
use crate::form::{TaskForm, default_module, list_modules};
use crate::io::bot_runner::PythonBotRunner;
use crate::io::clock::SystemClock;
use crate::io::config::{ManagerConfig, load_config};
use crate::io::launchd::{
    AgentSpec, DisabledScheduler, LaunchdScheduler, ScheduleChange, Scheduler, SystemLaunchctl,
    default_agents_dir,
};
use crate::io::notify::{Notifier, OsascriptNotifier, SilentNotifier};
use crate::io::paths::ManagerPaths;
use crate::io::run_log::{RunRecord, read_recent};
use crate::manager::TaskManager;
use crate::task::Task;

const DISPLAY_FORMAT: &str = "%m/%d/%Y %I:%M %p";
const DATE_FORMAT: &str = "%m/%d/%Y";

/// Resolved home directory and its configuration.
pub struct App {
    pub paths: ManagerPaths,
    pub config: ManagerConfig,
}

impl App {
    pub fn load(home: Option<&Path>) -> Result<Self> {
        let paths = ManagerPaths::resolve(home)?;
        paths.ensure_dirs()?;
        // launchd needs an absolute home in the agent's arguments.
        let home = fs::canonicalize(&paths.home)
            .with_context(|| format!("resolve home {}", paths.home.display()))?;
        let paths = ManagerPaths::new(home);
        let config = load_config(&paths.config_path)?;
        Ok(Self { paths, config })
    }

    pub fn scheduler(&self) -> Result<Box<dyn Scheduler>> {
        let launchd = &self.config.launchd;
        if !launchd.enabled {
            return Ok(Box::new(DisabledScheduler));
        }
        let program = std::env::current_exe().context("locate life-manager executable")?;
        let agents_dir = match &launchd.agents_dir {
            Some(dir) => dir.clone(),
            None => default_agents_dir()?,
        };
        let spec = AgentSpec::for_executor(
            &launchd.label,
            &program,
            &self.paths.home,
            &self.paths.executor_stdout_path,
            &self.paths.executor_stderr_path,
        );
        let mut scheduler = LaunchdScheduler::new(spec, &agents_dir, SystemLaunchctl);
        if std::env::var_os("LAUNCHD_JOB").is_some() {
            scheduler = scheduler.running_as_job(std::process::id());
        }
        Ok(Box::new(scheduler))
    }

    pub fn open_manager(&self) -> Result<TaskManager<Box<dyn Scheduler>>> {
        TaskManager::open(&self.paths.tasks_path, self.scheduler()?)
    }
}

/// Task form fields; unset flags keep the default (add) or current value (edit).
#[derive(Debug, Clone, Default, Args)]
pub struct TaskFields {
    /// Display name.
    #[arg(long)]
    pub name: Option<String>,
    /// Project directory.
    #[arg(long)]
    pub path: Option<String>,
    /// Entry module inside the project (defaults to main.py when present).
    #[arg(long)]
    pub module: Option<String>,
    /// First run date, MM/DD/YYYY.
    #[arg(long)]
    pub start_date: Option<String>,
    /// First run time on a 12-hour clock, e.g. 9:00.
    #[arg(long)]
    pub start_time: Option<String>,
    /// AM or PM.
    #[arg(long)]
    pub am_pm: Option<String>,
    /// Minutes, Hours, Days, Weeks, Months or Years.
    #[arg(long)]
    pub interval: Option<String>,
    /// Intervals skipped between runs.
    #[arg(long)]
    pub skip: Option<String>,
    /// Date (MM/DD/YYYY) on which the task pauses or resumes; empty clears it.
    #[arg(long)]
    pub status_change_date: Option<String>,
    /// Post a notification after each run.
    #[arg(long)]
    pub notify: Option<bool>,
}

impl TaskFields {
    pub fn apply(&self, form: &mut TaskForm) {
        let text_fields = [
            (&self.name, &mut form.project_name),
            (&self.path, &mut form.project_path),
            (&self.module, &mut form.entry_module),
            (&self.start_date, &mut form.start_date),
            (&self.start_time, &mut form.start_time),
            (&self.am_pm, &mut form.am_pm),
            (&self.interval, &mut form.schedule_interval),
            (&self.skip, &mut form.skip_intervals),
            (&self.status_change_date, &mut form.status_change_date),
        ];
        for (value, slot) in text_fields {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
        if let Some(notify) = self.notify {
            form.notify_on_run = notify;
        }
    }
}

pub fn cmd_list(app: &App) -> Result<()> {
    let manager = app.open_manager()?;
    print!("{}", render_task_table(manager.tasks(), &Local));
    Ok(())
}

pub fn cmd_show(app: &App, index: usize) -> Result<()> {
    let manager = app.open_manager()?;
    let task = manager.task(index)?;
    print!("{}", render_task_detail(index, task, &Local));
    Ok(())
}

pub fn cmd_add(app: &App, fields: &TaskFields) -> Result<()> {
    let now = Utc::now();
    let mut form = TaskForm::new_defaults(now.with_timezone(&Local).date_naive());
    fields.apply(&mut form);
    if form.entry_module.trim().is_empty() && !form.project_path.trim().is_empty() {
        let modules = list_modules(Path::new(form.project_path.trim())).unwrap_or_default();
        if let Some(module) = default_module(&modules) {
            form.entry_module = module.to_string();
        }
    }
    let valid = form.validate(now, &Local)?;

    let mut manager = app.open_manager()?;
    let index = manager.add_task(valid.into_task(now))?;
    let task = manager.task(index)?;
    println!(
        "Added task {index}: {} (next run {})",
        task.project_name,
        format_time(task.next_run, &Local)
    );
    Ok(())
}

pub fn cmd_edit(app: &App, index: usize, fields: &TaskFields) -> Result<()> {
    let now = Utc::now();
    let mut manager = app.open_manager()?;
    let mut task = manager.task(index)?.clone();
    let mut form = TaskForm::from_task(&task, &Local);
    fields.apply(&mut form);
    let valid = form.validate(now, &Local)?;
    valid.apply_to(&mut task);
    manager.edit_task(index, task)?;
    println!("Updated task {index}: {}", manager.task(index)?.project_name);
    Ok(())
}

pub fn cmd_delete(app: &App, index: usize) -> Result<()> {
    let mut manager = app.open_manager()?;
    let removed = manager.delete_task(index)?;
    println!("Deleted task {index}: {}", removed.project_name);
    Ok(())
}

pub fn cmd_toggle_status(app: &App, index: usize) -> Result<()> {
    let mut manager = app.open_manager()?;
    let status = manager.toggle_status(index, Utc::now(), &Local)?;
    let task = manager.task(index)?;
    println!(
        "{} is now {status} (next run {})",
        task.project_name,
        format_time(task.next_run, &Local)
    );
    Ok(())
}

pub fn cmd_toggle_notify(app: &App, index: usize) -> Result<()> {
    let mut manager = app.open_manager()?;
    let notify = manager.toggle_notify(index)?;
    let state = if notify { "on" } else { "off" };
    println!(
        "Notifications {state} for {}",
        manager.task(index)?.project_name
    );
    Ok(())
}

pub fn cmd_view(app: &App, index: usize) -> Result<()> {
    let manager = app.open_manager()?;
    manager.view_task(index, &app.config.editor.command)
}

pub fn cmd_modules(path: &Path) -> Result<()> {
    let modules = list_modules(path)?;
    if modules.is_empty() {
        println!("No Python modules in {}", path.display());
        return Ok(());
    }
    let default = default_module(&modules);
    for module in &modules {
        if Some(module.as_str()) == default {
            println!("{module} (default)");
        } else {
            println!("{module}");
        }
    }
    Ok(())
}

/// Run due tasks; the exit code reports whether every bot succeeded.
pub fn cmd_run_due(app: &App) -> Result<i32> {
    let mut manager = app.open_manager()?;
    let settings = ExecuteSettings::from_config(&app.config, &app.paths.run_log_path);
    let notifier: Box<dyn Notifier> = if cfg!(target_os = "macos") {
        Box::new(OsascriptNotifier)
    } else {
        Box::new(SilentNotifier)
    };
    let outcome = run_due(
        &mut manager,
        &PythonBotRunner,
        &notifier,
        &SystemClock,
        &Local,
        &settings,
    )?;

    for run in &outcome.runs {
        let result = if run.success { "ok" } else { "FAILED" };
        println!(
            "{}: {result} in {:.3}s ({} attempt{})",
            run.project_name,
            run.exec_secs,
            run.attempts,
            if run.attempts == 1 { "" } else { "s" }
        );
    }
    match outcome.next_wake {
        Some(at) => println!("Next run: {}", format_time(at, &Local)),
        None => println!("No active tasks"),
    }
    if outcome.all_succeeded() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::BOT_FAILURE)
    }
}

/// Re-arm the wake-up from the current table.
pub fn cmd_schedule(app: &App) -> Result<()> {
    let manager = app.open_manager()?;
    let change = manager.sync_schedule_at(Utc::now())?;
    let Some(next) = next_wake(manager.tasks()) else {
        println!("No active tasks; executor not scheduled");
        return Ok(());
    };
    let next = format_time(next, &Local);
    if !app.config.launchd.enabled {
        println!("launchd disabled; next run due {next}");
        return Ok(());
    }
    match change {
        Some(ScheduleChange::Armed) => println!("Scheduled executor for {next}"),
        _ => println!("Executor already scheduled for {next}"),
    }
    Ok(())
}

pub fn cmd_history(app: &App, limit: usize) -> Result<()> {
    let records = read_recent(&app.paths.run_log_path, limit)?;
    print!("{}", render_history(&records, &Local));
    Ok(())
}

/// The home view: one row per task.
pub fn render_task_table<Tz: TimeZone>(tasks: &[Task], tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    if tasks.is_empty() {
        return "No tasks yet. Add one with `life-manager add`.\n".to_string();
    }
    let headers = [
        "#", "Notify", "Project", "Status", "Change Date", "Interval", "Skips", "Next Run",
        "Runs", "Avg (s)", "Last 5",
    ];
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            vec![
                index.to_string(),
                if task.notify_on_run { "on" } else { "off" }.to_string(),
                task.project_name.clone(),
                task.status.to_string(),
                task.status_change_date
                    .map(|dt| dt.with_timezone(tz).format(DATE_FORMAT).to_string())
                    .unwrap_or_default(),
                task.schedule_interval.to_string(),
                task.skip_intervals.to_string(),
                format_time(task.next_run, tz),
                task.run_count.to_string(),
                format_secs(task.avg_exec_time),
                task.prev_five_success.to_string(),
            ]
        })
        .collect();
    render_table(&headers, &rows)
}

pub fn render_task_detail<Tz: TimeZone>(index: usize, task: &Task, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let optional_time = |dt: Option<DateTime<Utc>>| {
        dt.map(|dt| format_time(dt, tz)).unwrap_or_else(|| "-".to_string())
    };
    let lines = [
        ("Task", index.to_string()),
        ("Project", task.project_name.clone()),
        ("Path", task.project_path.display().to_string()),
        ("Module", task.entry_module.clone()),
        ("Status", task.status.to_string()),
        ("Status change", optional_time(task.status_change_date)),
        (
            "Schedule",
            format!(
                "every {} {} (skipping {})",
                task.skip_intervals.saturating_add(1),
                task.schedule_interval,
                task.skip_intervals
            ),
        ),
        ("Next run", format_time(task.next_run, tz)),
        ("Notify", if task.notify_on_run { "on" } else { "off" }.to_string()),
        ("Created", format_time(task.date_created, tz)),
        ("Last run", optional_time(task.last_run)),
        ("Runs", task.run_count.to_string()),
        ("Last exec (s)", format_secs(task.last_exec_time)),
        ("Avg exec (s)", format_secs(task.avg_exec_time)),
        ("Last 5", task.prev_five_success.to_string()),
    ];
    let width = lines.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (label, value) in lines {
        out.push_str(&format!("{label:<width$}  {value}\n"));
    }
    if !task.last_note.is_empty() {
        out.push_str("\nLast note:\n");
        for line in task.last_note.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out
}

pub fn render_history<Tz: TimeZone>(records: &[RunRecord], tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    if records.is_empty() {
        return "No runs recorded yet.\n".to_string();
    }
    let headers = ["Finished", "Project", "Result", "Attempts", "Secs", "Note"];
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let result = match (record.success, record.timed_out) {
                (true, _) => "ok",
                (false, true) => "timeout",
                (false, false) => "failed",
            };
            vec![
                format_time(record.finished_at, tz),
                record.project_name.clone(),
                result.to_string(),
                record.attempts.to_string(),
                format!("{:.3}", record.exec_secs),
                record.note.lines().next().unwrap_or("").to_string(),
            ]
        })
        .collect();
    render_table(&headers, &rows)
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let mut out = String::new();
    let header_cells: Vec<String> = headers.iter().map(|h| (*h).to_string()).collect();
    push_row(&mut out, &header_cells, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}

fn format_time<Tz: TimeZone>(dt: DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    dt.with_timezone(tz).format(DISPLAY_FORMAT).to_string()
}

fn format_secs(secs: Option<f64>) -> String {
    secs.map(|s| format!("{s:.3}")).unwrap_or_default()
}
