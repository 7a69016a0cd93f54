//! `life-manager`: schedule and run personal bots.
//!
//! With no subcommand the binary shows the task table, unless it was started
//! by its launchd agent (`LAUNCHD_JOB` set), in which case it runs due tasks.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};

use life_manager::cli::{self, App, TaskFields};
use life_manager::exit_codes;
use life_manager::form::FormError;
use life_manager::logging;

#[derive(Parser)]
#[command(
    name = "life-manager",
    version,
    about = "Schedule-based runner for personal Python bots"
)]
struct Cli {
    /// Data directory holding tasks, config and logs.
    #[arg(long, global = true, env = "LIFE_MANAGER_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show the task table.
    List,
    /// Show every field of one task.
    Show { index: usize },
    /// Add a task.
    Add(TaskFields),
    /// Edit a task; only the given fields change.
    Edit {
        index: usize,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Delete a task.
    Delete { index: usize },
    /// Pause or resume a task.
    ToggleStatus { index: usize },
    /// Turn run notifications on or off for a task.
    ToggleNotify { index: usize },
    /// Open a task's project in the configured editor.
    View { index: usize },
    /// List the Python modules in a project directory.
    Modules { path: PathBuf },
    /// Run due tasks and re-arm the wake-up (what launchd invokes).
    RunDue,
    /// Re-arm the wake-up for the next run or status change.
    Schedule,
    /// Show recent bot runs.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(default_command);
    logging::init(if matches!(command, Command::RunDue) {
        "info"
    } else {
        "warn"
    });

    let code = match run(cli.home.as_deref(), command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<FormError>().is_some() {
                exit_codes::INVALID_INPUT
            } else {
                exit_codes::ERROR
            }
        }
    };
    process::exit(code);
}

fn default_command() -> Command {
    if std::env::var_os("LAUNCHD_JOB").is_some() {
        Command::RunDue
    } else {
        Command::List
    }
}

fn run(home: Option<&Path>, command: Command) -> Result<i32> {
    if let Command::Modules { path } = &command {
        cli::cmd_modules(path)?;
        return Ok(exit_codes::OK);
    }

    let app = App::load(home)?;
    match command {
        Command::List => cli::cmd_list(&app)?,
        Command::Show { index } => cli::cmd_show(&app, index)?,
        Command::Add(fields) => cli::cmd_add(&app, &fields)?,
        Command::Edit { index, fields } => cli::cmd_edit(&app, index, &fields)?,
        Command::Delete { index } => cli::cmd_delete(&app, index)?,
        Command::ToggleStatus { index } => cli::cmd_toggle_status(&app, index)?,
        Command::ToggleNotify { index } => cli::cmd_toggle_notify(&app, index)?,
        Command::View { index } => cli::cmd_view(&app, index)?,
        Command::RunDue => return cli::cmd_run_due(&app),
        Command::Schedule => cli::cmd_schedule(&app)?,
        Command::History { limit } => cli::cmd_history(&app, limit)?,
        Command::Modules { .. } => {}
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_without_subcommand() {
        let cli = Cli::parse_from(["life-manager"]);
        assert!(cli.command.is_none());
        assert!(cli.home.is_none() || std::env::var_os("LIFE_MANAGER_HOME").is_some());
    }

    #[test]
    fn parse_home_after_subcommand() {
        let cli = Cli::parse_from(["life-manager", "run-due", "--home", "/tmp/lm"]);
        assert!(matches!(cli.command, Some(Command::RunDue)));
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/lm")));
    }

    #[test]
    fn parse_edit_fields() {
        let cli = Cli::parse_from([
            "life-manager",
            "edit",
            "2",
            "--interval",
            "Days",
            "--notify",
            "false",
        ]);
        let Some(Command::Edit { index, fields }) = cli.command else {
            panic!("expected edit");
        };
        assert_eq!(index, 2);
        assert_eq!(fields.interval.as_deref(), Some("Days"));
        assert_eq!(fields.notify, Some(false));
        assert_eq!(fields.name, None);
    }

    #[test]
    fn parse_history_limit() {
        let cli = Cli::parse_from(["life-manager", "history", "--limit", "5"]);
        assert!(matches!(cli.command, Some(Command::History { limit: 5 })));
    }
}
