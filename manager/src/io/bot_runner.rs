//! Bot execution abstraction.
//!
//! The [`BotRunner`] trait decouples the executor from how a bot process is
//! started. Tests use scripted runners that return predetermined outputs
//! without spawning anything.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;
use crate::task::Task;

/// Parameters for one bot invocation.
#[derive(Debug, Clone)]
pub struct BotRequest {
    pub project_name: String,
    /// Interpreter that runs the entry module.
    pub interpreter: String,
    /// Entry module path (project directory joined with the module name).
    pub script: PathBuf,
    /// Working directory for the bot process.
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    /// Extra attempts after a failure.
    pub retries: u32,
}

impl BotRequest {
    pub fn for_task(
        task: &Task,
        interpreter: &str,
        timeout: Duration,
        output_limit_bytes: usize,
        retries: u32,
    ) -> Self {
        Self {
            project_name: task.project_name.clone(),
            interpreter: interpreter.to_string(),
            script: task.script_path(),
            workdir: task.project_path.clone(),
            timeout,
            output_limit_bytes,
            retries,
        }
    }
}

/// Result of running a bot (after any retries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Attempts made, including the first.
    pub attempts: u32,
}

impl BotOutput {
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
            attempts: 1,
        }
    }
}

/// Abstraction over bot execution backends. One call is one attempt.
pub trait BotRunner {
    fn run(&self, request: &BotRequest) -> Result<BotOutput>;
}

/// Runs `<interpreter> <project>/<module>` inside the project directory.
pub struct PythonBotRunner;

impl BotRunner for PythonBotRunner {
    #[instrument(skip_all, fields(project = %request.project_name))]
    fn run(&self, request: &BotRequest) -> Result<BotOutput> {
        let mut cmd = Command::new(&request.interpreter);
        cmd.arg(&request.script).current_dir(&request.workdir);

        let output =
            run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)?;
        let mut stderr = output.stderr_text();
        if output.timed_out {
            stderr.push_str(&format!("\n[bot timed out after {:?}]\n", request.timeout));
        }
        debug!(exit_code = ?output.status.code(), "bot finished");
        Ok(BotOutput {
            success: output.success(),
            stdout: output.stdout_text(),
            stderr,
            timed_out: output.timed_out,
            attempts: 1,
        })
    }
}

/// Run a bot, retrying failed attempts up to `request.retries` times.
///
/// Spawn errors count as failed attempts, so one broken bot never aborts a
/// batch. The last attempt's output is returned.
pub fn run_with_retry<R: BotRunner>(runner: &R, request: &BotRequest) -> BotOutput {
    let max_attempts = request.retries.saturating_add(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let mut output = match runner.run(request) {
            Ok(output) => output,
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(project = %request.project_name, attempt, err = %reason, "bot failed to start");
                BotOutput::failed(format!("failed to run bot: {reason}"))
            }
        };
        output.attempts = attempt;
        if output.success {
            info!(project = %request.project_name, attempt, "bot succeeded");
            return output;
        }
        if attempt >= max_attempts {
            warn!(project = %request.project_name, attempt, "bot failed, giving up");
            return output;
        }
        info!(project = %request.project_name, attempt, "bot failed, retrying");
    }
}
