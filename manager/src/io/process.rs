//! Child process execution with a timeout and bounded output capture.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Lossy UTF-8 stdout, with a marker when bytes were dropped.
    pub fn stdout_text(&self) -> String {
        render_stream(&self.stdout, self.stdout_truncated, "stdout")
    }

    /// Lossy UTF-8 stderr, with a marker when bytes were dropped.
    pub fn stderr_text(&self) -> String {
        render_stream(&self.stderr, self.stderr_truncated, "stderr")
    }
}

fn render_stream(bytes: &[u8], truncated: usize, label: &str) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated > 0 {
        text.push_str(&format!("\n[{label} truncated {truncated} bytes]\n"));
    }
    text
}

/// Run a command with a timeout, reading stdout/stderr concurrently so a chatty
/// child never blocks on a full pipe.
///
/// At most `output_limit_bytes` of each stream are kept; the rest is drained
/// and counted. A child still running at the deadline is killed together with
/// everything it spawned (on unix the child leads its own process group).
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawn {}", cmd.get_program().to_string_lossy()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    // After a kill, a descendant that escaped the group may still hold the
    // pipes; give the readers a short grace period instead of blocking.
    let grace = timed_out.then_some(READER_GRACE);
    let (stdout, stdout_truncated) = join_output(stdout_handle, grace).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle, grace).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

const READER_GRACE: Duration = Duration::from_secs(1);

fn kill_process_group(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill").args(["-s", "KILL", "--", &group]).status() {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => debug!(%status, "process group kill failed, killing child only"),
            Err(err) => debug!(err = %err, "could not run kill, killing child only"),
        }
    }
    child.kill().context("kill command")
}

fn join_output(
    handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>,
    grace: Option<Duration>,
) -> Result<(Vec<u8>, usize)> {
    if let Some(grace) = grace {
        let deadline = Instant::now() + grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("output still open after kill, abandoning reader");
                return Ok((Vec::new(), 0));
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
