//! Wake-up scheduling through a macOS launchd agent.
//!
//! One agent (`<label>.plist` in `~/Library/LaunchAgents`) fires the executor
//! at the earliest upcoming run. The plist is re-rendered after every change to
//! the task table and only reloaded when its contents differ.
//!
//! `launchctl unload` stops a running job, so the executor cannot reload its
//! own agent. When running as the job, the reload is handed to a detached
//! helper that waits for the executor to exit.

use std::ffi::OsStr;
use std::fs;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike, Utc};
use directories::BaseDirs;
use tracing::{debug, info, instrument, warn};

/// What a `schedule` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleChange {
    /// A new wake-up time was installed.
    Armed,
    /// The installed wake-up already matched.
    Unchanged,
}

/// Arms (or removes) the single executor wake-up.
pub trait Scheduler {
    fn schedule(&self, at: DateTime<Utc>) -> Result<ScheduleChange>;
    fn unschedule(&self) -> Result<()>;
    fn is_scheduled(&self) -> bool;
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn schedule(&self, at: DateTime<Utc>) -> Result<ScheduleChange> {
        (**self).schedule(at)
    }

    fn unschedule(&self) -> Result<()> {
        (**self).unschedule()
    }

    fn is_scheduled(&self) -> bool {
        (**self).is_scheduled()
    }
}

/// Scheduler used when launchd is unavailable or turned off: logs only.
pub struct DisabledScheduler;

impl Scheduler for DisabledScheduler {
    fn schedule(&self, at: DateTime<Utc>) -> Result<ScheduleChange> {
        info!(next_run = %at.with_timezone(&Local), "launchd disabled; run `life-manager run-due` yourself");
        Ok(ScheduleChange::Unchanged)
    }

    fn unschedule(&self) -> Result<()> {
        Ok(())
    }

    fn is_scheduled(&self) -> bool {
        false
    }
}

/// Thin seam over the `launchctl` binary.
pub trait Launchctl {
    fn load(&self, plist: &Path) -> Result<()>;
    fn unload(&self, plist: &Path) -> Result<()>;
    /// Once process `pid` has exited, unload and load `plist`; a plist that
    /// fails to load is deleted. Returns without waiting.
    fn reload_after_exit(&self, plist: &Path, pid: u32) -> Result<()>;
    /// Once process `pid` has exited, remove the job `label`.
    fn remove_after_exit(&self, label: &str, pid: u32) -> Result<()>;
}

const WAIT_FOR_EXIT: &str = r#"while kill -0 "$1" 2>/dev/null; do sleep 1; done"#;

/// Calls the real `launchctl`.
pub struct SystemLaunchctl;

impl SystemLaunchctl {
    fn run(&self, action: &str, plist: &Path) -> Result<()> {
        let output = Command::new("launchctl")
            .arg(action)
            .arg(plist)
            .output()
            .with_context(|| format!("spawn launchctl {action}"))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow!(
            "launchctl {action} {} failed: {}",
            plist.display(),
            stderr.trim()
        ))
    }

    /// Spawn `sh -c script target pid` in its own process group so launchd
    /// does not take it down with the job. Its stderr goes to the job's log.
    #[allow(clippy::zombie_processes)] // outlives this process
    fn spawn_after_exit(&self, script: &str, target: &OsStr, pid: u32) -> Result<()> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("{WAIT_FOR_EXIT}; {script}"))
            .arg(target)
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);
        let child = cmd.spawn().context("spawn deferred launchctl helper")?;
        debug!(helper = child.id(), waits_for = pid, "deferred launchctl call");
        Ok(())
    }
}

impl Launchctl for SystemLaunchctl {
    fn load(&self, plist: &Path) -> Result<()> {
        self.run("load", plist)
    }

    fn unload(&self, plist: &Path) -> Result<()> {
        self.run("unload", plist)
    }

    fn reload_after_exit(&self, plist: &Path, pid: u32) -> Result<()> {
        self.spawn_after_exit(
            r#"launchctl unload "$0" 2>/dev/null; launchctl load "$0" || rm -f "$0""#,
            plist.as_os_str(),
            pid,
        )
    }

    fn remove_after_exit(&self, label: &str, pid: u32) -> Result<()> {
        self.spawn_after_exit(r#"launchctl remove "$0""#, OsStr::new(label), pid)
    }
}

/// Static description of the launch agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub label: String,
    pub program_arguments: Vec<String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

impl AgentSpec {
    /// Agent that re-invokes `program` with `--home <home> run-due`.
    pub fn for_executor(
        label: &str,
        program: &Path,
        home: &Path,
        stdout_path: &Path,
        stderr_path: &Path,
    ) -> Self {
        Self {
            label: label.to_string(),
            program_arguments: vec![
                program.display().to_string(),
                "--home".to_string(),
                home.display().to_string(),
                "run-due".to_string(),
            ],
            stdout_path: stdout_path.to_path_buf(),
            stderr_path: stderr_path.to_path_buf(),
        }
    }
}

/// launchd-backed [`Scheduler`].
pub struct LaunchdScheduler<L: Launchctl> {
    spec: AgentSpec,
    plist_path: PathBuf,
    launchctl: L,
    job_pid: Option<u32>,
}

impl<L: Launchctl> LaunchdScheduler<L> {
    pub fn new(spec: AgentSpec, agents_dir: &Path, launchctl: L) -> Self {
        let plist_path = agents_dir.join(format!("{}.plist", spec.label));
        Self {
            spec,
            plist_path,
            launchctl,
            job_pid: None,
        }
    }

    /// Mark this process (`pid`) as the launchd job: agent reloads and
    /// removals wait until it exits.
    pub fn running_as_job(mut self, pid: u32) -> Self {
        self.job_pid = Some(pid);
        self
    }

    pub fn plist_path(&self) -> &Path {
        &self.plist_path
    }

    fn discard_plist(&self) {
        if let Err(err) = fs::remove_file(&self.plist_path) {
            warn!(path = %self.plist_path.display(), err = %err, "could not remove launch agent");
        }
    }
}

impl<L: Launchctl> Scheduler for LaunchdScheduler<L> {
    #[instrument(skip_all, fields(label = %self.spec.label))]
    fn schedule(&self, at: DateTime<Utc>) -> Result<ScheduleChange> {
        let local = at.with_timezone(&Local).naive_local();
        let plist = render_plist(&self.spec, local);

        let existing = fs::read_to_string(&self.plist_path).ok();
        if existing.as_deref() == Some(plist.as_str()) {
            debug!(path = %self.plist_path.display(), "launch agent already up to date");
            return Ok(ScheduleChange::Unchanged);
        }
        if let Some(parent) = self.plist_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }

        if let Some(pid) = self.job_pid {
            fs::write(&self.plist_path, plist)
                .with_context(|| format!("write launch agent {}", self.plist_path.display()))?;
            if let Err(err) = self.launchctl.reload_after_exit(&self.plist_path, pid) {
                self.discard_plist();
                return Err(err);
            }
            info!(next_run = %local, "scheduled executor once this run exits");
            return Ok(ScheduleChange::Armed);
        }

        if existing.is_some() {
            if let Err(err) = self.launchctl.unload(&self.plist_path) {
                // A stale plist that was never loaded cannot be unloaded; loading below still works.
                warn!(err = %err, "unload of previous launch agent failed");
            }
        }
        fs::write(&self.plist_path, plist)
            .with_context(|| format!("write launch agent {}", self.plist_path.display()))?;
        if let Err(err) = self.launchctl.load(&self.plist_path) {
            // Leaving the plist would make the next identical schedule a no-op.
            self.discard_plist();
            return Err(err);
        }
        info!(next_run = %local, "scheduled executor");
        Ok(ScheduleChange::Armed)
    }

    fn unschedule(&self) -> Result<()> {
        if !self.plist_path.exists() {
            return Ok(());
        }
        if let Some(pid) = self.job_pid {
            fs::remove_file(&self.plist_path)
                .with_context(|| format!("remove launch agent {}", self.plist_path.display()))?;
            self.launchctl.remove_after_exit(&self.spec.label, pid)?;
            info!("removing executor schedule once this run exits");
            return Ok(());
        }
        if let Err(err) = self.launchctl.unload(&self.plist_path) {
            warn!(err = %err, "unload of launch agent failed");
        }
        fs::remove_file(&self.plist_path)
            .with_context(|| format!("remove launch agent {}", self.plist_path.display()))?;
        info!("removed executor schedule");
        Ok(())
    }

    fn is_scheduled(&self) -> bool {
        self.plist_path.exists()
    }
}

/// `~/Library/LaunchAgents`.
pub fn default_agents_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| anyhow!("cannot determine the home directory"))?;
    Ok(base.home_dir().join("Library").join("LaunchAgents"))
}

/// Render the agent plist firing once at `at` (local wall-clock time).
///
/// launchd calendar intervals have no year key; the executor re-renders the
/// plist after every run, so the agent never fires a year late.
pub fn render_plist(spec: &AgentSpec, at: NaiveDateTime) -> String {
    let mut buf = String::new();
    buf.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    buf.push_str("<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n");
    buf.push_str("<plist version=\"1.0\">\n<dict>\n");
    push_key_string(&mut buf, 1, "Label", &spec.label);

    push_key(&mut buf, 1, "ProgramArguments");
    buf.push_str("\t<array>\n");
    for arg in &spec.program_arguments {
        buf.push_str(&format!("\t\t<string>{}</string>\n", xml_escape(arg)));
    }
    buf.push_str("\t</array>\n");

    push_key(&mut buf, 1, "EnvironmentVariables");
    buf.push_str("\t<dict>\n");
    push_key_string(&mut buf, 2, "LAUNCHD_JOB", "1");
    buf.push_str("\t</dict>\n");

    push_key(&mut buf, 1, "StartCalendarInterval");
    buf.push_str("\t<dict>\n");
    for (key, value) in [
        ("Month", at.month()),
        ("Day", at.day()),
        ("Hour", at.hour()),
        ("Minute", at.minute()),
    ] {
        push_key(&mut buf, 2, key);
        buf.push_str(&format!("\t\t<integer>{value}</integer>\n"));
    }
    buf.push_str("\t</dict>\n");

    push_key(&mut buf, 1, "RunAtLoad");
    buf.push_str("\t<false/>\n");
    push_key(&mut buf, 1, "KeepAlive");
    buf.push_str("\t<false/>\n");
    push_key_string(
        &mut buf,
        1,
        "StandardOutPath",
        &spec.stdout_path.display().to_string(),
    );
    push_key_string(
        &mut buf,
        1,
        "StandardErrorPath",
        &spec.stderr_path.display().to_string(),
    );
    buf.push_str("</dict>\n</plist>\n");
    buf
}

fn push_key(buf: &mut String, depth: usize, key: &str) {
    buf.push_str(&"\t".repeat(depth));
    buf.push_str(&format!("<key>{}</key>\n", xml_escape(key)));
}

fn push_key_string(buf: &mut String, depth: usize, key: &str, value: &str) {
    push_key(buf, depth, key);
    buf.push_str(&"\t".repeat(depth));
    buf.push_str(&format!("<string>{}</string>\n", xml_escape(value)));
}

fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
