//! Test-only builders and scripted stand-ins for the process and OS seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};

use crate::io::bot_runner::{BotOutput, BotRequest, BotRunner};
use crate::io::clock::Clock;
use crate::io::config::{ManagerConfig, write_config};
use crate::io::launchd::{Launchctl, ScheduleChange, Scheduler};
use crate::io::notify::Notifier;
use crate::io::paths::ManagerPaths;
use crate::task::{ScheduleInterval, Task};

/// Active weekly task for `/tmp/<name>/main.py`, created at `next_run`.
pub fn task_at(name: &str, next_run: DateTime<Utc>) -> Task {
    Task::new(
        name,
        PathBuf::from("/tmp").join(name),
        "main.py",
        next_run,
        ScheduleInterval::Weeks,
        next_run,
    )
}

/// Create `root/name` containing empty `files`; returns the project path.
pub fn write_project(root: &Path, name: &str, files: &[&str]) -> PathBuf {
    let project = root.join(name);
    fs::create_dir_all(&project).expect("create project dir");
    for file in files {
        fs::write(project.join(file), "").expect("write project file");
    }
    project
}

/// Temporary manager home with launchd and notifications turned off.
pub struct TestHome {
    _temp: tempfile::TempDir,
    pub paths: ManagerPaths,
}

impl TestHome {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = ManagerPaths::new(temp.path().join("home"));
        paths.ensure_dirs()?;
        let mut cfg = ManagerConfig::default();
        cfg.launchd.enabled = false;
        cfg.notifications = false;
        write_config(&paths.config_path, &cfg)?;
        Ok(Self { _temp: temp, paths })
    }

    pub fn home(&self) -> &Path {
        &self.paths.home
    }

    /// Directory next to the home for project fixtures.
    pub fn projects_dir(&self) -> PathBuf {
        self.paths
            .home
            .parent()
            .map(|parent| parent.join("projects"))
            .unwrap_or_else(|| self.paths.home.join("projects"))
    }
}

/// Bot runner returning queued outputs, one per attempt.
#[derive(Default)]
pub struct ScriptedBotRunner {
    outputs: RefCell<VecDeque<Result<BotOutput>>>,
    requests: RefCell<Vec<BotRequest>>,
}

impl ScriptedBotRunner {
    pub fn new(outputs: Vec<Result<BotOutput>>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn success(stdout: &str) -> BotOutput {
        BotOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
            timed_out: false,
            attempts: 1,
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<BotRequest> {
        self.requests.borrow().clone()
    }
}

impl BotRunner for ScriptedBotRunner {
    fn run(&self, request: &BotRequest) -> Result<BotOutput> {
        self.requests.borrow_mut().push(request.clone());
        self.outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("no scripted output left")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    Scheduled(DateTime<Utc>),
    Unscheduled,
}

/// Scheduler that records calls instead of touching launchd.
#[derive(Default)]
pub struct RecordingScheduler {
    events: RefCell<Vec<ScheduleEvent>>,
}

impl RecordingScheduler {
    pub fn events(&self) -> Vec<ScheduleEvent> {
        self.events.borrow().clone()
    }

    pub fn last(&self) -> Option<ScheduleEvent> {
        self.events.borrow().last().copied()
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule(&self, at: DateTime<Utc>) -> Result<ScheduleChange> {
        let mut events = self.events.borrow_mut();
        if events.last() == Some(&ScheduleEvent::Scheduled(at)) {
            return Ok(ScheduleChange::Unchanged);
        }
        events.push(ScheduleEvent::Scheduled(at));
        Ok(ScheduleChange::Armed)
    }

    fn unschedule(&self) -> Result<()> {
        self.events.borrow_mut().push(ScheduleEvent::Unscheduled);
        Ok(())
    }

    fn is_scheduled(&self) -> bool {
        matches!(self.last(), Some(ScheduleEvent::Scheduled(_)))
    }
}

/// `launchctl` stand-in; clones share the recorded actions.
///
/// `running_job` behaves like the executor inside its own agent: an unload
/// terminates it, after which every call fails.
#[derive(Clone, Default)]
pub struct RecordingLaunchctl {
    actions: Rc<RefCell<Vec<String>>>,
    load_error: Option<String>,
    load_failures_left: Rc<Cell<u32>>,
    running_job: bool,
    terminated: Rc<Cell<bool>>,
}

impl RecordingLaunchctl {
    pub fn failing_load(stderr: &str) -> Self {
        Self {
            load_error: Some(stderr.to_string()),
            load_failures_left: Rc::new(Cell::new(u32::MAX)),
            ..Self::default()
        }
    }

    pub fn failing_load_once(stderr: &str) -> Self {
        Self {
            load_error: Some(stderr.to_string()),
            load_failures_left: Rc::new(Cell::new(1)),
            ..Self::default()
        }
    }

    pub fn running_job() -> Self {
        Self {
            running_job: true,
            ..Self::default()
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.actions.borrow().clone()
    }

    pub fn terminated(&self) -> bool {
        self.terminated.get()
    }

    fn record(&self, action: String) -> Result<()> {
        if self.terminated.get() {
            return Err(anyhow!("process was terminated"));
        }
        self.actions.borrow_mut().push(action);
        Ok(())
    }
}

impl Launchctl for RecordingLaunchctl {
    fn load(&self, plist: &Path) -> Result<()> {
        self.record("load".to_string())?;
        let left = self.load_failures_left.get();
        match &self.load_error {
            Some(stderr) if left > 0 => {
                self.load_failures_left.set(left - 1);
                Err(anyhow!("launchctl load {} failed: {stderr}", plist.display()))
            }
            _ => Ok(()),
        }
    }

    fn unload(&self, _plist: &Path) -> Result<()> {
        self.record("unload".to_string())?;
        if self.running_job {
            self.terminated.set(true);
            return Err(anyhow!("terminated by SIGTERM"));
        }
        Ok(())
    }

    fn reload_after_exit(&self, _plist: &Path, pid: u32) -> Result<()> {
        self.record(format!("reload-after-exit {pid}"))
    }

    fn remove_after_exit(&self, _label: &str, pid: u32) -> Result<()> {
        self.record(format!("remove-after-exit {pid}"))
    }
}

/// Notifier that records `(title, message)` pairs, optionally failing each call.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RefCell<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        self.sent
            .borrow_mut()
            .push((title.to_string(), message.to_string()));
        if self.fail {
            return Err(anyhow!("notification center unavailable"));
        }
        Ok(())
    }
}

/// Manually driven clock; sleeping jumps straight to the target time and
/// each read advances by `tick`.
pub struct FakeClock {
    now: Cell<DateTime<Utc>>,
    tick: chrono::Duration,
    sleeps: RefCell<Vec<DateTime<Utc>>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_tick(now, chrono::Duration::zero())
    }

    pub fn with_tick(now: DateTime<Utc>, tick: chrono::Duration) -> Self {
        Self {
            now: Cell::new(now),
            tick,
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<DateTime<Utc>> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let now = self.now.get();
        self.now.set(now + self.tick);
        now
    }

    fn sleep_until(&self, at: DateTime<Utc>) {
        if at > self.now.get() {
            self.sleeps.borrow_mut().push(at);
            self.now.set(at);
        }
    }
}
