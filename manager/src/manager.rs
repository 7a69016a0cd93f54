//! The task table plus the launch schedule that follows it.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::core::schedule::advance_next_run;
use crate::core::selector::{apply_status_changes, next_wake};
use crate::io::editor::open_project;
use crate::io::launchd::{ScheduleChange, Scheduler};
use crate::io::task_store::{load_tasks, save_tasks};
use crate::task::{Task, TaskStatus};

/// Owns the loaded task table. Every mutation is written to disk and the
/// wake-up schedule is re-armed for the next run or status change.
pub struct TaskManager<S: Scheduler> {
    tasks_path: PathBuf,
    tasks: Vec<Task>,
    scheduler: S,
}

impl<S: Scheduler> TaskManager<S> {
    pub fn open(tasks_path: &Path, scheduler: S) -> Result<Self> {
        let tasks = load_tasks(tasks_path)?;
        Ok(Self {
            tasks_path: tasks_path.to_path_buf(),
            tasks,
            scheduler,
        })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn task(&self, index: usize) -> Result<&Task> {
        self.tasks.get(index).ok_or_else(|| self.missing(index))
    }

    /// Append a task; returns its index.
    pub fn add_task(&mut self, task: Task) -> Result<usize> {
        info!(project = %task.project_name, "added task");
        self.tasks.push(task);
        self.save()?;
        Ok(self.tasks.len() - 1)
    }

    pub fn edit_task(&mut self, index: usize, task: Task) -> Result<()> {
        self.replace_task(index, task)?;
        self.sync_schedule_at(Utc::now())?;
        info!(project = %self.tasks[index].project_name, "edited task");
        Ok(())
    }

    /// Replace and persist a task without touching the schedule.
    pub fn replace_task(&mut self, index: usize, task: Task) -> Result<()> {
        let len = self.tasks.len();
        let slot = self.tasks.get_mut(index).ok_or_else(|| missing(index, len))?;
        *slot = task;
        self.persist()
    }

    /// Remove a task; later rows shift up by one.
    pub fn delete_task(&mut self, index: usize) -> Result<Task> {
        self.task(index)?;
        let removed = self.tasks.remove(index);
        self.save()?;
        info!(project = %removed.project_name, "deleted task");
        Ok(removed)
    }

    /// Flip Active/Paused. A resumed task whose next run already passed is
    /// moved to its first slot at or after `now`.
    pub fn toggle_status<Tz: TimeZone>(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<TaskStatus> {
        let task = self.task(index)?;
        let status = task.status.toggled();
        let next_run = if status == TaskStatus::Active && task.next_run < now {
            let next_run = advance_next_run(
                task.next_run,
                task.schedule_interval,
                task.skip_intervals,
                now,
                tz,
            )?;
            debug!(project = %task.project_name, %next_run, "fast-forwarded resumed task");
            next_run
        } else {
            task.next_run
        };

        let task = &mut self.tasks[index];
        task.status = status;
        task.next_run = next_run;
        info!(project = %task.project_name, %status, "set status");
        self.persist()?;
        self.sync_schedule_at(now)?;
        Ok(status)
    }

    /// Flip `notify_on_run`; returns the new value.
    pub fn toggle_notify(&mut self, index: usize) -> Result<bool> {
        let len = self.tasks.len();
        let task = self.tasks.get_mut(index).ok_or_else(|| missing(index, len))?;
        task.notify_on_run = !task.notify_on_run;
        let notify = task.notify_on_run;
        info!(project = %task.project_name, notify, "set notifications");
        self.save()?;
        Ok(notify)
    }

    /// Open a task's project directory with `editor`.
    pub fn view_task(&self, index: usize, editor: &[String]) -> Result<()> {
        let task = self.task(index)?;
        open_project(editor, &task.project_path)
    }

    /// Apply due status changes; the table is written only when one changed.
    pub fn apply_status_changes(&mut self, now: DateTime<Utc>) -> Result<Vec<usize>> {
        let changed = apply_status_changes(&mut self.tasks, now);
        if !changed.is_empty() {
            for &index in &changed {
                let task = &self.tasks[index];
                info!(project = %task.project_name, status = %task.status, "status change date reached");
            }
            self.persist()?;
        }
        Ok(changed)
    }

    /// Re-read the table from disk, picking up changes made by other
    /// processes since it was loaded.
    pub fn reload(&mut self) -> Result<()> {
        self.tasks = load_tasks(&self.tasks_path)?;
        Ok(())
    }

    /// Index of the row for `task`, matched on creation time and project
    /// path so it survives reordering and edits to other fields.
    pub fn position_of(&self, task: &Task) -> Option<usize> {
        self.tasks.iter().position(|row| {
            row.date_created.timestamp_millis() == task.date_created.timestamp_millis()
                && row.project_path == task.project_path
        })
    }

    /// Reload, apply `update` to the current row for `task` and persist.
    ///
    /// Other rows are written back exactly as found on disk. Returns `false`
    /// without writing when the row no longer exists.
    pub fn update_latest<F>(&mut self, task: &Task, update: F) -> Result<bool>
    where
        F: FnOnce(&mut Task) -> Result<()>,
    {
        self.reload()?;
        let Some(index) = self.position_of(task) else {
            warn!(project = %task.project_name, "task no longer in the table");
            return Ok(false);
        };
        update(&mut self.tasks[index])?;
        self.persist()?;
        Ok(true)
    }

    /// Write the table and re-arm the schedule.
    pub fn save(&self) -> Result<()> {
        self.persist()?;
        self.sync_schedule_at(Utc::now())?;
        Ok(())
    }

    /// Arm the wake-up for the earliest active run or pending status change,
    /// never sooner than one minute after `now`. With neither, the wake-up is
    /// removed.
    pub fn sync_schedule_at(&self, now: DateTime<Utc>) -> Result<Option<ScheduleChange>> {
        match next_wake(&self.tasks) {
            Some(next) => {
                let at = next.max(now + Duration::minutes(1));
                Ok(Some(self.scheduler.schedule(at)?))
            }
            None => {
                self.scheduler.unschedule()?;
                debug!("nothing to wake for, schedule cleared");
                Ok(None)
            }
        }
    }

    fn persist(&self) -> Result<()> {
        save_tasks(&self.tasks_path, &self.tasks)
    }

    fn missing(&self, index: usize) -> anyhow::Error {
        missing(index, self.tasks.len())
    }
}

fn missing(index: usize, len: usize) -> anyhow::Error {
    anyhow!("no task at index {index} (table has {len} tasks)")
}
