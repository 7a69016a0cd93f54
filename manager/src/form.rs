//! Task entry: raw user input, defaults and validation.
//!
//! Validation runs a fixed sequence of checks and stops at the first failure,
//! so the user always fixes one problem at a time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::core::schedule::resolve_local;
use crate::task::{ScheduleInterval, Task};

const DATE_FORMAT: &str = "%m/%d/%Y";
const TIME_FORMAT: &str = "%I:%M %p";

/// Reasons a form is rejected. Messages are shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormError {
    #[error("Missing required fields: {0}")]
    MissingFields(String),
    #[error("Error in {fields}. Format should be MM/DD/YYYY. Example: {example}")]
    WrongDateFormat { fields: String, example: String },
    #[error("Error in Start Time. Format should be as follows: {example}")]
    WrongTimeFormat { example: String },
    #[error("Could not combine Start Date and Time into a valid DateTime.")]
    InvalidDateTime,
    #[error("Start Date and Time must be in the future.")]
    StartNotInFuture,
    #[error("Status Change Date must be after Start Date.")]
    StatusChangeBeforeStart,
    #[error("Error in Skip Intervals. Value must be a non-negative integer.")]
    InvalidSkipIntervals,
    #[error("Unknown Schedule Interval: {0}. Use Minutes, Hours, Days, Weeks, Months or Years.")]
    UnknownInterval(String),
    #[error("Project does not exist: {0}")]
    ProjectNotFound(String),
    #[error("Module not found: {0}")]
    ModuleNotFound(String),
    #[error("No valid module found at: {0}")]
    NotAModule(String),
}

/// Raw, unvalidated task input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskForm {
    pub project_name: String,
    pub project_path: String,
    pub entry_module: String,
    pub start_date: String,
    pub start_time: String,
    pub am_pm: String,
    pub schedule_interval: String,
    pub skip_intervals: String,
    pub status_change_date: String,
    pub notify_on_run: bool,
}

/// Validated form contents, ready to become (or update) a [`Task`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTask {
    pub project_name: String,
    pub project_path: PathBuf,
    pub entry_module: String,
    pub next_run: DateTime<Utc>,
    pub schedule_interval: ScheduleInterval,
    pub skip_intervals: u32,
    pub status_change_date: Option<DateTime<Utc>>,
    pub notify_on_run: bool,
}

impl TaskForm {
    /// Defaults for a new task: tomorrow at 9:00 AM, weekly, notifications on.
    pub fn new_defaults(today: NaiveDate) -> Self {
        let tomorrow = today.succ_opt().unwrap_or(today);
        Self {
            project_name: String::new(),
            project_path: String::new(),
            entry_module: String::new(),
            start_date: tomorrow.format(DATE_FORMAT).to_string(),
            start_time: "9:00".to_string(),
            am_pm: "AM".to_string(),
            schedule_interval: ScheduleInterval::Weeks.to_string(),
            skip_intervals: "0".to_string(),
            status_change_date: String::new(),
            notify_on_run: true,
        }
    }

    /// Pre-fill from an existing task, expressing times in `tz`.
    pub fn from_task<Tz: TimeZone>(task: &Task, tz: &Tz) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let next_run = task.next_run.with_timezone(tz);
        Self {
            project_name: task.project_name.clone(),
            project_path: task.project_path.display().to_string(),
            entry_module: task.entry_module.clone(),
            start_date: next_run.format(DATE_FORMAT).to_string(),
            start_time: next_run.format("%I:%M").to_string(),
            am_pm: next_run.format("%p").to_string(),
            schedule_interval: task.schedule_interval.to_string(),
            skip_intervals: task.skip_intervals.to_string(),
            status_change_date: task
                .status_change_date
                .map(|dt| dt.with_timezone(tz).format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            notify_on_run: task.notify_on_run,
        }
    }

    /// Run every check in order, stopping at the first failure.
    pub fn validate<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> Result<ValidTask, FormError>
    where
        Tz::Offset: std::fmt::Display,
    {
        self.check_mandatory()?;
        let (start_date, status_change_day) = self.check_dates(now, tz)?;
        let start_time = self.check_time(now, tz)?;
        let next_run =
            resolve_local(tz, start_date.and_time(start_time)).ok_or(FormError::InvalidDateTime)?;
        if next_run <= now {
            return Err(FormError::StartNotInFuture);
        }
        let status_change_date = match status_change_day {
            Some(day) => {
                let end_of_day = day.and_time(end_of_day_time());
                let at = resolve_local(tz, end_of_day).ok_or(FormError::InvalidDateTime)?;
                if at < next_run {
                    return Err(FormError::StatusChangeBeforeStart);
                }
                Some(at)
            }
            None => None,
        };
        let skip_intervals = parse_skip_intervals(&self.skip_intervals)?;
        let schedule_interval = self
            .schedule_interval
            .parse::<ScheduleInterval>()
            .map_err(|_| FormError::UnknownInterval(self.schedule_interval.trim().to_string()))?;
        let project_path = PathBuf::from(self.project_path.trim());
        let entry_module = self.entry_module.trim().to_string();
        check_module(&project_path, &entry_module)?;

        Ok(ValidTask {
            project_name: self.project_name.trim().to_string(),
            project_path,
            entry_module,
            next_run,
            schedule_interval,
            skip_intervals,
            status_change_date,
            notify_on_run: self.notify_on_run,
        })
    }

    fn check_mandatory(&self) -> Result<(), FormError> {
        let required = [
            ("project_name", &self.project_name),
            ("project_path", &self.project_path),
            ("entry_module", &self.entry_module),
            ("start_date", &self.start_date),
            ("start_time", &self.start_time),
            ("am_pm", &self.am_pm),
            ("schedule_interval", &self.schedule_interval),
            ("skip_intervals", &self.skip_intervals),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| title_case(name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(FormError::MissingFields(missing.join(", ")))
    }

    fn check_dates<Tz: TimeZone>(
        &self,
        now: DateTime<Utc>,
        tz: &Tz,
    ) -> Result<(NaiveDate, Option<NaiveDate>), FormError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut wrong = Vec::new();
        let start = parse_date(&self.start_date);
        if start.is_none() {
            wrong.push(title_case("start_date"));
        }
        let status_change = if self.status_change_date.trim().is_empty() {
            None
        } else {
            let parsed = parse_date(&self.status_change_date);
            if parsed.is_none() {
                wrong.push(title_case("status_change_date"));
            }
            parsed
        };
        match start {
            Some(start) if wrong.is_empty() => Ok((start, status_change)),
            _ => Err(FormError::WrongDateFormat {
                fields: wrong.join(", "),
                example: now.with_timezone(tz).format(DATE_FORMAT).to_string(),
            }),
        }
    }

    fn check_time<Tz: TimeZone>(&self, now: DateTime<Utc>, tz: &Tz) -> Result<NaiveTime, FormError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let raw = format!("{} {}", self.start_time.trim(), self.am_pm.trim());
        NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|_| FormError::WrongTimeFormat {
            example: now.with_timezone(tz).format(TIME_FORMAT).to_string(),
        })
    }
}

impl ValidTask {
    /// Build a brand-new task created at `created`.
    pub fn into_task(self, created: DateTime<Utc>) -> Task {
        let mut task = Task::new(
            self.project_name,
            self.project_path,
            self.entry_module,
            self.next_run,
            self.schedule_interval,
            created,
        );
        task.skip_intervals = self.skip_intervals;
        task.status_change_date = self.status_change_date;
        task.notify_on_run = self.notify_on_run;
        task
    }

    /// Overwrite the user-editable fields of `task`, keeping its run statistics.
    pub fn apply_to(self, task: &mut Task) {
        task.project_name = self.project_name;
        task.project_path = self.project_path;
        task.entry_module = self.entry_module;
        task.next_run = self.next_run;
        task.schedule_interval = self.schedule_interval;
        task.skip_intervals = self.skip_intervals;
        task.status_change_date = self.status_change_date;
        task.notify_on_run = self.notify_on_run;
    }
}

/// Python files directly inside a project, sorted by name.
pub fn list_modules(project_path: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(project_path)
        .with_context(|| format!("read project dir {}", project_path.display()))?;
    let mut modules = Vec::new();
    for entry in entries {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        if path.is_file() && is_python_module(&path) {
            modules.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    modules.sort();
    Ok(modules)
}

/// `main.py` when present, otherwise the first module.
pub fn default_module(modules: &[String]) -> Option<&str> {
    modules
        .iter()
        .find(|m| m.as_str() == "main.py")
        .or_else(|| modules.first())
        .map(String::as_str)
}

fn check_module(project_path: &Path, entry_module: &str) -> Result<(), FormError> {
    if !project_path.is_dir() {
        return Err(FormError::ProjectNotFound(project_path.display().to_string()));
    }
    let module_path = project_path.join(entry_module);
    if !module_path.exists() {
        return Err(FormError::ModuleNotFound(module_path.display().to_string()));
    }
    if !module_path.is_file() || !is_python_module(&module_path) {
        return Err(FormError::NotAModule(module_path.display().to_string()));
    }
    Ok(())
}

fn is_python_module(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "py")
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

fn parse_skip_intervals(raw: &str) -> Result<u32, FormError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| FormError::InvalidSkipIntervals)?;
    if !value.is_finite() || value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(FormError::InvalidSkipIntervals);
    }
    Ok(value as u32)
}

fn end_of_day_time() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

fn title_case(field: &str) -> String {
    field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_project;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn filled(project: &Path) -> TaskForm {
        let mut form = TaskForm::new_defaults(now().date_naive());
        form.project_name = "Weather".to_string();
        form.project_path = project.display().to_string();
        form.entry_module = "main.py".to_string();
        form
    }

    #[test]
    fn defaults_point_at_tomorrow_morning() {
        let form = TaskForm::new_defaults(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(form.start_date, "01/01/2025");
        assert_eq!(form.start_time, "9:00");
        assert_eq!(form.am_pm, "AM");
        assert_eq!(form.schedule_interval, "Weeks");
        assert_eq!(form.skip_intervals, "0");
        assert!(form.notify_on_run);
    }

    #[test]
    fn valid_form_produces_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);
        let mut form = filled(&project);
        form.status_change_date = "06/30/2024".to_string();
        form.skip_intervals = "2.0".to_string();

        let valid = form.validate(now(), &Utc).expect("valid");
        assert_eq!(valid.next_run, Utc.with_ymd_and_hms(2024, 6, 2, 9, 0, 0).unwrap());
        assert_eq!(valid.skip_intervals, 2);
        assert_eq!(
            valid.status_change_date,
            Some(Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 0).unwrap())
        );

        let task = valid.into_task(now());
        assert_eq!(task.project_name, "Weather");
        assert_eq!(task.prev_five_success.to_string(), "-|-|-|-|-");
        assert_eq!(task.run_count, 0);
    }

    #[test]
    fn missing_fields_are_listed_in_title_case() {
        let form = TaskForm {
            project_name: String::new(),
            entry_module: " ".to_string(),
            ..TaskForm::new_defaults(now().date_naive())
        };
        let err = form.validate(now(), &Utc).unwrap_err();
        assert_eq!(
            err,
            FormError::MissingFields("Project Name, Project Path, Entry Module".to_string())
        );
    }

    #[test]
    fn bad_dates_and_times_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);

        let mut form = filled(&project);
        form.start_date = "2024-06-02".to_string();
        form.status_change_date = "soon".to_string();
        match form.validate(now(), &Utc).unwrap_err() {
            FormError::WrongDateFormat { fields, .. } => {
                assert_eq!(fields, "Start Date, Status Change Date");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut form = filled(&project);
        form.start_time = "25:00".to_string();
        assert!(matches!(
            form.validate(now(), &Utc),
            Err(FormError::WrongTimeFormat { .. })
        ));
    }

    #[test]
    fn start_must_be_in_the_future() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);
        let mut form = filled(&project);
        form.start_date = "06/01/2024".to_string();
        form.start_time = "11:59".to_string();
        assert_eq!(form.validate(now(), &Utc), Err(FormError::StartNotInFuture));
    }

    #[test]
    fn status_change_before_start_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);
        let mut form = filled(&project);
        form.start_date = "06/10/2024".to_string();
        form.status_change_date = "06/09/2024".to_string();
        assert_eq!(
            form.validate(now(), &Utc),
            Err(FormError::StatusChangeBeforeStart)
        );

        // Same day is fine: the change happens at 11:59 PM.
        form.status_change_date = "06/10/2024".to_string();
        assert!(form.validate(now(), &Utc).is_ok());
    }

    #[test]
    fn skip_intervals_must_be_whole_and_non_negative() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);
        for bad in ["-1", "1.5", "two"] {
            let mut form = filled(&project);
            form.skip_intervals = bad.to_string();
            assert_eq!(
                form.validate(now(), &Utc),
                Err(FormError::InvalidSkipIntervals),
                "input {bad}"
            );
        }
    }

    #[test]
    fn unknown_interval_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);
        let mut form = filled(&project);
        form.schedule_interval = "Fortnights".to_string();
        assert_eq!(
            form.validate(now(), &Utc),
            Err(FormError::UnknownInterval("Fortnights".to_string()))
        );
    }

    #[test]
    fn module_checks_cover_project_module_and_extension() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py", "notes.txt"]);

        let mut form = filled(&temp.path().join("missing"));
        assert!(matches!(
            form.validate(now(), &Utc),
            Err(FormError::ProjectNotFound(_))
        ));

        form = filled(&project);
        form.entry_module = "bot.py".to_string();
        assert!(matches!(
            form.validate(now(), &Utc),
            Err(FormError::ModuleNotFound(_))
        ));

        form.entry_module = "notes.txt".to_string();
        assert!(matches!(
            form.validate(now(), &Utc),
            Err(FormError::NotAModule(_))
        ));
    }

    #[test]
    fn from_task_round_trips_through_validation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "weather", &["main.py"]);
        let valid = filled(&project).validate(now(), &Utc).expect("valid");
        let mut task = valid.clone().into_task(now());
        task.run_count = 7;

        let form = TaskForm::from_task(&task, &Utc);
        assert_eq!(form.start_date, "06/02/2024");
        assert_eq!(form.start_time, "09:00");
        assert_eq!(form.am_pm, "AM");

        let revalidated = form.validate(now(), &Utc).expect("revalidate");
        assert_eq!(revalidated, valid);
        revalidated.apply_to(&mut task);
        assert_eq!(task.run_count, 7);
    }

    #[test]
    fn lists_python_modules_with_main_preferred() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = write_project(temp.path(), "bots", &["zeta.py", "main.py", "readme.md"]);
        let modules = list_modules(&project).expect("list");
        assert_eq!(modules, vec!["main.py", "zeta.py"]);
        assert_eq!(default_module(&modules), Some("main.py"));

        let only = vec!["alpha.py".to_string()];
        assert_eq!(default_module(&only), Some("alpha.py"));
        assert_eq!(default_module(&[]), None);
    }
}
