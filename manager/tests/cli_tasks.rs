//! CLI tests for task management and `run-due` exit codes.
//!
//! Spawns the binary against a temporary home with launchd disabled.

use std::process::{Command, Output};

use chrono::{Duration, Local, Utc};
use life_manager::exit_codes;
use life_manager::io::config::{load_config, write_config};
use life_manager::io::task_store::save_tasks;
use life_manager::task::{ScheduleInterval, Task};
use life_manager::test_support::{TestHome, write_project};

fn run(home: &TestHome, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_life-manager"))
        .arg("--home")
        .arg(home.home())
        .args(args)
        .env_remove("LAUNCHD_JOB")
        .env_remove("LIFE_MANAGER_HOME")
        .output()
        .expect("spawn life-manager")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn future_date() -> String {
    (Local::now() + Duration::days(10))
        .format("%m/%d/%Y")
        .to_string()
}

#[test]
fn add_list_toggle_delete() {
    let home = TestHome::new().expect("home");
    let project = write_project(&home.projects_dir(), "weather", &["helper.py", "main.py"]);
    let project = project.display().to_string();
    let start_date = future_date();

    let added = run(
        &home,
        &[
            "add",
            "--name",
            "Weather",
            "--path",
            &project,
            "--start-date",
            &start_date,
            "--start-time",
            "9:30",
            "--am-pm",
            "PM",
            "--interval",
            "days",
        ],
    );
    assert_eq!(added.status.code(), Some(exit_codes::OK), "{}", stderr(&added));
    assert!(stdout(&added).contains("Added task 0: Weather"));

    let listed = run(&home, &["list"]);
    let table = stdout(&listed);
    assert!(table.contains("Weather"), "{table}");
    assert!(table.contains("Days"), "{table}");
    assert!(table.contains("Active"), "{table}");
    assert!(table.contains(&format!("{start_date} 09:30 PM")), "{table}");

    let shown = run(&home, &["show", "0"]);
    assert!(stdout(&shown).contains("main.py"));

    let toggled = run(&home, &["toggle-status", "0"]);
    assert_eq!(toggled.status.code(), Some(exit_codes::OK));
    assert!(stdout(&toggled).contains("Weather is now Paused"));
    assert!(stdout(&run(&home, &["list"])).contains("Paused"));

    let notify = run(&home, &["toggle-notify", "0"]);
    assert!(stdout(&notify).contains("Notifications off"));

    let deleted = run(&home, &["delete", "0"]);
    assert_eq!(deleted.status.code(), Some(exit_codes::OK));
    assert!(stdout(&run(&home, &["list"])).contains("No tasks yet"));
}

#[test]
fn edit_changes_only_given_fields() {
    let home = TestHome::new().expect("home");
    let project = write_project(&home.projects_dir(), "backup", &["main.py", "other.py"]);
    let project = project.display().to_string();
    let start_date = future_date();
    let added = run(
        &home,
        &[
            "add", "--name", "Backup", "--path", &project, "--start-date", &start_date,
        ],
    );
    assert_eq!(added.status.code(), Some(exit_codes::OK), "{}", stderr(&added));

    let edited = run(&home, &["edit", "0", "--module", "other.py", "--skip", "2"]);
    assert_eq!(edited.status.code(), Some(exit_codes::OK), "{}", stderr(&edited));

    let shown = stdout(&run(&home, &["show", "0"]));
    assert!(shown.contains("other.py"), "{shown}");
    assert!(shown.contains("every 3 Weeks (skipping 2)"), "{shown}");
    assert!(shown.contains(&format!("{start_date} 09:00 AM")), "{shown}");
}

#[test]
fn rejected_form_exits_with_invalid_input() {
    let home = TestHome::new().expect("home");
    let project = write_project(&home.projects_dir(), "bot", &["main.py"]);
    let project = project.display().to_string();

    let output = run(
        &home,
        &["add", "--name", "Bot", "--path", &project, "--start-date", "2030-01-01"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID_INPUT));
    assert!(stderr(&output).contains("Format should be MM/DD/YYYY"));

    let missing = run(&home, &["add", "--path", &project]);
    assert_eq!(missing.status.code(), Some(exit_codes::INVALID_INPUT));
    assert!(stderr(&missing).contains("Missing required fields: Project Name"));
}

#[test]
fn unknown_index_is_an_error() {
    let home = TestHome::new().expect("home");
    let output = run(&home, &["delete", "3"]);
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(stderr(&output).contains("no task at index 3"));
}

#[cfg(unix)]
#[test]
fn run_due_reports_bot_failure_and_records_history() {
    let home = TestHome::new().expect("home");
    let mut cfg = load_config(&home.paths.config_path).expect("config");
    cfg.python = "sh".to_string();
    cfg.retries = 0;
    write_config(&home.paths.config_path, &cfg).expect("write config");

    let project = write_project(&home.projects_dir(), "flaky", &[]);
    std::fs::write(project.join("main.py"), "echo partial\necho broken >&2\nexit 1\n")
        .expect("write bot");
    let now = Utc::now();
    let task = Task::new(
        "Flaky",
        project,
        "main.py",
        now - Duration::minutes(10),
        ScheduleInterval::Hours,
        now - Duration::days(1),
    );
    save_tasks(&home.paths.tasks_path, &[task]).expect("save tasks");

    let output = run(&home, &["run-due"]);
    assert_eq!(output.status.code(), Some(exit_codes::BOT_FAILURE), "{}", stderr(&output));
    assert!(stdout(&output).contains("Flaky: FAILED"));

    let history = stdout(&run(&home, &["history"]));
    assert!(history.contains("Flaky"), "{history}");
    assert!(history.contains("failed"), "{history}");
    assert!(history.contains("broken"), "{history}");

    let shown = stdout(&run(&home, &["show", "0"]));
    assert!(shown.contains("0|-|-|-|-"), "{shown}");
}

#[test]
fn launchd_job_without_subcommand_runs_due_tasks() {
    let home = TestHome::new().expect("home");

    let output = Command::new(env!("CARGO_BIN_EXE_life-manager"))
        .arg("--home")
        .arg(home.home())
        .env("LAUNCHD_JOB", "1")
        .output()
        .expect("spawn life-manager");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("No active tasks"));

    let listed = run(&home, &[]);
    assert!(stdout(&listed).contains("No tasks yet"));
}

#[test]
fn modules_marks_default() {
    let home = TestHome::new().expect("home");
    let project = write_project(&home.projects_dir(), "bot", &["a.py", "main.py", "notes.txt"]);
    let output = run(&home, &["modules", &project.display().to_string()]);
    assert_eq!(stdout(&output), "a.py\nmain.py (default)\n");
}
