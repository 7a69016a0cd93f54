//! I/O helpers: files, child processes and macOS integration.

pub mod bot_runner;
pub mod clock;
pub mod config;
pub mod editor;
pub mod launchd;
pub mod notify;
pub mod paths;
pub mod process;
pub mod run_log;
pub mod task_store;
