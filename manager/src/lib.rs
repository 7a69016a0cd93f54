//! Schedule-based runner for personal Python bots on macOS.
//!
//! A CSV task table lists bots with a start time and a repeat interval. A
//! single launchd agent wakes the executor at the earliest upcoming run; the
//! executor runs whatever is due, records statistics, and re-arms the agent.
//!
//! - **[`core`]**: Pure logic (next-run arithmetic, selection, run statistics).
//! - **[`io`]**: Side effects (CSV/TOML/JSONL files, child processes, launchd,
//!   notifications).
//!
//! [`manager`] and [`execute`] combine the two; [`cli`] implements the
//! commands of the `life-manager` binary.

pub mod cli;
pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod form;
pub mod io;
pub mod logging;
pub mod manager;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
