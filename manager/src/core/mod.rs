//! Deterministic, pure logic shared by the manager.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! tasks and take the current time and time zone as arguments, so results are
//! reproducible in tests.

pub mod schedule;
pub mod selector;
pub mod stats;
