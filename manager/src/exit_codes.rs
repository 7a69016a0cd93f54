//! Stable exit codes for `life-manager` commands.

/// Command succeeded (for `run-due`: every bot run succeeded).
pub const OK: i32 = 0;
/// Command failed: bad table, config, index, or an I/O error.
pub const ERROR: i32 = 1;
/// Task form input was rejected.
pub const INVALID_INPUT: i32 = 2;
/// `run-due` completed but at least one bot failed.
pub const BOT_FAILURE: i32 = 3;
