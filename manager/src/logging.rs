//! Diagnostics via `tracing`, written to stderr.
//!
//! Under launchd, stderr is redirected into `logs/executor.log`, so `run-due`
//! logs at `info` by default while interactive commands stay at `warn`.
//! Run history itself lives in `runs.jsonl` (`io/run_log`) and does not depend
//! on `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; falls back to `default_level` when unset or invalid.
///
/// # Example
/// ```bash
/// RUST_LOG=life_manager=debug life-manager run-due
/// ```
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
