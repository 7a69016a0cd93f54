use std::thread;

use chrono::{DateTime, Utc};

/// Source of the current time for the executor.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Block until `at`; returns immediately when `at` has passed.
    fn sleep_until(&self, at: DateTime<Utc>);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep_until(&self, at: DateTime<Utc>) {
        if let Ok(wait) = (at - Utc::now()).to_std() {
            thread::sleep(wait);
        }
    }
}
