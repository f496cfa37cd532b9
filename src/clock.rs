//! Clock Module
//!
//! Source of borrow/return timestamps.
//!
//! Timestamps are local wall-clock time with second precision, which is
//! exactly what the ledger file stores. Keeping sub-second parts in memory
//! would make a reloaded ledger differ from the one that was saved.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime, Timelike};
use parking_lot::Mutex;

/// Provides the current time to the engine
pub trait Clock: Send + Sync {
    /// Current local time, truncated to whole seconds
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_seconds(Local::now().naive_local())
    }
}

/// A clock that only moves when told to
///
/// Clones share the same instant, so a test can keep one handle and give
/// another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<NaiveDateTime>>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            current: Arc::new(Mutex::new(truncate_to_seconds(start))),
        }
    }

    /// Jump to an absolute instant (may move backwards)
    pub fn set(&self, instant: NaiveDateTime) {
        *self.current.lock() = truncate_to_seconds(instant);
    }

    /// Move forward by `seconds`
    pub fn advance(&self, seconds: i64) {
        let mut current = self.current.lock();
        *current += chrono::Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.current.lock()
    }
}

/// Drop the sub-second part of a timestamp
pub fn truncate_to_seconds(instant: NaiveDateTime) -> NaiveDateTime {
    instant.with_nanosecond(0).unwrap_or(instant)
}
