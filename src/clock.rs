//! Time source abstraction
//!
//! Change and change-set timestamps come from a [`Clock`] capability that is
//! injected when the engine is built, so tests can drive history with exact,
//! reproducible timestamps instead of relying on ambient wall-clock time.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of logical timestamps, in milliseconds
pub trait Clock: Send + Sync {
    /// Current time in milliseconds
    fn now(&self) -> i64;
}

/// Wall-clock time via `chrono`
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to; used by tests and deterministic
/// embedders
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a manual clock starting at the given time
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Set the current time
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance the current time by `delta` milliseconds
    pub fn advance(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// Lets callers keep a handle on a clock they handed to the engine
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> i64 {
        (**self).now()
    }
}
