//! Deterministic clock behind the intercepted time methods

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Uptime a fresh clock starts at
pub const DEFAULT_START_MILLIS: i64 = 100;

const NANOS_PER_MILLI: i64 = 1_000_000;

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FakeClock {
    nanos: AtomicI64,
}

impl FakeClock {
    /// Clock at [`DEFAULT_START_MILLIS`]
    pub fn new() -> Self {
        Self::starting_at_millis(DEFAULT_START_MILLIS)
    }

    /// Clock at `millis`
    pub fn starting_at_millis(millis: i64) -> Self {
        Self {
            nanos: AtomicI64::new(millis.saturating_mul(NANOS_PER_MILLI)),
        }
    }

    /// `System.nanoTime()`
    pub fn nano_time(&self) -> i64 {
        self.nanos.load(Ordering::Acquire)
    }

    /// `System.currentTimeMillis()`
    pub fn current_time_millis(&self) -> i64 {
        self.nano_time() / NANOS_PER_MILLI
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let nanos = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| Some(now.saturating_add(nanos)));
    }

    /// Jump to `millis`; the clock never goes backwards
    pub fn set_current_time_millis(&self, millis: i64) {
        self.nanos
            .fetch_max(millis.saturating_mul(NANOS_PER_MILLI), Ordering::AcqRel);
    }

    /// Back to [`DEFAULT_START_MILLIS`]
    pub fn reset(&self) {
        self.nanos
            .store(DEFAULT_START_MILLIS * NANOS_PER_MILLI, Ordering::Release);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}
