//! Monotonic time sources.
//!
//! The runtime reads time only through [`Clock`]. Real sessions use
//! [`MonotonicClock`]; tests and replays drive a [`ManualClock`] by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic clock measured from its own epoch.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch. Never decreases.
    fn now(&self) -> Duration;
}

/// Shared clock handle, cloned into every producer.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-independent clock backed by [`Instant`].
#[derive(Clone, Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Start a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Software clock with microsecond ticks that only moves when told to.
///
/// Clones share the same counter, so a test can keep one handle and hand
/// another to the session.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    ticks_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time.
    pub fn advance(&self, by: Duration) {
        let us = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.ticks_us.fetch_add(us, Ordering::AcqRel);
    }

    /// Advance time by whole milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Move to an absolute time. Earlier times are ignored.
    pub fn set(&self, at: Duration) {
        let us = u64::try_from(at.as_micros()).unwrap_or(u64::MAX);
        self.ticks_us.fetch_max(us, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.ticks_us.load(Ordering::Acquire))
    }
}
