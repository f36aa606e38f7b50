//! Monotonic clock sources.
//!
//! A [`Clock`] reports an arbitrary-epoch monotonic reading in nanoseconds,
//! the same contract as `uv_hrtime`. The timeline converts readings into
//! milliseconds relative to its origin.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Source of monotonic time.
pub trait Clock: Send + Sync {
    /// Current reading in nanoseconds since an arbitrary fixed epoch.
    fn now_ns(&self) -> u64;

    /// Current reading in milliseconds since the same epoch.
    fn now_ms(&self) -> f64 {
        self.now_ns() as f64 / 1e6
    }
}

static PROCESS_ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Clock backed by [`Instant`], anchored once per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Create a monotonic clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        let anchor = PROCESS_ANCHOR.get_or_init(Instant::now);
        // Saturates after ~584 years of uptime.
        u64::try_from(anchor.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to.
///
/// Useful for simulations and deterministic tests of anything that reads
/// time.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self {
            nanos: AtomicU64::new(start_ns),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(by, Ordering::SeqCst);
    }

    /// Move the clock forward by a number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Jump to an absolute reading.
    pub fn set_ns(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
