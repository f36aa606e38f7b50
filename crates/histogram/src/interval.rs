//! Event-loop delay sampling.
//!
//! An [`IntervalHistogram`] runs a recurring timer at a fixed resolution.
//! On each tick it compares the time since the previous tick with the
//! resolution and records any excess, in nanoseconds, as event-loop delay.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use timeline::{Clock, MonotonicClock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{HistogramError, HistogramResult};
use crate::histogram::{HistogramOptions, HistogramSummary, RecordableHistogram};

/// Highest recordable delay: one hour in nanoseconds.
pub const MAX_DELAY_NS: u64 = 3_600_000_000_000;

/// Options for [`monitor_event_loop_delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntervalHistogramOptions {
    /// Sampling period in milliseconds
    pub resolution_ms: u64,
}

impl Default for IntervalHistogramOptions {
    fn default() -> Self {
        Self { resolution_ms: 10 }
    }
}

impl IntervalHistogramOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling period.
    pub fn with_resolution_ms(mut self, resolution_ms: u64) -> Self {
        self.resolution_ms = resolution_ms;
        self
    }
}

struct SamplerState {
    histogram: RecordableHistogram,
    last_sample_ns: u64,
}

struct Sampler {
    clock: Arc<dyn Clock>,
    resolution_ns: u64,
    state: Mutex<SamplerState>,
}

impl Sampler {
    fn lock(&self) -> MutexGuard<'_, SamplerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn restart(&self) {
        let now = self.clock.now_ns();
        self.lock().last_sample_ns = now;
    }

    /// Take one sample. Returns the recorded delay, if any.
    fn sample(&self) -> Option<u64> {
        let now = self.clock.now_ns();
        let mut state = self.lock();
        let actual = now.saturating_sub(state.last_sample_ns);
        state.last_sample_ns = now;

        if actual <= self.resolution_ns {
            return None;
        }
        let delay = actual - self.resolution_ns;
        if !state.histogram.record(delay) {
            tracing::warn!(
                target: "histogram::interval",
                delay_ns = delay,
                "event loop delay exceeds histogram range"
            );
        }
        tracing::trace!(target: "histogram::interval", delay_ns = delay, "delay sampled");
        Some(delay)
    }
}

/// Histogram of event-loop delay fed by a recurring tokio timer.
///
/// The timer task does not keep the runtime alive; it is dropped with the
/// runtime or when the histogram is disabled or dropped.
pub struct IntervalHistogram {
    sampler: Arc<Sampler>,
    resolution: Duration,
    runtime: Handle,
    timer: Option<JoinHandle<()>>,
}

impl IntervalHistogram {
    /// Create a disabled histogram that samples `clock` on `runtime`.
    pub fn new(
        options: IntervalHistogramOptions,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> HistogramResult<Self> {
        if options.resolution_ms == 0 {
            return Err(HistogramError::InvalidArguments(
                "resolution must be at least 1ms".to_string(),
            ));
        }
        let resolution_ns = options
            .resolution_ms
            .checked_mul(1_000_000)
            .filter(|ns| *ns <= MAX_DELAY_NS)
            .ok_or_else(|| {
                HistogramError::InvalidArguments(format!(
                    "resolution must be at most {}ms, got {}",
                    MAX_DELAY_NS / 1_000_000,
                    options.resolution_ms
                ))
            })?;
        let histogram =
            RecordableHistogram::new(HistogramOptions::new().with_highest(MAX_DELAY_NS))?;
        let resolution = Duration::from_millis(options.resolution_ms);
        let last_sample_ns = clock.now_ns();

        Ok(Self {
            sampler: Arc::new(Sampler {
                clock,
                resolution_ns,
                state: Mutex::new(SamplerState {
                    histogram,
                    last_sample_ns,
                }),
            }),
            resolution,
            runtime,
            timer: None,
        })
    }

    /// Start sampling. Returns `false` if already enabled.
    pub fn enable(&mut self) -> bool {
        if self.timer.is_some() {
            return false;
        }

        self.sampler.restart();
        let sampler = Arc::clone(&self.sampler);
        let period = self.resolution;
        self.timer = Some(self.runtime.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sampler.sample();
            }
        }));

        tracing::debug!(
            target: "histogram::interval",
            resolution_ms = period.as_millis() as u64,
            "event loop delay monitoring enabled"
        );
        true
    }

    /// Stop sampling. Returns `false` if already disabled.
    pub fn disable(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.abort();
                tracing::debug!(
                    target: "histogram::interval",
                    "event loop delay monitoring disabled"
                );
                true
            }
            None => false,
        }
    }

    /// Whether the timer is running.
    pub fn is_enabled(&self) -> bool {
        self.timer.is_some()
    }

    /// Sampling period.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Number of recorded delays.
    pub fn count(&self) -> u64 {
        self.sampler.lock().histogram.count()
    }

    /// Number of delays beyond one hour.
    pub fn exceeds(&self) -> u64 {
        self.sampler.lock().histogram.exceeds()
    }

    /// Smallest recorded delay in nanoseconds.
    pub fn min(&self) -> u64 {
        self.sampler.lock().histogram.min()
    }

    /// Largest recorded delay in nanoseconds.
    pub fn max(&self) -> u64 {
        self.sampler.lock().histogram.max()
    }

    /// Mean delay in nanoseconds.
    pub fn mean(&self) -> f64 {
        self.sampler.lock().histogram.mean()
    }

    /// Standard deviation of delays in nanoseconds.
    pub fn stddev(&self) -> f64 {
        self.sampler.lock().histogram.stddev()
    }

    /// Delay at a percentile in `(0, 100]`.
    pub fn percentile(&self, percentile: f64) -> HistogramResult<u64> {
        self.sampler.lock().histogram.percentile(percentile)
    }

    /// Percentile distribution of delays.
    pub fn percentiles(&self) -> Vec<(f64, u64)> {
        self.sampler.lock().histogram.percentiles()
    }

    /// Snapshot of every statistic.
    pub fn summary(&self) -> HistogramSummary {
        self.sampler.lock().histogram.summary()
    }

    /// Forget recorded delays. Sampling continues if enabled.
    pub fn reset(&self) {
        self.sampler.lock().histogram.reset();
    }
}

impl Drop for IntervalHistogram {
    fn drop(&mut self) {
        self.disable();
    }
}

impl fmt::Debug for IntervalHistogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalHistogram")
            .field("resolution", &self.resolution)
            .field("enabled", &self.is_enabled())
            .field("count", &self.count())
            .finish()
    }
}

/// Create a disabled event-loop delay monitor on the current tokio runtime.
pub fn monitor_event_loop_delay(
    options: IntervalHistogramOptions,
) -> HistogramResult<IntervalHistogram> {
    let runtime = Handle::try_current().map_err(|_| HistogramError::NoRuntime)?;
    IntervalHistogram::new(options, Arc::new(MonotonicClock::new()), runtime)
}
