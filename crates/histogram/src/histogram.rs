//! Recordable histograms over an HDR backend.
//!
//! Values above the configured `highest` bound are not recorded; they are
//! only counted in [`exceeds`](RecordableHistogram::exceeds) and never show
//! up in min, max, mean or percentiles.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::error::{HistogramError, HistogramResult};

/// Largest integer exactly representable as an IEEE double.
pub const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

/// Options for creating a histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistogramOptions {
    /// Lowest discernible value
    pub lowest: u64,
    /// Highest trackable value
    pub highest: u64,
    /// Number of significant decimal digits kept
    pub figures: u8,
}

impl Default for HistogramOptions {
    fn default() -> Self {
        Self {
            lowest: 1,
            highest: MAX_SAFE_INTEGER,
            figures: 3,
        }
    }
}

impl HistogramOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lowest discernible value.
    pub fn with_lowest(mut self, lowest: u64) -> Self {
        self.lowest = lowest;
        self
    }

    /// Set the highest trackable value.
    pub fn with_highest(mut self, highest: u64) -> Self {
        self.highest = highest;
        self
    }

    /// Set the number of significant figures.
    pub fn with_figures(mut self, figures: u8) -> Self {
        self.figures = figures;
        self
    }

    fn validate(&self) -> HistogramResult<()> {
        if self.lowest < 1 {
            return Err(HistogramError::InvalidArguments(
                "lowest must be at least 1".to_string(),
            ));
        }
        if self.highest < self.lowest.saturating_mul(2) {
            return Err(HistogramError::InvalidArguments(format!(
                "highest must be at least twice lowest ({} < 2 * {})",
                self.highest, self.lowest
            )));
        }
        if !(1..=5).contains(&self.figures) {
            return Err(HistogramError::InvalidArguments(format!(
                "figures must be between 1 and 5, got {}",
                self.figures
            )));
        }
        Ok(())
    }
}

/// Serializable snapshot of a histogram's statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSummary {
    /// Number of recorded values
    pub count: u64,
    /// Number of values dropped for exceeding the range
    pub exceeds: u64,
    /// Smallest recorded value
    pub min: u64,
    /// Largest recorded value
    pub max: u64,
    /// Mean of recorded values
    pub mean: f64,
    /// Standard deviation of recorded values
    pub stddev: f64,
    /// `(percentile, value)` pairs
    pub percentiles: Vec<(f64, u64)>,
}

/// Histogram that values can be recorded into.
#[derive(Debug, Clone)]
pub struct RecordableHistogram {
    inner: Histogram<u64>,
    options: HistogramOptions,
    count: u64,
    exceeds: u64,
}

impl RecordableHistogram {
    /// Create a histogram with the given bounds and precision.
    pub fn new(options: HistogramOptions) -> HistogramResult<Self> {
        options.validate()?;
        let inner = Histogram::new_with_bounds(options.lowest, options.highest, options.figures)
            .map_err(|e| HistogramError::Creation(format!("{:?}", e)))?;
        Ok(Self {
            inner,
            options,
            count: 0,
            exceeds: 0,
        })
    }

    /// Record a value. Returns `false` when it exceeded the range.
    pub fn record(&mut self, value: u64) -> bool {
        // The backend rounds its range up to a whole bucket, so enforce the
        // configured bound here.
        if value > self.options.highest {
            self.exceeds += 1;
            return false;
        }
        match self.inner.record(value) {
            Ok(()) => {
                self.count += 1;
                true
            }
            Err(_) => {
                self.exceeds += 1;
                false
            }
        }
    }

    /// Merge another histogram's values and counters into this one.
    ///
    /// Fails without merging anything when `other` holds values above this
    /// histogram's `highest` bound.
    pub fn add(&mut self, other: &RecordableHistogram) -> HistogramResult<()> {
        if !other.inner.is_empty() {
            let other_max = other.inner.lowest_equivalent(other.inner.max());
            if other_max > self.options.highest {
                return Err(HistogramError::Addition(format!(
                    "value {} exceeds highest trackable value {}",
                    other_max, self.options.highest
                )));
            }
        }
        self.inner
            .add(&other.inner)
            .map_err(|e| HistogramError::Addition(format!("{:?}", e)))?;
        self.count += other.count;
        self.exceeds += other.exceeds;
        Ok(())
    }

    /// Forget every recorded value and counter.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.count = 0;
        self.exceeds = 0;
    }

    /// Number of recorded values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of values dropped for exceeding the range.
    pub fn exceeds(&self) -> u64 {
        self.exceeds
    }

    /// Smallest recorded value.
    pub fn min(&self) -> u64 {
        self.inner.min()
    }

    /// Largest recorded value.
    pub fn max(&self) -> u64 {
        self.inner.max()
    }

    /// Mean of recorded values.
    pub fn mean(&self) -> f64 {
        self.inner.mean()
    }

    /// Standard deviation of recorded values.
    pub fn stddev(&self) -> f64 {
        self.inner.stdev()
    }

    /// Value at a percentile in `(0, 100]`.
    pub fn percentile(&self, percentile: f64) -> HistogramResult<u64> {
        if !(percentile > 0.0 && percentile <= 100.0) {
            return Err(HistogramError::InvalidArguments(format!(
                "percentile must be in (0, 100], got {}",
                percentile
            )));
        }
        Ok(self.inner.value_at_percentile(percentile))
    }

    /// Percentile distribution, halving the remaining distance each step.
    pub fn percentiles(&self) -> Vec<(f64, u64)> {
        if self.inner.is_empty() {
            return vec![(100.0, 0)];
        }
        self.inner
            .iter_quantiles(1)
            .map(|v| (v.quantile_iterated_to() * 100.0, v.value_iterated_to()))
            .collect()
    }

    /// Options this histogram was created with.
    pub fn options(&self) -> HistogramOptions {
        self.options
    }

    /// Snapshot of every statistic.
    pub fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            count: self.count,
            exceeds: self.exceeds,
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            stddev: self.stddev(),
            percentiles: self.percentiles(),
        }
    }
}

/// Create a recordable histogram.
pub fn create_histogram(options: HistogramOptions) -> HistogramResult<RecordableHistogram> {
    RecordableHistogram::new(options)
}
