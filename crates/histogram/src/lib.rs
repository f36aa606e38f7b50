//! Histograms for the performance timeline
//!
//! This crate provides the histogram half of the performance API:
//! - [`RecordableHistogram`]: values recorded by the caller
//! - [`IntervalHistogram`]: event-loop delay sampled by a recurring timer
//!
//! Both keep their statistics in an HDR histogram. Values beyond the
//! configured range are counted in `exceeds` and excluded from every other
//! statistic.
//!
//! # Example
//!
//! ```rust
//! use histogram::{create_histogram, HistogramOptions};
//!
//! let mut h = create_histogram(HistogramOptions::new().with_highest(1_000)).unwrap();
//! h.record(12);
//! h.record(40);
//! h.record(5_000); // out of range
//!
//! assert_eq!(h.count(), 2);
//! assert_eq!(h.exceeds(), 1);
//! assert_eq!(h.max(), 40);
//! ```

mod error;
mod histogram;
mod interval;

pub use error::{HistogramError, HistogramResult};
pub use histogram::{
    create_histogram, HistogramOptions, HistogramSummary, RecordableHistogram, MAX_SAFE_INTEGER,
};
pub use interval::{
    monitor_event_loop_delay, IntervalHistogram, IntervalHistogramOptions, MAX_DELAY_NS,
};
