//! Performance Timeline
//!
//! This crate implements the W3C Performance Timeline and User Timing model
//! for an embedded runtime:
//! - Marks and measures recorded on an insertion-ordered timeline
//! - Mark-to-timestamp resolution for `measure`
//! - Performance observers with coalesced, asynchronous delivery
//! - Garbage-collection entries produced from a reference-counted runtime hook
//! - Event-loop idle time and loop counters passed through from the host
//!
//! Every timeline is an explicit [`Performance`] value; nothing is global.
//! Observer delivery happens on a [`Scheduler`] supplied at construction:
//! [`TurnQueue`] for an explicit run loop or [`TokioScheduler`] for a tokio
//! runtime.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use timeline::{ObserveOptions, Performance, TurnQueue};
//!
//! let queue = Arc::new(TurnQueue::new());
//! let perf = Performance::new(queue.clone());
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let observer = perf.observer(move |list, _| {
//!     sink.lock().unwrap().extend(list.get_entries().iter().map(|e| e.name().to_string()));
//! });
//! observer.observe(ObserveOptions::single("mark")).unwrap();
//!
//! perf.mark("a");
//! perf.mark("b");
//! assert!(seen.lock().unwrap().is_empty());
//!
//! queue.run_until_idle();
//! assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
//! ```
//!
//! # Modules
//!
//! - [`clock`] - Monotonic clock sources
//! - [`entry`] - Entry types and the immutable entry record
//! - [`buffer`] - Timeline buffer and entry lists
//! - [`resolver`] - Mark-to-timestamp conversion for `measure`
//! - [`observer`] - Performance observers and subscription requests
//! - [`scheduler`] - Deferred task scheduling
//! - [`gc`] - Garbage-collection hook management

pub mod buffer;
pub mod clock;
mod config;
mod dispatch;
pub mod entry;
mod error;
pub mod gc;
mod loop_metrics;
pub mod observer;
mod performance;
pub mod resolver;
pub mod scheduler;

pub use buffer::{EntryFilter, EntryList, TimelineBuffer};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::TimelineConfig;
pub use entry::{EntryDetail, EntryRef, EntryType, EntryTypeSet, GcDetail, PerformanceEntry};
pub use error::{TimelineError, TimelineResult};
pub use gc::{CallbackGcBackend, GcBackend, GcEntrySource, GcHookHandle, GcSink, GcTracker};
pub use loop_metrics::{LoopMetrics, LoopMetricsSource, LoopTiming, NoLoopMetrics};
pub use observer::{
    ObserveOptions, ObserverCallback, ObserverId, ObserverMode, PerformanceObserver,
    SubscriptionRequest,
};
pub use performance::{MarkOptions, Performance, PerformanceBuilder};
pub use resolver::{MarkRef, MeasureArgs, MeasureOptions};
pub use scheduler::{Scheduler, Task, TokioScheduler, TurnQueue};
