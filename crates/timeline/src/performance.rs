//! The `Performance` facade and the shared timeline state behind it.
//!
//! One [`Performance`] value owns one independent timeline: its buffer,
//! its observers, its GC subscription count and its dispatch flag. All of
//! that mutable state sits behind a single mutex so that buffer mutation,
//! routing and dispatch scheduling stay ordered with respect to each other.
//! Observer callbacks and collaborator hooks always run with the lock
//! released.

use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::buffer::{EntryFilter, EntryList, TimelineBuffer};
use crate::clock::{Clock, MonotonicClock};
use crate::config::TimelineConfig;
use crate::dispatch::ObserverRegistry;
use crate::entry::{EntryRef, EntryType, EntryTypeSet, PerformanceEntry};
use crate::error::{TimelineError, TimelineResult};
use crate::gc::{CallbackGcBackend, GcBackend, GcEntrySource, GcSink, GcTracker};
use crate::loop_metrics::{LoopMetrics, LoopMetricsSource, LoopTiming, NoLoopMetrics};
use crate::observer::{
    ObserverId, ObserverInner, ObserverMode, PerformanceObserver, SubscriptionRequest,
};
use crate::resolver::{resolve_measure, MeasureArgs};
use crate::scheduler::Scheduler;

/// Options for [`Performance::mark_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkOptions {
    /// Explicit timestamp instead of the current time
    pub start_time: Option<f64>,
    /// Opaque value attached to the mark
    pub detail: Option<Value>,
}

impl MarkOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit start time.
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Attach a detail value.
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

struct TimelineState {
    buffer: TimelineBuffer,
    registry: ObserverRegistry,
}

pub(crate) struct TimelineShared {
    clock: Arc<dyn Clock>,
    time_origin: f64,
    scheduler: Arc<dyn Scheduler>,
    loop_metrics: Arc<dyn LoopMetricsSource>,
    pub(crate) supported: EntryTypeSet,
    pub(crate) gc: GcTracker,
    next_observer_id: AtomicU64,
    state: Mutex<TimelineState>,
    self_ref: Weak<TimelineShared>,
}

impl TimelineShared {
    fn lock(&self) -> MutexGuard<'_, TimelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> f64 {
        self.clock.now_ms() - self.time_origin
    }

    /// Route an entry to observers and optionally keep it on the timeline.
    fn process_entry(&self, entry: EntryRef, append: bool) {
        let schedule = {
            let mut state = self.lock();
            let schedule = state.registry.route(&entry);
            if append {
                state.buffer.append(entry);
            }
            schedule
        };
        if schedule {
            self.schedule_dispatch();
        }
    }

    fn schedule_dispatch(&self) {
        let timeline = self.self_ref.clone();
        self.scheduler.schedule(Box::new(move || {
            if let Some(timeline) = timeline.upgrade() {
                timeline.dispatch_pending();
            }
        }));
    }

    /// Deliver queued entries to every pending observer, once each.
    fn dispatch_pending(&self) {
        let observers = self.lock().registry.take_pending();
        tracing::debug!(
            target: "timeline::observer",
            observers = observers.len(),
            "dispatching observer callbacks"
        );

        for inner in observers {
            let list = EntryList::new(inner.take_records());
            let callback = Arc::clone(&inner.callback);
            let observer = PerformanceObserver { inner };
            let outcome = catch_unwind(AssertUnwindSafe(|| callback(&list, &observer)));
            if let Err(panic) = outcome {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(
                    target: "timeline::observer",
                    observer = observer.id().0,
                    error = %message,
                    "observer callback panicked"
                );
            }
        }
    }

    pub(crate) fn observe(
        &self,
        observer: &Arc<ObserverInner>,
        request: SubscriptionRequest,
    ) -> TimelineResult<()> {
        let requested = request.mode();
        let entry_types = request.entry_types(self.supported);

        let (had_gc, schedule) = {
            let mut timeline = self.lock();
            let mut state = observer.lock_state();

            if state.mode != ObserverMode::Unset && state.mode != requested {
                return Err(TimelineError::InvalidModification(
                    "cannot change the observer type".to_string(),
                ));
            }
            if state.mode == ObserverMode::Unset {
                state.mode = requested;
            }

            let had_gc = state.entry_types.contains(EntryType::Gc);
            state.entry_types = entry_types;

            let mut replayed = false;
            if request.is_buffered() {
                for entry_type in entry_types.iter() {
                    let existing = timeline.buffer.by_type(entry_type);
                    replayed |= !existing.is_empty();
                    state.records.extend(existing);
                }
            }
            drop(state);

            let schedule = if entry_types.is_empty() {
                timeline.registry.unregister(observer.id);
                observer.lock_state().mode = ObserverMode::Unset;
                false
            } else {
                timeline.registry.register(observer);
                replayed && timeline.registry.mark_pending(observer)
            };
            (had_gc, schedule)
        };

        let has_gc = entry_types.contains(EntryType::Gc);
        if has_gc && !had_gc {
            self.gc.subscribe();
        } else if had_gc && !has_gc {
            self.gc.unsubscribe();
        }

        tracing::debug!(
            target: "timeline::observer",
            observer = observer.id.0,
            mode = ?requested,
            entry_types = ?entry_types,
            "observer subscription updated"
        );

        if schedule {
            self.schedule_dispatch();
        }
        Ok(())
    }

    pub(crate) fn disconnect(&self, observer: &Arc<ObserverInner>) {
        let had_gc = {
            let mut timeline = self.lock();
            timeline.registry.unregister(observer.id);
            let mut state = observer.lock_state();
            let had_gc = state.entry_types.contains(EntryType::Gc);
            state.entry_types.clear();
            state.mode = ObserverMode::Unset;
            had_gc
        };
        if had_gc {
            self.gc.unsubscribe();
        }
        tracing::debug!(
            target: "timeline::observer",
            observer = observer.id.0,
            "observer disconnected"
        );
    }

    fn on_gc(&self, start_time_ms: f64, duration_ms: f64, kind: u32) {
        let entry = Arc::new(PerformanceEntry::gc(
            start_time_ms - self.time_origin,
            duration_ms,
            kind,
        ));
        self.process_entry(entry, false);
    }
}

/// Builder for [`Performance`].
pub struct PerformanceBuilder {
    scheduler: Arc<dyn Scheduler>,
    clock: Option<Arc<dyn Clock>>,
    gc_backend: Option<Arc<dyn GcBackend>>,
    loop_metrics: Option<Arc<dyn LoopMetricsSource>>,
    config: TimelineConfig,
}

impl PerformanceBuilder {
    /// Read time from this clock instead of the process monotonic clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Produce `gc` entries from this backend.
    pub fn gc_backend(mut self, backend: Arc<dyn GcBackend>) -> Self {
        self.gc_backend = Some(backend);
        self
    }

    /// Report event-loop statistics from this source.
    pub fn loop_metrics(mut self, source: Arc<dyn LoopMetricsSource>) -> Self {
        self.loop_metrics = Some(source);
        self
    }

    /// Apply a configuration.
    pub fn config(mut self, config: TimelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the timeline. The time origin is the clock reading at this call.
    pub fn build(self) -> Performance {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let gc_backend = self
            .gc_backend
            .unwrap_or_else(|| Arc::new(CallbackGcBackend::new()));
        let loop_metrics = self.loop_metrics.unwrap_or_else(|| Arc::new(NoLoopMetrics));
        let time_origin = clock.now_ms();
        let scheduler = self.scheduler;
        let supported = self.config.supported_set();

        let shared = Arc::new_cyclic(|weak: &Weak<TimelineShared>| {
            let target = weak.clone();
            let sink: GcSink = Arc::new(move |start, duration, kind| {
                if let Some(timeline) = target.upgrade() {
                    timeline.on_gc(start, duration, kind);
                }
            });
            TimelineShared {
                clock,
                time_origin,
                scheduler,
                loop_metrics,
                supported,
                gc: GcTracker::new(gc_backend, sink),
                next_observer_id: AtomicU64::new(1),
                state: Mutex::new(TimelineState {
                    buffer: TimelineBuffer::new(),
                    registry: ObserverRegistry::new(),
                }),
                self_ref: weak.clone(),
            }
        });

        Performance { shared }
    }
}

/// A performance timeline.
///
/// Cloning yields another handle to the same timeline.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use timeline::{MeasureArgs, ObserveOptions, Performance, TurnQueue};
///
/// let queue = Arc::new(TurnQueue::new());
/// let perf = Performance::new(queue.clone());
///
/// let observer = perf.observer(|list, _observer| {
///     for entry in list.get_entries() {
///         println!("{} {}", entry.name(), entry.duration());
///     }
/// });
/// observer.observe(ObserveOptions::single("measure")).unwrap();
///
/// perf.mark("start");
/// perf.mark("end");
/// perf.measure("work", MeasureArgs::between("start", "end")).unwrap();
///
/// // Observers are notified on the next scheduler turn.
/// queue.run_until_idle();
/// ```
#[derive(Clone)]
pub struct Performance {
    shared: Arc<TimelineShared>,
}

impl Performance {
    /// Create a timeline with default collaborators.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::builder(scheduler).build()
    }

    /// Start configuring a timeline that dispatches on `scheduler`.
    pub fn builder(scheduler: Arc<dyn Scheduler>) -> PerformanceBuilder {
        PerformanceBuilder {
            scheduler,
            clock: None,
            gc_backend: None,
            loop_metrics: None,
            config: TimelineConfig::default(),
        }
    }

    /// Milliseconds since the timeline origin.
    pub fn now(&self) -> f64 {
        self.shared.now()
    }

    /// Clock reading, in milliseconds, at which this timeline started.
    pub fn time_origin(&self) -> f64 {
        self.shared.time_origin
    }

    /// Record a mark at the current time.
    pub fn mark(&self, name: &str) -> EntryRef {
        let entry = Arc::new(PerformanceEntry::mark(name, self.now(), None));
        self.record(entry)
    }

    /// Record a mark with an explicit start time or detail.
    pub fn mark_with(&self, name: &str, options: MarkOptions) -> TimelineResult<EntryRef> {
        let start_time = match options.start_time {
            Some(t) if !t.is_finite() || t < 0.0 => {
                return Err(TimelineError::InvalidArguments(format!(
                    "mark start time must be a non-negative finite number, got {}",
                    t
                )));
            }
            Some(t) => t,
            None => self.now(),
        };
        let entry = Arc::new(PerformanceEntry::mark(name, start_time, options.detail));
        Ok(self.record(entry))
    }

    /// Record a measure between two points on the timeline.
    pub fn measure(&self, name: &str, args: impl Into<MeasureArgs>) -> TimelineResult<EntryRef> {
        let now = self.now();
        let schedule;
        let entry = {
            let mut state = self.shared.lock();
            let resolved = resolve_measure(&state.buffer, args.into(), now)?;
            let entry = Arc::new(PerformanceEntry::measure(
                name,
                resolved.start_time,
                resolved.duration,
                resolved.detail,
            ));
            schedule = state.registry.route(&entry);
            state.buffer.append(Arc::clone(&entry));
            entry
        };
        if schedule {
            self.shared.schedule_dispatch();
        }
        tracing::trace!(
            target: "timeline::entry",
            name = name,
            start_time = entry.start_time(),
            duration = entry.duration(),
            "measure recorded"
        );
        Ok(entry)
    }

    fn record(&self, entry: EntryRef) -> EntryRef {
        self.shared.process_entry(Arc::clone(&entry), true);
        tracing::trace!(
            target: "timeline::entry",
            name = entry.name(),
            start_time = entry.start_time(),
            "mark recorded"
        );
        entry
    }

    /// Remove marks, all of them or only those with `name`.
    ///
    /// Measures are never affected. Returns the number of entries removed.
    pub fn clear_marks(&self, name: Option<&str>) -> usize {
        self.clear(EntryType::Mark, name)
    }

    /// Remove measures, all of them or only those with `name`.
    pub fn clear_measures(&self, name: Option<&str>) -> usize {
        self.clear(EntryType::Measure, name)
    }

    fn clear(&self, entry_type: EntryType, name: Option<&str>) -> usize {
        let mut filter = EntryFilter::by_type(entry_type);
        if let Some(name) = name {
            filter = filter.with_name(name);
        }
        self.shared.lock().buffer.clear(&filter)
    }

    /// Every mark and measure on the timeline, in insertion order.
    pub fn get_entries(&self) -> Vec<EntryRef> {
        self.shared.lock().buffer.all().to_vec()
    }

    /// Timeline entries with the given name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<EntryRef> {
        self.shared.lock().buffer.by_name(name)
    }

    /// Timeline entries of the given type.
    pub fn get_entries_by_type(&self, entry_type: EntryType) -> Vec<EntryRef> {
        self.shared.lock().buffer.by_type(entry_type)
    }

    /// Create an unsubscribed observer.
    pub fn observer<F>(&self, callback: F) -> PerformanceObserver
    where
        F: Fn(&EntryList, &PerformanceObserver) + Send + Sync + 'static,
    {
        let id = ObserverId(self.shared.next_observer_id.fetch_add(1, Ordering::Relaxed));
        PerformanceObserver {
            inner: Arc::new(ObserverInner::new(
                id,
                Arc::clone(&self.shared),
                Arc::new(callback),
            )),
        }
    }

    /// Entry types observers on this timeline may subscribe to.
    pub fn supported_entry_types(&self) -> Vec<EntryType> {
        self.shared.supported.iter().collect()
    }

    /// Number of live registered observers.
    pub fn observer_count(&self) -> usize {
        self.shared.lock().registry.len()
    }

    /// Whether a dispatch task is currently scheduled.
    pub fn is_dispatch_scheduled(&self) -> bool {
        self.shared.lock().registry.is_dispatch_scheduled()
    }

    /// Number of observer subscriptions to `gc` entries.
    pub fn gc_subscribers(&self) -> usize {
        self.shared.gc.subscriber_count()
    }

    /// Milliseconds the event loop has spent idle.
    pub fn idle_time(&self) -> f64 {
        self.shared.loop_metrics.idle_time()
    }

    /// Current event-loop counters.
    pub fn metrics_info(&self) -> LoopMetrics {
        self.shared.loop_metrics.metrics_info()
    }

    /// Idle time and loop counters in one snapshot.
    pub fn node_timing(&self) -> LoopTiming {
        LoopTiming {
            idle_time: self.idle_time(),
            loop_metrics: self.metrics_info(),
        }
    }
}

impl fmt::Debug for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Performance")
            .field("time_origin", &self.shared.time_origin)
            .field("entries", &state.buffer.len())
            .field("observers", &state.registry.len())
            .finish()
    }
}
