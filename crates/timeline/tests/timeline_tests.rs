//! Integration tests for the performance timeline
//!
//! These tests drive a timeline end to end through a manual clock and an
//! explicit run loop, so every dispatch point is deterministic.

use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use timeline::{
    CallbackGcBackend, EntryRef, EntryType, ManualClock, MeasureArgs, MeasureOptions,
    ObserveOptions, ObserverMode, Performance, PerformanceObserver, TimelineConfig, TimelineError,
    TokioScheduler, TurnQueue,
};

/// Timeline wired to deterministic collaborators
struct Harness {
    queue: Arc<TurnQueue>,
    clock: Arc<ManualClock>,
    gc: Arc<CallbackGcBackend>,
    perf: Performance,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(TimelineConfig::default())
    }

    fn with_config(config: TimelineConfig) -> Self {
        let queue = Arc::new(TurnQueue::new());
        let clock = Arc::new(ManualClock::new(5_000_000_000));
        let gc = Arc::new(CallbackGcBackend::new());
        let perf = Performance::builder(queue.clone())
            .clock(clock.clone())
            .gc_backend(gc.clone())
            .config(config)
            .build();
        Self {
            queue,
            clock,
            gc,
            perf,
        }
    }

    fn mark_after(&self, name: &str, ms: u64) -> EntryRef {
        self.clock.advance_ms(ms);
        self.perf.mark(name)
    }

    /// Observer that records every delivered batch
    fn recorder(&self) -> (PerformanceObserver, Arc<Mutex<Vec<Vec<EntryRef>>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let observer = self.perf.observer(move |list, _| {
            sink.lock().unwrap().push(list.get_entries().to_vec());
        });
        (observer, batches)
    }
}

fn names(entries: &[EntryRef]) -> Vec<&str> {
    entries.iter().map(|e| e.name()).collect()
}

#[test]
fn test_marks_are_returned_in_call_order() {
    let h = Harness::new();
    h.mark_after("one", 1);
    h.mark_after("two", 1);
    h.mark_after("three", 1);

    let entries = h.perf.get_entries();
    assert_eq!(names(&entries), vec!["one", "two", "three"]);
    assert_eq!(entries[0].start_time(), 1.0);
    assert_eq!(entries[2].start_time(), 3.0);
}

#[test]
fn test_measure_between_two_marks() {
    let h = Harness::new();
    let a = h.mark_after("a", 2);
    let b = h.mark_after("b", 5);

    let ab = h.perf.measure("ab", MeasureArgs::between("a", "b")).unwrap();
    assert_eq!(ab.entry_type(), EntryType::Measure);
    assert_eq!(ab.start_time(), a.start_time());
    assert_eq!(ab.duration(), b.start_time() - a.start_time());
}

#[test]
fn test_reused_mark_name_resolves_to_latest() {
    let h = Harness::new();
    h.mark_after("tick", 1);
    let latest = h.mark_after("tick", 4);
    h.clock.advance_ms(10);

    let m = h.perf.measure("since", MeasureArgs::from_start("tick")).unwrap();
    assert_eq!(m.start_time(), latest.start_time());
    assert_eq!(m.duration(), 10.0);
}

#[test]
fn test_clear_marks_keeps_resolved_measures() {
    let h = Harness::new();
    h.mark_after("a", 1);
    h.mark_after("b", 3);
    h.perf.measure("ab", MeasureArgs::between("a", "b")).unwrap();
    h.perf.measure("a", MeasureArgs::from_start(0.5)).unwrap();

    assert_eq!(h.perf.clear_marks(Some("a")), 1);

    let entries = h.perf.get_entries();
    assert_eq!(names(&entries), vec!["b", "ab", "a"]);
    let ab = &h.perf.get_entries_by_name("ab")[0];
    assert_eq!(ab.start_time(), 1.0);
    assert_eq!(ab.duration(), 3.0);

    // The cleared name no longer resolves.
    assert_eq!(
        h.perf.measure("again", MeasureArgs::from_start("a")).unwrap_err(),
        TimelineError::ReferenceNotFound("a".to_string())
    );

    assert_eq!(h.perf.clear_marks(None), 1);
    assert_eq!(h.perf.get_entries_by_type(EntryType::Mark).len(), 0);
    assert_eq!(h.perf.clear_measures(None), 2);
    assert!(h.perf.get_entries().is_empty());
}

#[test]
fn test_clear_measures_by_name() {
    let h = Harness::new();
    h.mark_after("x", 1);
    h.perf.measure("x", MeasureArgs::from_start("x")).unwrap();
    h.perf.measure("y", MeasureArgs::from_start("x")).unwrap();

    assert_eq!(h.perf.clear_measures(Some("x")), 1);
    assert_eq!(names(&h.perf.get_entries()), vec!["x", "y"]);
}

#[test]
fn test_measure_option_validation() {
    let h = Harness::new();
    assert!(matches!(
        h.perf.measure("m", MeasureOptions::new()),
        Err(TimelineError::InvalidArguments(_))
    ));
    assert!(matches!(
        h.perf.measure(
            "m",
            MeasureOptions::new()
                .with_start(1.0)
                .with_end(2.0)
                .with_duration(1.0)
        ),
        Err(TimelineError::InvalidArguments(_))
    ));
    assert!(h.perf.get_entries().is_empty());
}

#[test]
fn test_measure_detail_and_duration_options() {
    let h = Harness::new();
    h.mark_after("start", 4);
    let m = h
        .perf
        .measure(
            "work",
            MeasureOptions::new()
                .with_start("start")
                .with_duration(6.0)
                .with_detail(serde_json::json!({"items": 3})),
        )
        .unwrap();
    assert_eq!(m.start_time(), 4.0);
    assert_eq!(m.duration(), 6.0);
    assert_eq!(m.user_detail(), Some(&serde_json::json!({"items": 3})));
}

#[test]
fn test_entry_types_observer_only_sees_marks() {
    let h = Harness::new();
    let (observer, batches) = h.recorder();
    observer.observe(ObserveOptions::multiple(["mark"])).unwrap();

    h.mark_after("a", 1);
    h.perf.measure("m", MeasureArgs::from_start("a")).unwrap();
    h.gc.emit(5_000.0 + 2.0, 1.0, 1);
    h.queue.run_until_idle();

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(names(&batches[0]), vec!["a"]);
    assert!(batches[0].iter().all(|e| e.entry_type() == EntryType::Mark));
}

#[test]
fn test_mode_switch_fails_both_ways() {
    let h = Harness::new();

    let single = h.perf.observer(|_, _| {});
    single.observe(ObserveOptions::single("mark")).unwrap();
    assert!(matches!(
        single.observe(ObserveOptions::multiple(["mark"])),
        Err(TimelineError::InvalidModification(_))
    ));

    let multiple = h.perf.observer(|_, _| {});
    multiple.observe(ObserveOptions::multiple(["mark"])).unwrap();
    assert!(matches!(
        multiple.observe(ObserveOptions::single("mark")),
        Err(TimelineError::InvalidModification(_))
    ));

    assert!(matches!(
        multiple.observe(ObserveOptions::default()),
        Err(TimelineError::InvalidArguments(_))
    ));
    assert_eq!(h.perf.observer_count(), 2);
}

#[test]
fn test_buffered_observer_gets_one_batch_in_order() {
    let h = Harness::new();
    h.mark_after("m1", 1);
    h.mark_after("m2", 1);
    h.perf.measure("between", MeasureArgs::between("m1", "m2")).unwrap();

    let (observer, batches) = h.recorder();
    observer
        .observe(ObserveOptions::single("mark").with_buffered(true))
        .unwrap();
    h.mark_after("m3", 1);

    assert_eq!(h.queue.pending_tasks(), 1);
    h.queue.run_until_idle();

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(names(&batches[0]), vec!["m1", "m2", "m3"]);
}

#[test]
fn test_buffered_with_no_history_waits_for_new_entries() {
    let h = Harness::new();
    let (observer, batches) = h.recorder();
    observer
        .observe(ObserveOptions::single("measure").with_buffered(true))
        .unwrap();
    assert_eq!(h.queue.pending_tasks(), 0);

    h.queue.run_until_idle();
    assert!(batches.lock().unwrap().is_empty());
}

#[test]
fn test_entries_visible_before_dispatch() {
    let h = Harness::new();
    let (observer, batches) = h.recorder();
    observer.observe(ObserveOptions::single("mark")).unwrap();

    h.mark_after("sync", 1);
    assert_eq!(names(&h.perf.get_entries()), vec!["sync"]);
    assert!(batches.lock().unwrap().is_empty());
}

#[test]
fn test_each_observer_called_once_per_turn() {
    let h = Harness::new();
    let (marks, mark_batches) = h.recorder();
    let (all, all_batches) = h.recorder();
    marks.observe(ObserveOptions::single("mark")).unwrap();
    all.observe(ObserveOptions::multiple(["mark", "measure"])).unwrap();

    h.mark_after("a", 1);
    h.mark_after("b", 1);
    h.perf.measure("ab", MeasureArgs::between("a", "b")).unwrap();
    assert_eq!(h.queue.pending_tasks(), 1);
    h.queue.run_until_idle();

    assert_eq!(mark_batches.lock().unwrap().len(), 1);
    assert_eq!(names(&mark_batches.lock().unwrap()[0]), vec!["a", "b"]);
    assert_eq!(all_batches.lock().unwrap().len(), 1);
    assert_eq!(names(&all_batches.lock().unwrap()[0]), vec!["a", "b", "ab"]);

    // A new turn is armed after the first one fired.
    h.mark_after("c", 1);
    h.queue.run_until_idle();
    assert_eq!(mark_batches.lock().unwrap().len(), 2);
}

#[test]
fn test_entries_created_in_callback_go_to_next_turn() {
    let h = Harness::new();
    let perf = h.perf.clone();
    let batches = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&batches);
    let observer = h.perf.observer(move |list, _| {
        let batch: Vec<String> = list.get_entries().iter().map(|e| e.name().to_string()).collect();
        if batch == ["first"] {
            perf.mark("second");
        }
        sink.lock().unwrap().push(batch);
    });
    observer.observe(ObserveOptions::single("mark")).unwrap();

    h.perf.mark("first");
    assert_eq!(h.queue.run_turn(), 1);
    assert_eq!(batches.lock().unwrap().len(), 1);
    assert_eq!(h.queue.pending_tasks(), 1);

    h.queue.run_until_idle();
    assert_eq!(
        *batches.lock().unwrap(),
        vec![vec!["first".to_string()], vec!["second".to_string()]]
    );
}

#[test]
fn test_disconnect_before_turn_skips_delivery() {
    let h = Harness::new();
    let (observer, batches) = h.recorder();
    observer.observe(ObserveOptions::single("mark")).unwrap();

    h.mark_after("a", 1);
    observer.disconnect();
    h.mark_after("b", 1);
    h.queue.run_until_idle();

    assert!(batches.lock().unwrap().is_empty());
    // Entries queued before the disconnect stay until taken.
    assert_eq!(names(&observer.take_records()), vec!["a"]);
}

#[test]
fn test_disconnect_is_idempotent() {
    let h = Harness::new();
    let observer = h.perf.observer(|_, _| {});
    observer.observe(ObserveOptions::single("gc")).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 1);

    observer.disconnect();
    observer.disconnect();
    assert_eq!(h.perf.gc_subscribers(), 0);
    assert_eq!(h.perf.observer_count(), 0);
    assert!(!h.gc.is_enabled());
}

#[test]
fn test_unsupported_resubscribe_releases_gc() {
    let h = Harness::new();
    let observer = h.perf.observer(|_, _| {});
    observer.observe(ObserveOptions::single("gc")).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 1);
    assert!(h.gc.is_enabled());

    // Nothing supported remains, so the observer is disconnected.
    observer.observe(ObserveOptions::single("bogus")).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 0);
    assert_eq!(h.perf.observer_count(), 0);
    assert!(!h.gc.is_enabled());
    assert_eq!(observer.mode(), ObserverMode::Unset);

    // Dropping afterwards must not release the subscription a second time.
    let other = h.perf.observer(|_, _| {});
    other.observe(ObserveOptions::single("gc")).unwrap();
    drop(observer);
    assert_eq!(h.perf.gc_subscribers(), 1);
    assert!(h.gc.is_enabled());
}

#[test]
fn test_panicking_callback_does_not_block_others() {
    let h = Harness::new();
    let bad = h.perf.observer(|_, _| panic!("observer failure"));
    let (good, batches) = h.recorder();
    bad.observe(ObserveOptions::single("mark")).unwrap();
    good.observe(ObserveOptions::single("mark")).unwrap();

    h.mark_after("a", 1);
    h.queue.run_until_idle();
    assert_eq!(batches.lock().unwrap().len(), 1);

    // The engine keeps working after the failure.
    h.mark_after("b", 1);
    h.queue.run_until_idle();
    assert_eq!(batches.lock().unwrap().len(), 2);
}

#[test]
fn test_gc_hook_is_reference_counted() {
    let h = Harness::new();
    let first = h.perf.observer(|_, _| {});
    let second = h.perf.observer(|_, _| {});

    assert!(!h.gc.is_enabled());
    first.observe(ObserveOptions::single("gc")).unwrap();
    second.observe(ObserveOptions::multiple(["gc", "mark"])).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 2);
    assert_eq!(h.gc.hook_count(), 1);

    // Re-observing the same type does not count twice.
    first.observe(ObserveOptions::single("gc")).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 2);

    // Switching away from gc releases the subscription.
    second.observe(ObserveOptions::multiple(["mark"])).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 1);
    assert!(h.gc.is_enabled());

    first.disconnect();
    assert_eq!(h.perf.gc_subscribers(), 0);
    assert!(!h.gc.is_enabled());
}

#[test]
fn test_dropping_gc_observer_releases_hook() {
    let h = Harness::new();
    let observer = h.perf.observer(|_, _| {});
    observer.observe(ObserveOptions::single("gc")).unwrap();
    assert!(h.gc.is_enabled());

    drop(observer);
    assert_eq!(h.perf.gc_subscribers(), 0);
    assert!(!h.gc.is_enabled());
}

#[test]
fn test_gc_entries_reach_observers_but_not_timeline() {
    let h = Harness::new();
    let (observer, batches) = h.recorder();
    observer.observe(ObserveOptions::single("gc")).unwrap();

    // Clock origin is 5000ms; the backend reports absolute readings.
    assert_eq!(h.gc.emit(5_012.5, 0.75, 4), 1);
    h.queue.run_until_idle();

    let batches = batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let entry = &batches[0][0];
    assert_eq!(entry.entry_type(), EntryType::Gc);
    assert_eq!(entry.name(), "gc");
    assert_eq!(entry.start_time(), 12.5);
    assert_eq!(entry.duration(), 0.75);
    assert_eq!(entry.gc_kind(), Some(4));

    assert!(h.perf.get_entries().is_empty());
    assert!(h.perf.get_entries_by_type(EntryType::Gc).is_empty());
}

#[test]
fn test_gc_disabled_by_config() {
    let h = Harness::with_config(
        TimelineConfig::new().with_supported_entry_types([EntryType::Mark, EntryType::Measure]),
    );
    assert_eq!(
        h.perf.supported_entry_types(),
        vec![EntryType::Mark, EntryType::Measure]
    );

    let observer = h.perf.observer(|_, _| {});
    observer.observe(ObserveOptions::multiple(["gc", "mark"])).unwrap();
    assert_eq!(h.perf.gc_subscribers(), 0);
    assert!(!observer.entry_types().contains(EntryType::Gc));
    assert!(observer.entry_types().contains(EntryType::Mark));
}

#[test]
fn test_observer_reports_timeline_supported_types() {
    let h = Harness::with_config(
        TimelineConfig::new().with_supported_entry_types([EntryType::Mark, EntryType::Measure]),
    );
    let observer = h.perf.observer(|_, _| {});
    assert_eq!(
        observer.supported_entry_types(),
        vec![EntryType::Mark, EntryType::Measure]
    );
    assert_eq!(PerformanceObserver::SUPPORTED_ENTRY_TYPES.len(), 3);

    let full = Harness::new();
    assert_eq!(
        full.perf.observer(|_, _| {}).supported_entry_types(),
        full.perf.supported_entry_types()
    );
}

#[test]
fn test_timelines_are_isolated() {
    let a = Harness::new();
    let b = Harness::new();
    a.mark_after("only-a", 1);
    assert_eq!(a.perf.get_entries().len(), 1);
    assert!(b.perf.get_entries().is_empty());
}

#[tokio::test]
async fn test_tokio_scheduler_delivers_after_current_task() {
    let scheduler = Arc::new(TokioScheduler::try_current().expect("runtime"));
    let perf = Performance::new(scheduler);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let observer = perf.observer(move |list, _| {
        let _ = tx.send(list.len());
    });
    observer.observe(ObserveOptions::single("mark")).unwrap();

    perf.mark("a");
    perf.mark("b");
    perf.mark("c");

    assert_eq!(rx.recv().await, Some(3));
    assert!(rx.try_recv().is_err());
}

proptest! {
    #[test]
    fn prop_get_entries_preserves_call_order(steps in proptest::collection::vec(1u64..50, 1..40)) {
        let h = Harness::new();
        let mut expected = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let name = format!("m{}", i);
            h.mark_after(&name, *step);
            expected.push(name);
        }

        let entries = h.perf.get_entries();
        let actual: Vec<String> = entries.iter().map(|e| e.name().to_string()).collect();
        prop_assert_eq!(actual, expected);
        prop_assert!(entries.windows(2).all(|w| w[0].start_time() < w[1].start_time()));
    }
}
