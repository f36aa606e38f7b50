//! Garbage-collection entry production.
//!
//! The runtime's collection hook is installed only while at least one
//! observer subscribes to `gc` entries. [`GcTracker`] counts subscriptions
//! and installs the hook on the first one and removes it after the last.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Receives `(start_time_ms, duration_ms, kind)` for each collection cycle.
///
/// `start_time_ms` is an absolute clock reading in milliseconds, on the same
/// epoch as the timeline's [`Clock`](crate::clock::Clock).
pub type GcSink = Arc<dyn Fn(f64, f64, u32) + Send + Sync>;

/// Identifies an installed collection hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcHookHandle(pub u64);

/// Runtime facility that reports garbage-collection cycles.
pub trait GcBackend: Send + Sync {
    /// Install a hook that forwards every collection cycle to `sink`.
    fn enable(&self, sink: GcSink) -> GcHookHandle;

    /// Remove a previously installed hook.
    fn disable(&self, handle: GcHookHandle);
}

/// Reference-counted access to a stream of `gc` entries.
pub trait GcEntrySource: Send + Sync {
    /// Register interest. The first subscriber installs the hook.
    fn subscribe(&self);

    /// Drop interest. The last subscriber removes the hook.
    fn unsubscribe(&self);

    /// Number of active subscriptions.
    fn subscriber_count(&self) -> usize;
}

/// Backend for runtimes that report collections by calling in.
///
/// The embedder calls [`emit`](Self::emit) after each collection cycle; the
/// event reaches the timeline only while its hook is installed.
#[derive(Default)]
pub struct CallbackGcBackend {
    hooks: Mutex<Vec<(GcHookHandle, GcSink)>>,
    next_handle: AtomicU64,
}

impl CallbackGcBackend {
    /// Create a backend with no hooks installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a collection cycle. Returns the number of hooks notified.
    pub fn emit(&self, start_time_ms: f64, duration_ms: f64, kind: u32) -> usize {
        let sinks: Vec<GcSink> = self.lock().iter().map(|(_, sink)| Arc::clone(sink)).collect();
        for sink in &sinks {
            sink(start_time_ms, duration_ms, kind);
        }
        sinks.len()
    }

    /// Whether any hook is installed.
    pub fn is_enabled(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Number of installed hooks.
    pub fn hook_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(GcHookHandle, GcSink)>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GcBackend for CallbackGcBackend {
    fn enable(&self, sink: GcSink) -> GcHookHandle {
        let handle = GcHookHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.lock().push((handle, sink));
        handle
    }

    fn disable(&self, handle: GcHookHandle) {
        self.lock().retain(|(h, _)| *h != handle);
    }
}

impl fmt::Debug for CallbackGcBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackGcBackend")
            .field("hooks", &self.hook_count())
            .finish()
    }
}

#[derive(Debug, Default)]
struct GcTrackerState {
    subscribers: usize,
    hook: Option<GcHookHandle>,
}

/// Counts `gc` subscriptions and manages the backend hook.
pub struct GcTracker {
    backend: Arc<dyn GcBackend>,
    sink: GcSink,
    state: Mutex<GcTrackerState>,
}

impl GcTracker {
    /// Create a tracker that forwards collection cycles to `sink`.
    pub fn new(backend: Arc<dyn GcBackend>, sink: GcSink) -> Self {
        Self {
            backend,
            sink,
            state: Mutex::new(GcTrackerState::default()),
        }
    }

    /// Whether the backend hook is currently installed.
    pub fn is_hooked(&self) -> bool {
        self.lock().hook.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, GcTrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GcEntrySource for GcTracker {
    fn subscribe(&self) {
        let mut state = self.lock();
        state.subscribers += 1;
        if state.subscribers == 1 {
            state.hook = Some(self.backend.enable(Arc::clone(&self.sink)));
            tracing::debug!(target: "timeline::gc", "garbage collection hook installed");
        }
    }

    fn unsubscribe(&self) {
        let mut state = self.lock();
        if state.subscribers == 0 {
            tracing::warn!(
                target: "timeline::gc",
                "unbalanced gc unsubscribe ignored"
            );
            return;
        }
        state.subscribers -= 1;
        if state.subscribers == 0 {
            if let Some(hook) = state.hook.take() {
                self.backend.disable(hook);
                tracing::debug!(target: "timeline::gc", "garbage collection hook removed");
            }
        }
    }

    fn subscriber_count(&self) -> usize {
        self.lock().subscribers
    }
}

impl fmt::Debug for GcTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("GcTracker")
            .field("subscribers", &state.subscribers)
            .field("hook", &state.hook)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_sink() -> (GcSink, Arc<Mutex<Vec<(f64, f64, u32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let sink: GcSink = Arc::new(move |start, duration, kind| {
            s.lock().unwrap().push((start, duration, kind));
        });
        (sink, seen)
    }

    #[test]
    fn test_hook_installed_once_for_many_subscribers() {
        let backend = Arc::new(CallbackGcBackend::new());
        let (sink, seen) = counting_sink();
        let tracker = GcTracker::new(backend.clone(), sink);

        assert!(!backend.is_enabled());
        tracker.subscribe();
        tracker.subscribe();
        assert_eq!(tracker.subscriber_count(), 2);
        assert_eq!(backend.hook_count(), 1);

        assert_eq!(backend.emit(10.0, 2.0, 4), 1);
        assert_eq!(seen.lock().unwrap().as_slice(), &[(10.0, 2.0, 4)]);

        tracker.unsubscribe();
        assert!(backend.is_enabled());
        tracker.unsubscribe();
        assert!(!backend.is_enabled());
        assert!(!tracker.is_hooked());

        assert_eq!(backend.emit(11.0, 1.0, 1), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unbalanced_unsubscribe_is_ignored() {
        let backend = Arc::new(CallbackGcBackend::new());
        let (sink, _) = counting_sink();
        let tracker = GcTracker::new(backend.clone(), sink);

        tracker.unsubscribe();
        assert_eq!(tracker.subscriber_count(), 0);

        tracker.subscribe();
        assert!(backend.is_enabled());
    }
}
