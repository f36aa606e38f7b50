//! Observer registry and coalesced dispatch bookkeeping.
//!
//! Routing appends an entry to every interested observer and marks it
//! pending. The first observer marked pending while no dispatch is scheduled
//! asks the caller to schedule one; later ones ride along until the
//! scheduled task takes the pending snapshot.

use std::sync::{Arc, Weak};

use crate::entry::EntryRef;
use crate::observer::{ObserverId, ObserverInner};

type Slot = (ObserverId, Weak<ObserverInner>);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: Vec<Slot>,
    pending: Vec<Slot>,
    dispatch_scheduled: bool,
}

impl ObserverRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add an observer. Registration order is kept; re-registering is a no-op.
    pub(crate) fn register(&mut self, observer: &Arc<ObserverInner>) {
        if !self.is_registered(observer.id) {
            self.observers.push((observer.id, Arc::downgrade(observer)));
        }
    }

    /// Remove an observer from routing and from the pending set.
    pub(crate) fn unregister(&mut self, id: ObserverId) {
        self.observers.retain(|(slot, _)| *slot != id);
        self.pending.retain(|(slot, _)| *slot != id);
    }

    pub(crate) fn is_registered(&self, id: ObserverId) -> bool {
        self.observers.iter().any(|(slot, _)| *slot == id)
    }

    /// Number of registered observers that are still alive.
    pub(crate) fn len(&self) -> usize {
        self.observers
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Queue an entry on every observer subscribed to its type.
    ///
    /// Returns `true` when the caller must schedule a dispatch task.
    pub(crate) fn route(&mut self, entry: &EntryRef) -> bool {
        let mut schedule = false;
        let mut interested = Vec::new();

        self.observers.retain(|(id, weak)| match weak.upgrade() {
            Some(observer) => {
                let mut state = observer.lock_state();
                if state.entry_types.contains(entry.entry_type()) {
                    state.records.push(Arc::clone(entry));
                    drop(state);
                    interested.push((*id, observer));
                }
                true
            }
            None => false,
        });

        for (_, observer) in &interested {
            schedule |= self.mark_pending(observer);
        }
        schedule
    }

    /// Flag an observer for the next dispatch turn.
    ///
    /// Returns `true` when no dispatch was scheduled yet; the flag is set and
    /// the caller must schedule one.
    pub(crate) fn mark_pending(&mut self, observer: &Arc<ObserverInner>) -> bool {
        if !self.pending.iter().any(|(id, _)| *id == observer.id) {
            self.pending.push((observer.id, Arc::downgrade(observer)));
        }
        if self.dispatch_scheduled {
            false
        } else {
            self.dispatch_scheduled = true;
            true
        }
    }

    /// Take the pending snapshot at the start of a dispatch turn.
    ///
    /// Clears the scheduled flag so routing during the callbacks arms a
    /// fresh turn. Observers that were unregistered or dropped are skipped.
    pub(crate) fn take_pending(&mut self) -> Vec<Arc<ObserverInner>> {
        self.dispatch_scheduled = false;
        let pending = std::mem::take(&mut self.pending);
        pending
            .into_iter()
            .filter(|(id, _)| self.is_registered(*id))
            .filter_map(|(_, weak)| weak.upgrade())
            .collect()
    }

    pub(crate) fn is_dispatch_scheduled(&self) -> bool {
        self.dispatch_scheduled
    }
}
