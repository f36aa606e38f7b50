//! Performance observers.
//!
//! An observer starts unsubscribed. The first `observe` call fixes its mode:
//! a single `type` subscription or a set of `entryTypes`. Later calls may
//! replace the subscription within that mode but never switch modes until
//! the observer is disconnected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::buffer::EntryList;
use crate::entry::{EntryRef, EntryType, EntryTypeSet};
use crate::error::{TimelineError, TimelineResult};
use crate::gc::GcEntrySource;
use crate::performance::TimelineShared;

/// Callback invoked once per dispatch turn with the observer's new entries.
pub type ObserverCallback = Arc<dyn Fn(&EntryList, &PerformanceObserver) + Send + Sync>;

/// Identifier unique within one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u64);

/// Subscription mode of an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverMode {
    /// Not subscribed
    Unset,
    /// Subscribed through the `type` option
    Single,
    /// Subscribed through the `entryTypes` option
    Multiple,
}

/// Options bag accepted by `observe`, as a caller would write it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObserveOptions {
    /// Single entry type to observe
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    /// Set of entry types to observe
    pub entry_types: Option<Vec<String>>,
    /// Replay matching entries already on the timeline (single mode only)
    pub buffered: bool,
}

impl ObserveOptions {
    /// Observe a single entry type.
    pub fn single(entry_type: impl Into<String>) -> Self {
        Self {
            entry_type: Some(entry_type.into()),
            ..Default::default()
        }
    }

    /// Observe a set of entry types.
    pub fn multiple<I, S>(entry_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entry_types: Some(entry_types.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Request replay of entries already on the timeline.
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }
}

/// A validated subscription request.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionRequest {
    /// `{ type, buffered }`
    Single { entry_type: String, buffered: bool },
    /// `{ entryTypes }`
    Multiple { entry_types: Vec<String> },
}

impl SubscriptionRequest {
    /// The mode this request puts an observer in.
    pub fn mode(&self) -> ObserverMode {
        match self {
            SubscriptionRequest::Single { .. } => ObserverMode::Single,
            SubscriptionRequest::Multiple { .. } => ObserverMode::Multiple,
        }
    }

    /// Requested types restricted to `supported`. Unknown names are dropped.
    pub fn entry_types(&self, supported: EntryTypeSet) -> EntryTypeSet {
        let names: Vec<&str> = match self {
            SubscriptionRequest::Single { entry_type, .. } => vec![entry_type.as_str()],
            SubscriptionRequest::Multiple { entry_types } => {
                entry_types.iter().map(String::as_str).collect()
            }
        };
        names
            .into_iter()
            .filter_map(|name| name.parse::<EntryType>().ok())
            .filter(|t| supported.contains(*t))
            .collect()
    }

    pub(crate) fn is_buffered(&self) -> bool {
        matches!(self, SubscriptionRequest::Single { buffered: true, .. })
    }
}

impl TryFrom<ObserveOptions> for SubscriptionRequest {
    type Error = TimelineError;

    fn try_from(options: ObserveOptions) -> Result<Self, Self::Error> {
        match (options.entry_type, options.entry_types) {
            (Some(entry_type), None) => Ok(SubscriptionRequest::Single {
                entry_type,
                buffered: options.buffered,
            }),
            (None, Some(entry_types)) => Ok(SubscriptionRequest::Multiple { entry_types }),
            _ => Err(TimelineError::InvalidArguments(
                "exactly one of options.type or options.entryTypes must be specified"
                    .to_string(),
            )),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ObserverState {
    pub(crate) mode: ObserverMode,
    pub(crate) entry_types: EntryTypeSet,
    pub(crate) records: Vec<EntryRef>,
}

pub(crate) struct ObserverInner {
    pub(crate) id: ObserverId,
    pub(crate) timeline: Arc<TimelineShared>,
    pub(crate) callback: ObserverCallback,
    state: Mutex<ObserverState>,
}

impl ObserverInner {
    pub(crate) fn new(
        id: ObserverId,
        timeline: Arc<TimelineShared>,
        callback: ObserverCallback,
    ) -> Self {
        Self {
            id,
            timeline,
            callback,
            state: Mutex::new(ObserverState {
                mode: ObserverMode::Unset,
                entry_types: EntryTypeSet::empty(),
                records: Vec::new(),
            }),
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, ObserverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn take_records(&self) -> Vec<EntryRef> {
        std::mem::take(&mut self.lock_state().records)
    }
}

impl Drop for ObserverInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if state.entry_types.contains(EntryType::Gc) {
            self.timeline.gc.unsubscribe();
        }
    }
}

/// Subscriber that receives batches of matching entries asynchronously.
///
/// Cloning yields another handle to the same observer. The timeline only
/// holds a weak reference; once every handle is dropped the observer stops
/// receiving entries.
#[derive(Clone)]
pub struct PerformanceObserver {
    pub(crate) inner: Arc<ObserverInner>,
}

impl PerformanceObserver {
    /// Every entry type this crate can produce.
    ///
    /// A timeline's [`TimelineConfig`](crate::TimelineConfig) may narrow
    /// this; [`supported_entry_types`](Self::supported_entry_types) reports
    /// what the observer's own timeline accepts.
    pub const SUPPORTED_ENTRY_TYPES: [EntryType; 3] = EntryType::ALL;

    /// Entry types this observer's timeline accepts in `observe`.
    pub fn supported_entry_types(&self) -> Vec<EntryType> {
        self.inner.timeline.supported.iter().collect()
    }

    /// Start or update the subscription from a raw options bag.
    pub fn observe(&self, options: ObserveOptions) -> TimelineResult<()> {
        let request = SubscriptionRequest::try_from(options)?;
        self.subscribe(request)
    }

    /// Start or update the subscription from a validated request.
    pub fn subscribe(&self, request: SubscriptionRequest) -> TimelineResult<()> {
        self.inner.timeline.observe(&self.inner, request)
    }

    /// Remove and return the entries queued for this observer.
    pub fn take_records(&self) -> Vec<EntryRef> {
        self.inner.take_records()
    }

    /// Stop receiving entries. Calling it again is a no-op.
    pub fn disconnect(&self) {
        self.inner.timeline.disconnect(&self.inner);
    }

    /// Identifier of this observer.
    pub fn id(&self) -> ObserverId {
        self.inner.id
    }

    /// Current subscription mode.
    pub fn mode(&self) -> ObserverMode {
        self.inner.lock_state().mode
    }

    /// Currently subscribed entry types.
    pub fn entry_types(&self) -> EntryTypeSet {
        self.inner.lock_state().entry_types
    }

    /// Number of entries waiting for delivery.
    pub fn pending_records(&self) -> usize {
        self.inner.lock_state().records.len()
    }
}

impl PartialEq for PerformanceObserver {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PerformanceObserver {}

impl fmt::Debug for PerformanceObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("PerformanceObserver")
            .field("id", &self.inner.id)
            .field("mode", &state.mode)
            .field("entry_types", &state.entry_types)
            .field("pending_records", &state.records.len())
            .finish()
    }
}
