//! Performance entries: marks, measures and garbage-collection records.
//!
//! Entries are immutable once built and are shared between the timeline
//! buffer and observer buffers through [`EntryRef`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TimelineError;

/// Shared handle to an immutable entry.
pub type EntryRef = Arc<PerformanceEntry>;

/// Kind of a performance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Zero-duration user-named instant
    Mark,
    /// Named interval between two points
    Measure,
    /// Garbage-collection cycle reported by the runtime
    Gc,
}

impl EntryType {
    /// Every entry type this crate knows how to produce.
    pub const ALL: [EntryType; 3] = [EntryType::Mark, EntryType::Measure, EntryType::Gc];

    /// The W3C name of this entry type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Mark => "mark",
            EntryType::Measure => "measure",
            EntryType::Gc => "gc",
        }
    }

    fn bit(self) -> u8 {
        match self {
            EntryType::Mark => 1 << 0,
            EntryType::Measure => 1 << 1,
            EntryType::Gc => 1 << 2,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mark" => Ok(EntryType::Mark),
            "measure" => Ok(EntryType::Measure),
            "gc" => Ok(EntryType::Gc),
            other => Err(TimelineError::InvalidArguments(format!(
                "unknown entry type '{}'",
                other
            ))),
        }
    }
}

/// Compact set of entry types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EntryTypeSet(u8);

impl EntryTypeSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// A set containing every entry type.
    pub fn all() -> Self {
        EntryType::ALL.into_iter().collect()
    }

    /// Add a type, returning whether it was newly inserted.
    pub fn insert(&mut self, entry_type: EntryType) -> bool {
        let added = !self.contains(entry_type);
        self.0 |= entry_type.bit();
        added
    }

    /// Remove a type.
    pub fn remove(&mut self, entry_type: EntryType) {
        self.0 &= !entry_type.bit();
    }

    /// Check membership.
    pub fn contains(&self, entry_type: EntryType) -> bool {
        self.0 & entry_type.bit() != 0
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Remove every member.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Iterate members in canonical order (`mark`, `measure`, `gc`).
    pub fn iter(&self) -> impl Iterator<Item = EntryType> + '_ {
        EntryType::ALL.into_iter().filter(|t| self.contains(*t))
    }
}

impl FromIterator<EntryType> for EntryTypeSet {
    fn from_iter<I: IntoIterator<Item = EntryType>>(iter: I) -> Self {
        let mut set = Self::empty();
        for entry_type in iter {
            set.insert(entry_type);
        }
        set
    }
}

/// Detail of a garbage-collection entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcDetail {
    /// Collection kind flags as reported by the runtime
    pub kind: u32,
}

/// Extra data attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryDetail {
    /// Opaque user value captured by `mark` or `measure`
    User(Value),
    /// Collection details for `gc` entries
    Gc(GcDetail),
}

/// A timestamped record on the performance timeline.
///
/// All times are milliseconds relative to the timeline origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    name: String,
    entry_type: EntryType,
    start_time: f64,
    duration: f64,
    detail: Option<EntryDetail>,
}

impl PerformanceEntry {
    /// Build a mark. Marks always have zero duration.
    pub fn mark(name: impl Into<String>, start_time: f64, detail: Option<Value>) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Mark,
            start_time,
            duration: 0.0,
            detail: detail.map(EntryDetail::User),
        }
    }

    /// Build a measure from an already resolved start time and duration.
    pub fn measure(
        name: impl Into<String>,
        start_time: f64,
        duration: f64,
        detail: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            entry_type: EntryType::Measure,
            start_time,
            duration,
            detail: detail.map(EntryDetail::User),
        }
    }

    /// Build a garbage-collection entry.
    pub fn gc(start_time: f64, duration: f64, kind: u32) -> Self {
        Self {
            name: EntryType::Gc.as_str().to_string(),
            entry_type: EntryType::Gc,
            start_time,
            duration,
            detail: Some(EntryDetail::Gc(GcDetail { kind })),
        }
    }

    /// Entry name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry type.
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Start time in milliseconds since the timeline origin.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Duration in milliseconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// End of the entry's interval.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Attached detail, if any.
    pub fn detail(&self) -> Option<&EntryDetail> {
        self.detail.as_ref()
    }

    /// User detail value, if this entry carries one.
    pub fn user_detail(&self) -> Option<&Value> {
        match &self.detail {
            Some(EntryDetail::User(value)) => Some(value),
            _ => None,
        }
    }

    /// Collection kind for `gc` entries.
    pub fn gc_kind(&self) -> Option<u32> {
        match &self.detail {
            Some(EntryDetail::Gc(detail)) => Some(detail.kind),
            _ => None,
        }
    }

    /// The W3C `toJSON` representation.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
