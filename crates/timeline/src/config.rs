//! Timeline configuration.

use serde::{Deserialize, Serialize};

use crate::entry::{EntryType, EntryTypeSet};

/// Configuration for a [`Performance`](crate::Performance) timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineConfig {
    /// Entry types observers may subscribe to. Requests for anything else
    /// are silently dropped.
    pub supported_entry_types: Vec<EntryType>,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            supported_entry_types: EntryType::ALL.to_vec(),
        }
    }
}

impl TimelineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the entry types observers may subscribe to.
    pub fn with_supported_entry_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = EntryType>,
    {
        self.supported_entry_types = types.into_iter().collect();
        self
    }

    /// Supported types as a set.
    pub fn supported_set(&self) -> EntryTypeSet {
        self.supported_entry_types.iter().copied().collect()
    }
}
