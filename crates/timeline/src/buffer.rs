//! The global timeline buffer and read-only entry lists.

use crate::entry::{EntryRef, EntryType};

/// Predicate used to select entries for queries and clearing.
///
/// An unset field matches everything, so the default filter selects all
/// entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    /// Only entries with this name
    pub name: Option<String>,
    /// Only entries of this type
    pub entry_type: Option<EntryType>,
}

impl EntryFilter {
    /// Match every entry.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match entries by name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            entry_type: None,
        }
    }

    /// Match entries by type.
    pub fn by_type(entry_type: EntryType) -> Self {
        Self {
            name: None,
            entry_type: Some(entry_type),
        }
    }

    /// Narrow the filter to a name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether an entry satisfies the filter.
    pub fn matches(&self, entry: &EntryRef) -> bool {
        self.entry_type.map_or(true, |t| entry.entry_type() == t)
            && self.name.as_deref().map_or(true, |n| entry.name() == n)
    }
}

/// Insertion-ordered store of every mark and measure created on a timeline.
///
/// Entries are never edited in place; clearing removes them.
#[derive(Debug, Default)]
pub struct TimelineBuffer {
    entries: Vec<EntryRef>,
}

impl TimelineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the end of the timeline.
    pub fn append(&mut self, entry: EntryRef) {
        self.entries.push(entry);
    }

    /// All entries in insertion order.
    pub fn all(&self) -> &[EntryRef] {
        &self.entries
    }

    /// Entries with the given name, in insertion order.
    pub fn by_name(&self, name: &str) -> Vec<EntryRef> {
        self.select(&EntryFilter::by_name(name))
    }

    /// Entries of the given type, in insertion order.
    pub fn by_type(&self, entry_type: EntryType) -> Vec<EntryRef> {
        self.select(&EntryFilter::by_type(entry_type))
    }

    /// Entries matching a filter, in insertion order.
    pub fn select(&self, filter: &EntryFilter) -> Vec<EntryRef> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    /// The most recently inserted mark with the given name.
    pub fn last_mark(&self, name: &str) -> Option<&EntryRef> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.entry_type() == EntryType::Mark && entry.name() == name)
    }

    /// Remove every entry matching the filter, returning how many were removed.
    pub fn clear(&mut self, filter: &EntryFilter) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| !filter.matches(entry));
        before - self.entries.len()
    }

    /// Number of buffered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Snapshot of entries handed to observer callbacks.
#[derive(Debug, Clone, Default)]
pub struct EntryList {
    entries: Vec<EntryRef>,
}

impl EntryList {
    /// Wrap a list of entries.
    pub fn new(entries: Vec<EntryRef>) -> Self {
        Self { entries }
    }

    /// All entries in delivery order.
    pub fn get_entries(&self) -> &[EntryRef] {
        &self.entries
    }

    /// Entries with the given name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<EntryRef> {
        self.filtered(&EntryFilter::by_name(name))
    }

    /// Entries of the given type.
    pub fn get_entries_by_type(&self, entry_type: EntryType) -> Vec<EntryRef> {
        self.filtered(&EntryFilter::by_type(entry_type))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the list.
    pub fn into_entries(self) -> Vec<EntryRef> {
        self.entries
    }

    fn filtered(&self, filter: &EntryFilter) -> Vec<EntryRef> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PerformanceEntry;
    use std::sync::Arc;

    fn mark(name: &str, at: f64) -> EntryRef {
        Arc::new(PerformanceEntry::mark(name, at, None))
    }

    fn measure(name: &str, at: f64, duration: f64) -> EntryRef {
        Arc::new(PerformanceEntry::measure(name, at, duration, None))
    }

    fn names(entries: &[EntryRef]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[test]
    fn test_buffer_preserves_insertion_order() {
        let mut buffer = TimelineBuffer::new();
        buffer.append(mark("b", 2.0));
        buffer.append(mark("a", 1.0));
        buffer.append(measure("ab", 1.0, 1.0));

        assert_eq!(names(buffer.all()), vec!["b", "a", "ab"]);
        assert_eq!(buffer.by_type(EntryType::Mark).len(), 2);
        assert_eq!(names(&buffer.by_name("ab")), vec!["ab"]);
    }

    #[test]
    fn test_last_mark_wins() {
        let mut buffer = TimelineBuffer::new();
        buffer.append(mark("tick", 1.0));
        buffer.append(measure("tick", 5.0, 1.0));
        buffer.append(mark("tick", 3.0));

        assert_eq!(buffer.last_mark("tick").map(|e| e.start_time()), Some(3.0));
        assert!(buffer.last_mark("tock").is_none());
    }

    #[test]
    fn test_clear_by_name_and_type() {
        let mut buffer = TimelineBuffer::new();
        buffer.append(mark("a", 1.0));
        buffer.append(mark("b", 2.0));
        buffer.append(measure("a", 1.0, 1.0));

        let removed = buffer.clear(&EntryFilter::by_type(EntryType::Mark).with_name("a"));
        assert_eq!(removed, 1);
        assert_eq!(names(buffer.all()), vec!["b", "a"]);
        assert_eq!(buffer.all()[1].entry_type(), EntryType::Measure);

        assert_eq!(buffer.clear(&EntryFilter::all()), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_entry_list_filters() {
        let list = EntryList::new(vec![mark("a", 1.0), measure("a", 1.0, 2.0), mark("b", 3.0)]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.get_entries_by_name("a").len(), 2);
        assert_eq!(names(&list.get_entries_by_type(EntryType::Mark)), vec!["a", "b"]);
        assert!(list.get_entries_by_type(EntryType::Gc).is_empty());
    }
}
