//! Bounded retention buffer
//!
//! Entries are kept in insertion order. When a push would exceed the capacity
//! the oldest entries are evicted first.

use std::collections::VecDeque;
use std::sync::Arc;

use super::entry::LogEntry;

/// Default maximum number of retained entries
pub const DEFAULT_MAX_CAPACITY: usize = 1000;

/// Immutable point-in-time copy of the buffer, in insertion order
pub type Snapshot = Arc<[LogEntry]>;

/// Ordered, bounded FIFO store of log entries
///
/// Not synchronized on its own; `LogBus` guards it with a mutex.
#[derive(Debug)]
pub struct RetentionBuffer {
    entries: VecDeque<LogEntry>,
    max_capacity: usize,
}

impl RetentionBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(max_capacity: usize) -> Self {
        let max_capacity = max_capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(max_capacity.min(DEFAULT_MAX_CAPACITY)),
            max_capacity,
        }
    }

    /// Create a buffer pre-filled with `entries`, keeping only the newest ones
    pub fn from_entries(entries: Vec<LogEntry>, max_capacity: usize) -> Self {
        let mut buffer = Self::new(max_capacity);
        buffer.entries = entries.into();
        buffer.trim();
        buffer
    }

    /// Append an entry at the tail
    ///
    /// Returns the number of entries evicted from the head.
    pub fn push(&mut self, entry: LogEntry) -> usize {
        self.entries.push_back(entry);
        self.trim()
    }

    fn trim(&mut self) -> usize {
        let excess = self.entries.len().saturating_sub(self.max_capacity);
        self.entries.drain(..excess);
        excess
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> Snapshot {
        self.entries.iter().cloned().collect()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }
}

impl Default for RetentionBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::entry::{EntryId, LogLevel};

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, message, Some("test"), None)
    }

    #[test]
    fn test_push_and_snapshot() {
        let mut buffer = RetentionBuffer::new(10);
        buffer.push(entry("one"));
        buffer.push(entry("two"));

        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].message, "one");
        assert_eq!(snapshot[1].message, "two");
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut buffer = RetentionBuffer::new(5);
        for i in 0..50 {
            buffer.push(entry(&format!("msg {}", i)));
            assert!(buffer.len() <= 5);
        }
    }

    #[test]
    fn test_fifo_eviction_keeps_newest_in_order() {
        let mut buffer = RetentionBuffer::new(3);
        let mut ids: Vec<EntryId> = Vec::new();
        for i in 0..7 {
            let e = entry(&format!("msg {}", i));
            ids.push(e.id.clone());
            buffer.push(e);
        }

        let retained: Vec<EntryId> = buffer.snapshot().iter().map(|e| e.id.clone()).collect();
        assert_eq!(retained, ids[4..].to_vec());
    }

    #[test]
    fn test_push_reports_evictions() {
        let mut buffer = RetentionBuffer::new(2);
        assert_eq!(buffer.push(entry("1")), 0);
        assert_eq!(buffer.push(entry("2")), 0);
        assert_eq!(buffer.push(entry("3")), 1);
    }

    #[test]
    fn test_from_entries_trims_oldest() {
        let entries: Vec<_> = (0..5).map(|i| entry(&i.to_string())).collect();
        let buffer = RetentionBuffer::from_entries(entries, 2);
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].message, "3");
        assert_eq!(snapshot[1].message, "4");
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buffer = RetentionBuffer::new(0);
        buffer.push(entry("only"));
        assert_eq!(buffer.max_capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut buffer = RetentionBuffer::default();
        buffer.push(entry("x"));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.max_capacity(), DEFAULT_MAX_CAPACITY);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut buffer = RetentionBuffer::new(4);
        buffer.push(entry("before"));
        let snapshot = buffer.snapshot();
        buffer.push(entry("after"));
        assert_eq!(snapshot.len(), 1);
    }
}
