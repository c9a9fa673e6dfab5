//! Read-side filtering and statistics over a snapshot

use super::entry::{LogEntry, LogLevel};

/// Predicates applied to entries; every set predicate must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    /// Exact level match
    pub level: Option<LogLevel>,
    /// Case-sensitive substring of the entry context
    pub context: Option<String>,
    /// Case-insensitive substring of the message or context
    pub search: Option<String>,
}

impl LogFilter {
    /// Filter that matches everything
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    /// Check a single entry against the filter
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }

        if let Some(context) = non_empty(&self.context) {
            let found = entry
                .context
                .as_deref()
                .is_some_and(|c| c.contains(context));
            if !found {
                return false;
            }
        }

        if let Some(term) = non_empty(&self.search) {
            let term = term.to_lowercase();
            let in_message = entry.message.to_lowercase().contains(&term);
            let in_context = entry
                .context
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(&term));
            if !in_message && !in_context {
                return false;
            }
        }

        true
    }

    /// Matching entries, in their original order
    pub fn apply(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        entries.iter().filter(|e| self.matches(e)).cloned().collect()
    }
}

/// Empty strings are treated as an omitted predicate
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Per-level entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    counts: [usize; 7],
}

impl LevelStats {
    /// Count entries per level
    pub fn from_entries(entries: &[LogEntry]) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.add_entry(entry);
        }
        stats
    }

    /// Add one entry to the counts
    pub fn add_entry(&mut self, entry: &LogEntry) {
        self.counts[entry.level.index()] += 1;
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.counts[level.index()]
    }

    /// Sum over all levels
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Warnings plus errors
    pub fn alert_count(&self) -> usize {
        self.count(LogLevel::Warn) + self.count(LogLevel::Error)
    }

    /// All seven levels with their counts, zeros included
    pub fn iter(&self) -> impl Iterator<Item = (LogLevel, usize)> + '_ {
        LogLevel::ALL
            .into_iter()
            .map(move |level| (level, self.count(level)))
    }
}
