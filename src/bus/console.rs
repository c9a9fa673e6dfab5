//! Console mirroring observer
//!
//! Forwards newly appended entries to `tracing` so they show up in the
//! process log alongside everything else.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use super::buffer::Snapshot;
use super::entry::{EntryId, LogEntry, LogLevel};

/// Observer that re-emits new entries as `tracing` events
#[derive(Debug, Default)]
pub struct ConsoleMirror {
    /// Id of the newest entry already forwarded, `None` before the first delivery
    last_seen: Mutex<Option<Cursor>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Empty,
    At(EntryId),
}

impl ConsoleMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one snapshot delivery
    pub fn observe(&self, snapshot: &Snapshot) {
        let mut last_seen = self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = new_entries(last_seen.as_ref(), snapshot);

        match fresh {
            Delta::Replay(n) => debug!(target: "logbus::console", entries = n, "Replayed history"),
            Delta::Cleared => info!(target: "logbus::console", "Log bus cleared"),
            Delta::Appended(entries) => entries.iter().for_each(emit),
            Delta::Unchanged => {}
        }

        *last_seen = Some(match snapshot.last() {
            Some(entry) => Cursor::At(entry.id.clone()),
            None => Cursor::Empty,
        });
    }
}

#[derive(Debug, PartialEq)]
enum Delta<'a> {
    Replay(usize),
    Cleared,
    Appended(&'a [LogEntry]),
    Unchanged,
}

fn new_entries<'a>(last_seen: Option<&Cursor>, snapshot: &'a [LogEntry]) -> Delta<'a> {
    let Some(cursor) = last_seen else {
        return Delta::Replay(snapshot.len());
    };

    if snapshot.is_empty() {
        return match cursor {
            Cursor::Empty => Delta::Unchanged,
            Cursor::At(_) => Delta::Cleared,
        };
    }

    let start = match cursor {
        Cursor::Empty => 0,
        Cursor::At(id) => snapshot
            .iter()
            .rposition(|e| &e.id == id)
            .map(|pos| pos + 1)
            .unwrap_or(0),
    };

    if start == snapshot.len() {
        Delta::Unchanged
    } else {
        Delta::Appended(&snapshot[start..])
    }
}

fn emit(entry: &LogEntry) {
    let context = entry.context.as_deref().unwrap_or("-");
    let id = entry.id.as_str();
    let level = entry.level.as_str();
    let message = entry.message.as_str();

    match entry.level {
        LogLevel::Debug => debug!(target: "logbus::console", id, kind = level, context, "{}", message),
        LogLevel::Info | LogLevel::Success | LogLevel::Api | LogLevel::User => {
            info!(target: "logbus::console", id, kind = level, context, "{}", message)
        }
        LogLevel::Warn => warn!(target: "logbus::console", id, kind = level, context, "{}", message),
        LogLevel::Error => error!(target: "logbus::console", id, kind = level, context, "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[LogEntry]) -> Snapshot {
        entries.iter().cloned().collect()
    }

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(LogLevel::Info, message, None, None)
    }

    #[test]
    fn test_first_delivery_is_replay() {
        let entries = [entry("a"), entry("b")];
        assert_eq!(new_entries(None, &entries), Delta::Replay(2));
    }

    #[test]
    fn test_only_new_entries_after_cursor() {
        let entries = [entry("a"), entry("b"), entry("c")];
        let cursor = Cursor::At(entries[0].id.clone());
        match new_entries(Some(&cursor), &entries) {
            Delta::Appended(fresh) => {
                assert_eq!(fresh.len(), 2);
                assert_eq!(fresh[0].message, "b");
            }
            other => panic!("unexpected delta {:?}", other),
        }
    }

    #[test]
    fn test_clear_is_reported_once() {
        let entries = [entry("a")];
        let cursor = Cursor::At(entries[0].id.clone());
        assert_eq!(new_entries(Some(&cursor), &[]), Delta::Cleared);
        assert_eq!(new_entries(Some(&Cursor::Empty), &[]), Delta::Unchanged);
    }

    #[test]
    fn test_after_clear_everything_is_new() {
        let entries = [entry("fresh")];
        assert_eq!(
            new_entries(Some(&Cursor::Empty), &entries),
            Delta::Appended(&entries[..])
        );
    }

    #[test]
    fn test_observe_tracks_cursor() {
        let mirror = ConsoleMirror::new();
        let a = entry("a");
        let b = entry("b");

        mirror.observe(&snapshot(&[a.clone()]));
        mirror.observe(&snapshot(&[a, b.clone()]));

        let cursor = mirror.last_seen.lock().unwrap().clone();
        assert_eq!(cursor, Some(Cursor::At(b.id)));
    }
}
