//! Log event bus
//!
//! A bounded, append-only store of structured entries that broadcasts every
//! change to its observers and mirrors itself to durable storage.
//!
//! `LogBus` is an explicit instance: whoever composes the process creates it
//! and hands `Arc<LogBus>` to producers and consumers.

mod buffer;
mod codec;
mod console;
mod entry;
mod error;
mod fallback;
mod hub;
mod mirror;
mod query;

pub use buffer::{RetentionBuffer, Snapshot, DEFAULT_MAX_CAPACITY};
pub use codec::{decode, encode, export_file_name};
pub use console::ConsoleMirror;
pub use entry::{EntryId, LogEntry, LogLevel, Metadata, UnknownLevel};
pub use error::MirrorError;
pub use fallback::{FallbackSink, Fault, TracingSink};
pub use hub::{BroadcastHub, Observer, SubscriptionId};
pub use mirror::{FileStorage, MemoryStorage, PersistenceMirror, Storage, DEFAULT_STORAGE_KEY};
pub use query::{LevelStats, LogFilter};

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Sizing and naming of a bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusOptions {
    /// Maximum retained entries
    pub max_capacity: usize,
    /// Namespace key of the persisted record
    pub storage_key: String,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

impl BusOptions {
    pub fn with_capacity(max_capacity: usize) -> Self {
        Self {
            max_capacity,
            ..Self::default()
        }
    }
}

/// The log event bus
pub struct LogBus {
    /// Serializes append and clear; held across the publish and mirror hand-offs
    buffer: Mutex<RetentionBuffer>,
    hub: BroadcastHub,
    mirror: PersistenceMirror,
    max_capacity: usize,
}

impl LogBus {
    /// Bus backed by in-memory storage, reporting faults through `tracing`
    pub fn new(options: BusOptions) -> Self {
        Self::open(options, Arc::new(MemoryStorage::new()), Arc::new(TracingSink))
    }

    /// Bus hydrated from `storage`
    pub fn open(
        options: BusOptions,
        storage: Arc<dyn Storage>,
        fallback: Arc<dyn FallbackSink>,
    ) -> Self {
        let mirror = PersistenceMirror::new(
            options.storage_key,
            storage,
            Arc::clone(&fallback),
            options.max_capacity,
        );
        let history = mirror.load();
        if !history.is_empty() {
            info!(entries = history.len(), key = %mirror.key(), "Restored persisted log history");
        }

        let buffer = RetentionBuffer::from_entries(history, options.max_capacity);
        let hub = BroadcastHub::new(buffer.snapshot(), fallback);

        Self {
            max_capacity: buffer.max_capacity(),
            buffer: Mutex::new(buffer),
            hub,
            mirror,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RetentionBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an entry and append it
    ///
    /// Returns once the entry is stored and the new snapshot is queued for
    /// every observer and for the mirror. Safe to call from inside an observer.
    pub fn append(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        context: Option<&str>,
        metadata: Option<Metadata>,
    ) -> LogEntry {
        let entry = LogEntry::new(level, message, context, metadata);
        self.append_entry(entry.clone());
        entry
    }

    /// Append an already constructed entry
    pub fn append_entry(&self, entry: LogEntry) {
        let mut buffer = self.lock();
        let evicted = buffer.push(entry);
        if evicted > 0 {
            debug!(evicted, "Evicted oldest log entries");
        }
        let snapshot = buffer.snapshot();
        self.hub.publish(snapshot.clone());
        self.mirror.save(snapshot);
    }

    pub fn debug(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::Debug, message, context, None)
    }

    pub fn info(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::Info, message, context, None)
    }

    pub fn warn(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::Warn, message, context, None)
    }

    pub fn error(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::Error, message, context, None)
    }

    pub fn success(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::Success, message, context, None)
    }

    pub fn api(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::Api, message, context, None)
    }

    pub fn user(&self, message: impl Into<String>, context: Option<&str>) -> LogEntry {
        self.append(LogLevel::User, message, context, None)
    }

    /// Empty the buffer, delete the persisted copy and broadcast the empty state
    pub fn clear(&self) {
        let mut buffer = self.lock();
        buffer.clear();
        self.hub.publish(buffer.snapshot());
        self.mirror.remove();
        info!("Cleared log bus");
    }

    /// Register `observer`, delivering the current snapshot to it first
    ///
    /// The replay runs on the calling thread. Later snapshots are delivered in
    /// order on a thread owned by the subscription, so the callback may use
    /// any method of this bus, including `append` and `clear`.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.subscribe_observer(Arc::new(observer))
    }

    /// Register a shared observer
    pub fn subscribe_observer(&self, observer: Observer) -> SubscriptionId {
        self.hub.subscribe(observer)
    }

    /// Stop notifying `id`. Returns false if it was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Receive every snapshot on a channel, starting with the current one
    ///
    /// The subscription stays registered until `unsubscribe`; deliveries to
    /// a dropped receiver are discarded.
    pub fn watch(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Snapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |snapshot: &Snapshot| {
            let _ = tx.send(snapshot.clone());
        });
        (id, rx)
    }

    /// Attach a `ConsoleMirror` observer
    pub fn mirror_to_console(&self) -> SubscriptionId {
        let console = ConsoleMirror::new();
        self.subscribe(move |snapshot: &Snapshot| console.observe(snapshot))
    }

    /// Current contents in insertion order
    ///
    /// Served from the last published snapshot, so observers may call it.
    pub fn snapshot(&self) -> Snapshot {
        self.hub.latest()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    pub fn observer_count(&self) -> usize {
        self.hub.observer_count()
    }

    /// Entries matching `filter`, in insertion order
    pub fn filter(&self, filter: &LogFilter) -> Vec<LogEntry> {
        filter.apply(&self.snapshot())
    }

    /// Per-level counts over the current contents
    pub fn stats(&self) -> LevelStats {
        LevelStats::from_entries(&self.snapshot())
    }

    /// Current contents as indented JSON
    pub fn export(&self) -> serde_json::Result<String> {
        encode(&self.snapshot())
    }

    /// Write the export to a timestamped file in `dir`
    pub fn export_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).context("Failed to create export directory")?;
        let path = dir.join(export_file_name(Local::now()));
        let content = self.export().context("Failed to serialize logs")?;
        std::fs::write(&path, content).context("Failed to write export file")?;
        info!(path = %path.display(), "Exported logs");
        Ok(path)
    }

    /// Block until every snapshot published so far has reached the observers
    /// and the mirror
    ///
    /// From inside an observer only the mirror is waited for.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context. Use
    /// [`flush_async`](Self::flush_async) there.
    pub fn flush(&self) {
        self.hub.settle();
        self.mirror.flush();
    }

    /// Async counterpart of [`flush`](Self::flush)
    pub async fn flush_async(&self) {
        self.hub.settle_async().await;
        self.mirror.flush_async().await;
    }
}

impl Default for LogBus {
    fn default() -> Self {
        Self::new(BusOptions::default())
    }
}
