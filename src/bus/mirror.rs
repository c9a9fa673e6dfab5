//! Persistence mirror
//!
//! Keeps a best-effort durable copy of the buffer under a single namespace
//! key. Writes are handed to a dedicated writer thread so a slow backend
//! never stalls appends.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::buffer::Snapshot;
use super::codec;
use super::entry::LogEntry;
use super::error::MirrorError;
use super::fallback::FallbackSink;

/// Default namespace key for the persisted record
pub const DEFAULT_STORAGE_KEY: &str = "logbus_entries";

/// Key/value backend holding persisted records
pub trait Storage: Send + Sync {
    /// Read the record stored under `key`, `None` if absent
    fn read(&self, key: &str) -> io::Result<Option<String>>;
    /// Replace the record stored under `key`
    fn write(&self, key: &str, value: &str) -> io::Result<()>;
    /// Delete the record stored under `key`; absent records are not an error
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Stores each record as `<key>.json` in a directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the file backing `key`
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.record_path(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.record_path(key), value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.record_path(key)) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// In-process storage; clones share the same records
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current raw record under `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Work item for the writer thread
#[derive(Debug)]
enum MirrorCommand {
    Save(Snapshot),
    Remove,
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Drop every save that is immediately superseded by another save or a remove
fn coalesce(batch: Vec<MirrorCommand>) -> Vec<MirrorCommand> {
    let mut out: Vec<MirrorCommand> = Vec::with_capacity(batch.len());
    for cmd in batch {
        if matches!(cmd, MirrorCommand::Save(_) | MirrorCommand::Remove)
            && matches!(out.last(), Some(MirrorCommand::Save(_)))
        {
            out.pop();
        }
        out.push(cmd);
    }
    out
}

/// State shared with the writer thread
struct Writer {
    key: String,
    storage: Arc<dyn Storage>,
    fallback: Arc<dyn FallbackSink>,
    max_entries: usize,
}

impl Writer {
    fn run(self, mut rx: mpsc::UnboundedReceiver<MirrorCommand>) {
        while let Some(first) = rx.blocking_recv() {
            let mut batch = vec![first];
            while let Ok(cmd) = rx.try_recv() {
                batch.push(cmd);
            }

            for cmd in coalesce(batch) {
                match cmd {
                    MirrorCommand::Save(snapshot) => self.save(&snapshot),
                    MirrorCommand::Remove => self.remove(),
                    MirrorCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                    MirrorCommand::Shutdown => return,
                }
            }
        }
    }

    fn save(&self, snapshot: &[LogEntry]) {
        let start = snapshot.len().saturating_sub(self.max_entries);
        let result = codec::encode(&snapshot[start..])
            .map_err(MirrorError::Serialize)
            .and_then(|content| {
                self.storage
                    .write(&self.key, &content)
                    .map_err(|source| MirrorError::Write {
                        key: self.key.clone(),
                        source,
                    })
            });

        match result {
            Ok(()) => debug!(key = %self.key, entries = snapshot.len() - start, "Mirrored log entries"),
            Err(err) => self.fallback.report(&err.into()),
        }
    }

    fn remove(&self) {
        if let Err(source) = self.storage.remove(&self.key) {
            let err = MirrorError::Remove {
                key: self.key.clone(),
                source,
            };
            self.fallback.report(&err.into());
        }
    }
}

/// Best-effort durable shadow copy of the retention buffer
pub struct PersistenceMirror {
    key: String,
    storage: Arc<dyn Storage>,
    fallback: Arc<dyn FallbackSink>,
    max_entries: usize,
    tx: mpsc::UnboundedSender<MirrorCommand>,
    worker: Option<JoinHandle<()>>,
}

impl PersistenceMirror {
    /// Create a mirror and start its writer thread
    pub fn new(
        key: impl Into<String>,
        storage: Arc<dyn Storage>,
        fallback: Arc<dyn FallbackSink>,
        max_entries: usize,
    ) -> Self {
        let key = key.into();
        let max_entries = max_entries.max(1);
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = Writer {
            key: key.clone(),
            storage: Arc::clone(&storage),
            fallback: Arc::clone(&fallback),
            max_entries,
        };
        let worker = thread::Builder::new()
            .name("logbus-mirror".to_string())
            .spawn(move || writer.run(rx))
            .map_err(|e| warn!(error = %e, "Failed to start mirror writer thread"))
            .ok();

        Self {
            key,
            storage,
            fallback,
            max_entries,
            tx,
            worker,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted history
    ///
    /// Absent records yield an empty history. Unreadable or corrupt records
    /// also yield an empty history and report one fault.
    pub fn load(&self) -> Vec<LogEntry> {
        match self.try_load() {
            Ok(mut entries) => {
                let excess = entries.len().saturating_sub(self.max_entries);
                entries.drain(..excess);
                entries
            }
            Err(err) => {
                self.fallback.report(&err.into());
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<LogEntry>, MirrorError> {
        let content = self
            .storage
            .read(&self.key)
            .map_err(|source| MirrorError::Read {
                key: self.key.clone(),
                source,
            })?;

        match content {
            Some(content) if !content.trim().is_empty() => {
                codec::decode(&content).map_err(|source| MirrorError::Parse {
                    key: self.key.clone(),
                    source,
                })
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Queue a write of `snapshot`; returns immediately
    pub fn save(&self, snapshot: Snapshot) {
        self.send(MirrorCommand::Save(snapshot));
    }

    /// Queue deletion of the persisted record; returns immediately
    pub fn remove(&self) {
        self.send(MirrorCommand::Remove);
    }

    /// Block until every command queued before this call has been processed
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context. Use
    /// [`flush_async`](Self::flush_async) there.
    pub fn flush(&self) {
        if let Some(done) = self.request_flush() {
            let _ = done.blocking_recv();
        }
    }

    /// Async counterpart of [`flush`](Self::flush)
    pub async fn flush_async(&self) {
        if let Some(done) = self.request_flush() {
            let _ = done.await;
        }
    }

    fn request_flush(&self) -> Option<oneshot::Receiver<()>> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(MirrorCommand::Flush(done_tx)).then_some(done_rx)
    }

    fn send(&self, cmd: MirrorCommand) -> bool {
        if self.worker.is_none() || self.tx.send(cmd).is_err() {
            warn!(key = %self.key, "Mirror writer unavailable, dropping command");
            return false;
        }
        true
    }
}

impl Drop for PersistenceMirror {
    fn drop(&mut self) {
        let _ = self.tx.send(MirrorCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::entry::LogLevel;
    use crate::bus::fallback::testing::RecordingSink;
    use tempfile::TempDir;

    fn entries(n: usize) -> Snapshot {
        (0..n)
            .map(|i| LogEntry::new(LogLevel::Info, format!("msg {}", i), None, None))
            .collect()
    }

    fn mirror(storage: Arc<dyn Storage>, max: usize) -> (PersistenceMirror, RecordingSink) {
        let sink = RecordingSink::default();
        let mirror = PersistenceMirror::new("test_logs", storage, Arc::new(sink.clone()), max);
        (mirror, sink)
    }

    /// Storage whose writes always fail with a full disk
    struct FullDisk;

    impl Storage for FullDisk {
        fn read(&self, _key: &str) -> io::Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::StorageFull))
        }

        fn remove(&self, _key: &str) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_load_absent_is_empty_without_fault() {
        let (mirror, sink) = mirror(Arc::new(MemoryStorage::new()), 10);
        assert!(mirror.load().is_empty());
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_save_then_load() {
        let storage = MemoryStorage::new();
        let (mirror, sink) = mirror(Arc::new(storage.clone()), 10);
        let snapshot = entries(3);

        mirror.save(snapshot.clone());
        mirror.flush();

        assert!(storage.get("test_logs").is_some());
        assert_eq!(mirror.load(), snapshot.to_vec());
        assert_eq!(sink.count(), 0);
    }

    #[test]
    fn test_save_caps_to_max_entries() {
        let storage = MemoryStorage::new();
        let (mirror, _) = mirror(Arc::new(storage.clone()), 2);
        let snapshot = entries(5);

        mirror.save(snapshot.clone());
        mirror.flush();

        let loaded = mirror.load();
        assert_eq!(loaded, snapshot[3..].to_vec());
    }

    #[test]
    fn test_corrupt_payload_reports_one_fault() {
        let storage = MemoryStorage::new();
        storage
            .write("test_logs", r#"[{"id":"1","timestamp":"2026-"#)
            .unwrap();
        let (mirror, sink) = mirror(Arc::new(storage), 10);

        assert!(mirror.load().is_empty());
        assert_eq!(sink.count(), 1);
        assert!(sink.faults()[0].contains("corrupt"));
    }

    #[test]
    fn test_remove_deletes_record() {
        let storage = MemoryStorage::new();
        let (mirror, _) = mirror(Arc::new(storage.clone()), 10);

        mirror.save(entries(1));
        mirror.remove();
        mirror.flush();

        assert!(storage.get("test_logs").is_none());
    }

    #[test]
    fn test_write_failure_goes_to_fallback() {
        let (mirror, sink) = mirror(Arc::new(FullDisk), 10);
        mirror.save(entries(1));
        mirror.flush();

        assert_eq!(sink.count(), 1);
        assert!(sink.faults()[0].starts_with("persistence"));
    }

    #[test]
    fn test_file_storage_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("data"));
        let (mirror, _) = mirror(Arc::new(storage.clone()), 10);
        let snapshot = entries(2);

        mirror.save(snapshot.clone());
        mirror.flush();

        assert!(storage.record_path("test_logs").exists());
        assert_eq!(mirror.load(), snapshot.to_vec());

        mirror.remove();
        mirror.flush();
        assert!(!storage.record_path("test_logs").exists());
    }

    #[test]
    fn test_flush_async_waits_for_writer() {
        let storage = MemoryStorage::new();
        let (mirror, _) = mirror(Arc::new(storage.clone()), 10);

        mirror.save(entries(2));
        tokio_test::block_on(mirror.flush_async());

        assert!(storage.get("test_logs").is_some());
    }

    #[test]
    fn test_file_storage_remove_absent_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());
        assert!(storage.remove("missing").is_ok());
        assert!(storage.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_coalesce_keeps_last_save_and_order() {
        let (tx, _rx) = oneshot::channel();
        let batch = vec![
            MirrorCommand::Save(entries(1)),
            MirrorCommand::Save(entries(2)),
            MirrorCommand::Flush(tx),
            MirrorCommand::Save(entries(3)),
            MirrorCommand::Remove,
            MirrorCommand::Save(entries(4)),
        ];

        let out = coalesce(batch);
        assert_eq!(out.len(), 4);
        assert!(matches!(&out[0], MirrorCommand::Save(s) if s.len() == 2));
        assert!(matches!(out[1], MirrorCommand::Flush(_)));
        assert!(matches!(out[2], MirrorCommand::Remove));
        assert!(matches!(&out[3], MirrorCommand::Save(s) if s.len() == 4));
    }
}
