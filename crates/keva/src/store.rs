//! In-memory store with background persistence
//!
//! All entries live in one `HashMap` behind a `parking_lot::RwLock`: `get`
//! takes the shared lock, `set`/`delete` the exclusive one. Snapshot files
//! are only touched while holding a separate file lock, so a `save` and a
//! `load` never interleave and snapshots reach disk in the order they were
//! taken. The map lock is held while a snapshot is encoded, never while it
//! is written to disk.

use crate::config::StoreConfig;
use crate::error::Result;
use crate::persistence::snapshot;
use crate::persistence::PersistenceHandle;
use crate::types::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info};

/// Moment a flush started
#[derive(Debug, Clone, Copy)]
struct SavePoint {
    at: Instant,
    wall: SystemTime,
}

impl SavePoint {
    fn now() -> Self {
        Self {
            at: Instant::now(),
            wall: SystemTime::now(),
        }
    }
}

/// State shared between the store handle and its persistence thread
pub(crate) struct StoreInner {
    entries: RwLock<HashMap<String, Value>>,
    /// Serializes snapshot file access (save, flush, load)
    io_lock: Mutex<()>,
    last_saved: Mutex<Option<SavePoint>>,
    config: StoreConfig,
}

impl StoreInner {
    fn new(config: StoreConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            io_lock: Mutex::new(()),
            last_saved: Mutex::new(None),
            config,
        }
    }

    pub(crate) fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True if the store was never flushed or the last flush is at least one interval old
    pub(crate) fn flush_due(&self) -> bool {
        let last_saved = *self.last_saved.lock();
        last_saved
            .map(|point| point.at.elapsed() >= self.config.interval)
            .unwrap_or(true)
    }

    /// Write the current map to the configured path and record the save time
    pub(crate) fn flush(&self) -> Result<()> {
        let _io = self.io_lock.lock();
        let started = SavePoint::now();

        let count = self.write_snapshot(&self.config.path)?;
        *self.last_saved.lock() = Some(started);

        debug!(
            "Flushed {} entries to {} in {:?}",
            count,
            self.config.path.display(),
            started.at.elapsed()
        );
        Ok(())
    }

    fn save(&self, path: &Path) -> Result<()> {
        let _io = self.io_lock.lock();
        let count = self.write_snapshot(path)?;
        debug!("Saved {} entries to {}", count, path.display());
        Ok(())
    }

    /// Caller must hold `io_lock`
    fn write_snapshot(&self, path: &Path) -> Result<usize> {
        let (bytes, count) = {
            let entries = self.entries.read();
            (snapshot::encode(&entries)?, entries.len())
        };

        snapshot::write_atomic(path, &bytes)?;
        Ok(count)
    }

    fn load(&self, path: &Path) -> Result<()> {
        let _io = self.io_lock.lock();

        match snapshot::read_or_create(path)? {
            Some(entries) => {
                let count = entries.len();
                *self.entries.write() = entries;
                info!("Loaded {} entries from {}", count, path.display());
            }
            None => {
                info!("No snapshot at {}, created empty document", path.display());
            }
        }

        Ok(())
    }
}

/// Concurrent key-value store that periodically snapshots itself to disk
///
/// The store owns a background thread that wakes every `interval` and
/// flushes the map to the configured path when the last successful flush is
/// at least one interval old. Call [`Store::close`] to stop the thread and
/// perform a final flush; dropping the store does the same but can only log
/// a failure.
///
/// Share a store between threads with `Arc<Store>`.
pub struct Store {
    inner: Arc<StoreInner>,
    persistence: PersistenceHandle,
}

impl Store {
    /// Create an empty store persisting to `path` every `interval`
    ///
    /// The persistence thread starts immediately. To restore existing data
    /// call [`Store::load`] right away, or use [`Store::open`], which loads
    /// before the first flush can run.
    pub fn new(path: impl AsRef<Path>, interval: Duration) -> Result<Self> {
        Self::with_config(StoreConfig::new(path).with_interval(interval))
    }

    /// Create an empty store from a config
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        Self::start(Arc::new(StoreInner::new(config)))
    }

    /// Load the configured snapshot (creating it if missing), then start persisting
    pub fn open(config: StoreConfig) -> Result<Self> {
        let inner = Arc::new(StoreInner::new(config));
        inner.load(&inner.config.path)?;
        Self::start(inner)
    }

    fn start(inner: Arc<StoreInner>) -> Result<Self> {
        let persistence = PersistenceHandle::new(inner.clone())?;
        Ok(Self { inner, persistence })
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.entries.read().get(key).cloned()
    }

    /// Insert or overwrite the value for `key`
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.entries.write().insert(key.into(), value.into());
    }

    /// Remove `key` if present
    pub fn delete(&self, key: &str) {
        self.inner.entries.write().remove(key);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// All keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    /// Copy of every entry, taken under one read lock
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.entries.read().clone()
    }

    /// Serialize the full map to `path`
    ///
    /// Does not count as a flush: the persistence schedule only tracks
    /// writes to the configured path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.save(path.as_ref())
    }

    /// Replace the map with the document at `path`
    ///
    /// A missing file is created as `{}` and leaves the map unchanged. On any
    /// error the map is left unchanged.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        self.inner.load(path.as_ref())
    }

    /// Synchronously flush to the configured path
    pub fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    /// Ask the persistence thread to flush without waiting for the timer
    pub fn request_flush(&self) {
        self.persistence.request_flush();
    }

    /// Stop the persistence thread and return the result of its final flush
    pub fn close(self) -> Result<()> {
        self.persistence.shutdown()
    }

    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    pub fn interval(&self) -> Duration {
        self.inner.config.interval
    }

    /// Wall-clock start time of the last successful flush, if any
    pub fn last_saved_at(&self) -> Option<SystemTime> {
        let last_saved = *self.inner.last_saved.lock();
        last_saved.map(|point| point.wall)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.config.path)
            .field("interval", &self.inner.config.interval)
            .field("entries", &self.len())
            .finish()
    }
}
