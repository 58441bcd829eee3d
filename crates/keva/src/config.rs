//! Store configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Shortest interval the persistence thread will wait between checks
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file path (default: ./keva.json)
    pub path: PathBuf,

    /// Period between persistence checks (default: 5 seconds)
    pub interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./keva.json"),
            interval: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Create a config persisting to `path` with the default interval
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the persistence interval (clamped to at least 1ms)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the persistence interval in milliseconds
    pub fn with_interval_ms(self, ms: u64) -> Self {
        self.with_interval(Duration::from_millis(ms))
    }
}
