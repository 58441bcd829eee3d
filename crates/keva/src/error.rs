//! Store error types

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by `save`, `load` and the store lifecycle
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid document {}: expected a top-level object, found {found}", .path.display())]
    NotAnObject { path: PathBuf, found: &'static str },

    #[error("Failed to encode store contents: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to start persistence thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Persistence thread shutdown failed: {0}")]
    Shutdown(String),
}

impl StoreError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn decode(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns true if the file exists but does not hold a valid document
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::NotAnObject { .. })
    }

    /// Returns true if the failure came from the file system
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}
