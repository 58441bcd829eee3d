//! In-process key-value store with periodic JSON snapshots
//!
//! # Features
//! - Concurrent reads, serialized writes behind a single reader/writer lock
//! - Schemaless values (`Value`) that map one-to-one onto JSON
//! - Background persistence thread that flushes the whole map on a fixed interval
//! - Atomic snapshot files (write to a temp file, fsync, rename)
//!
//! # Example
//! ```no_run
//! use keva::{Store, Value};
//! use std::time::Duration;
//!
//! let store = Store::new("./keva.json", Duration::from_secs(5))?;
//! store.load("./keva.json")?;
//! store.set("count", 5);
//! assert_eq!(store.get("count"), Some(Value::Int(5)));
//! store.close()?;
//! # Ok::<(), keva::StoreError>(())
//! ```

pub mod config;
pub mod error;
pub mod persistence;
pub mod store;
pub mod types;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::Store;
pub use types::Value;
