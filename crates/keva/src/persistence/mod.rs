//! Persistence layer for the KV store
//!
//! The whole map is written as a single JSON object on every flush.
//!
//! ## Architecture
//!
//! - **Snapshot**: JSON encode/decode of the full map plus atomic file replacement
//! - **Handle**: background thread that flushes on a fixed interval and on demand
//!
//! ## Durability Guarantee
//!
//! Writes are acknowledged as soon as they land in memory. A crash loses at most
//! the mutations made since the last successful flush, and never leaves a
//! half-written snapshot behind.

pub mod handle;
pub mod snapshot;

pub use handle::PersistenceHandle;
