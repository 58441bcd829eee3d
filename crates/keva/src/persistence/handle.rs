//! Persistence handle for background snapshot flushing
//!
//! A dedicated thread waits on a command channel with the configured interval
//! as timeout. Every timeout is a check: if the last successful flush is at
//! least one interval old (or there never was one) the map is flushed. A
//! failed flush is logged and retried on the next check. On shutdown the
//! thread performs one final flush and hands its result back to the caller.

use crate::error::{Result, StoreError};
use crate::store::StoreInner;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Pending flush requests beyond this are redundant and dropped
const COMMAND_BUFFER: usize = 16;

/// Command sent to persistence thread
enum PersistenceCommand {
    /// Flush now instead of waiting for the timer
    Flush,

    /// Final flush, then exit
    Shutdown,
}

/// Handle to background persistence thread
pub struct PersistenceHandle {
    sender: Sender<PersistenceCommand>,

    /// Yields the result of the final flush
    thread_handle: Option<JoinHandle<Result<()>>>,
}

impl PersistenceHandle {
    /// Spawn the persistence thread for `store`
    pub(crate) fn new(store: Arc<StoreInner>) -> Result<Self> {
        info!(
            "Starting persistence thread for {} (interval {:?})",
            store.config().path.display(),
            store.config().interval
        );

        let (sender, receiver) = bounded::<PersistenceCommand>(COMMAND_BUFFER);

        let thread_handle = thread::Builder::new()
            .name("keva-persistence".to_string())
            .spawn(move || Self::persistence_thread(store, receiver))
            .map_err(StoreError::Spawn)?;

        Ok(Self {
            sender,
            thread_handle: Some(thread_handle),
        })
    }

    /// Request an immediate flush (non-blocking)
    pub fn request_flush(&self) {
        // A full channel already holds pending flushes
        if let Err(e) = self.sender.try_send(PersistenceCommand::Flush) {
            debug!("Flush request not queued: {}", e);
        }
    }

    /// Background persistence thread
    fn persistence_thread(
        store: Arc<StoreInner>,
        receiver: Receiver<PersistenceCommand>,
    ) -> Result<()> {
        let interval = store.config().interval;

        info!("Persistence thread started");

        loop {
            match receiver.recv_timeout(interval) {
                Ok(PersistenceCommand::Flush) => {
                    debug!("Flush requested");
                    Self::flush_logged(&store);
                }

                Ok(PersistenceCommand::Shutdown) => {
                    info!("Shutdown signal received");
                    break;
                }

                Err(RecvTimeoutError::Timeout) => {
                    if store.flush_due() {
                        Self::flush_logged(&store);
                    }
                }

                Err(RecvTimeoutError::Disconnected) => {
                    info!("Channel disconnected, shutting down");
                    break;
                }
            }
        }

        info!("Performing final flush before shutdown");
        let result = store.flush();
        if let Err(e) = &result {
            error!("Failed final flush: {}", e);
        }

        info!("Persistence thread stopped");
        result
    }

    fn flush_logged(store: &StoreInner) {
        if let Err(e) = store.flush() {
            error!("Failed to flush {}: {}", store.config().path.display(), e);
        }
    }

    fn shutdown_internal(&mut self) -> Result<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        // Only fails if the thread is already gone; join reports why
        let _ = self.sender.send(PersistenceCommand::Shutdown);

        handle
            .join()
            .map_err(|e| StoreError::Shutdown(format!("persistence thread panicked: {:?}", e)))?
    }

    /// Stop the thread, returning the result of its final flush
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_internal()
    }
}

impl Drop for PersistenceHandle {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            warn!("Store dropped without close, shutting down persistence thread");
            if let Err(e) = self.shutdown_internal() {
                error!("Persistence shutdown failed: {}", e);
            }
        }
    }
}
