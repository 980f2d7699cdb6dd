//! Synchronized bridge source.
//!
//! Drains the dispatcher's event channel into the host work queue and exposes
//! the "caches synced" signal the host waits on before reconciling.

use crate::codec::{ObjectKey, ReconcileKey};
use crate::dispatcher::ChangeEvent;
use crate::error::WatchError;
use crate::sync::SyncedSignal;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Host work queue the source feeds.
///
/// Implementations deduplicate keys that are already queued; adding is
/// non-blocking.
pub trait WorkQueue: Send + Sync {
    /// Enqueue a reconcile request
    fn add(&self, key: ReconcileKey);
}

/// Source bridging the event channel into a [`WorkQueue`].
#[derive(Debug)]
pub struct SynchronizedSource {
    events: mpsc::Receiver<ChangeEvent>,
    synced: SyncedSignal,
}

impl SynchronizedSource {
    /// Create a source reading `events`, gated by `synced`
    pub fn new(events: mpsc::Receiver<ChangeEvent>, synced: SyncedSignal) -> Self {
        Self { events, synced }
    }

    /// Handle on the sync signal, for readiness probes and workers
    pub fn synced(&self) -> SyncedSignal {
        self.synced.clone()
    }

    /// Block until the initial backfill of every registered stream is done.
    ///
    /// Returns an error if `cancel` fires first or startup failed.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) -> Result<(), WatchError> {
        self.synced.wait(cancel).await
    }

    /// Forward every received event to `queue` in FIFO order.
    ///
    /// Runs until `cancel` fires or every sender is gone. Must be started
    /// before waiting for sync: the backfill blocks on a full channel until
    /// this loop drains it.
    pub async fn start(mut self, queue: Arc<dyn WorkQueue>, cancel: CancellationToken) -> Result<(), WatchError> {
        info!("Starting synchronized source");
        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Synchronized source cancelled");
                    return Ok(());
                }
                event = self.events.recv() => event,
            };
            let Some(event) = event else {
                info!("Event channel closed, stopping synchronized source");
                return Ok(());
            };

            match ObjectKey::from_reference(&event.reference) {
                Some(key) => {
                    debug!("Queueing {} for owner {}", key, event.owner);
                    queue.add(key.encode());
                }
                None => {
                    error!(
                        "Dropping change to {} for owner {}: object kind is unknown",
                        event.reference.namespaced_name(),
                        event.owner
                    );
                }
            }
        }
    }
}
