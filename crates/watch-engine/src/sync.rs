//! One-shot "caches synced" signal.
//!
//! The gate side is consumed by its transition, so the signal can move from
//! `Pending` at most once; a second close is unrepresentable. Dropping an
//! unresolved gate (e.g. the initializer failed) moves the signal to
//! `Cancelled` so waiters never hang.

use crate::error::WatchError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// State of the sync signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Initial backfill still running
    Pending,
    /// Every registered watch stream reported its cache hydrated
    Synced,
    /// Startup failed or was cancelled before the caches synced
    Cancelled,
}

/// Create a connected gate/signal pair in the `Pending` state.
pub fn sync_channel() -> (SyncGate, SyncedSignal) {
    let (tx, rx) = watch::channel(SyncState::Pending);
    (SyncGate { tx }, SyncedSignal { rx })
}

/// Write side of the sync signal, owned by the initializer.
#[derive(Debug)]
pub struct SyncGate {
    tx: watch::Sender<SyncState>,
}

impl SyncGate {
    /// Transition `Pending -> Synced`
    pub fn mark_synced(self) {
        self.resolve(SyncState::Synced);
    }

    /// Transition `Pending -> Cancelled`
    pub fn cancel(self) {
        self.resolve(SyncState::Cancelled);
    }

    fn resolve(&self, state: SyncState) {
        self.tx.send_if_modified(|current| {
            if *current == SyncState::Pending {
                *current = state;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for SyncGate {
    fn drop(&mut self) {
        self.resolve(SyncState::Cancelled);
    }
}

/// Read side of the sync signal.
#[derive(Debug, Clone)]
pub struct SyncedSignal {
    rx: watch::Receiver<SyncState>,
}

impl SyncedSignal {
    /// Current state
    pub fn state(&self) -> SyncState {
        *self.rx.borrow()
    }

    /// Whether the caches have synced
    pub fn is_synced(&self) -> bool {
        self.state() == SyncState::Synced
    }

    /// Wait until the caches sync or `cancel` fires.
    ///
    /// Returns `Cancelled` if the token fires first and `SyncAborted` if the
    /// gate was cancelled or dropped; never `Ok` before the gate marked the
    /// caches synced.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), WatchError> {
        let mut rx = self.rx.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(WatchError::Cancelled),
            state = rx.wait_for(|s| *s != SyncState::Pending) => {
                match state.map(|s| *s) {
                    Ok(SyncState::Synced) => Ok(()),
                    Ok(_) | Err(_) => Err(WatchError::SyncAborted),
                }
            }
        }
    }
}
