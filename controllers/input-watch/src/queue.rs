//! Deduplicating work queue.
//!
//! A key is queued at most once. A key added while it is being reconciled is
//! held back and queued again when that reconcile finishes, so one key never
//! has two reconciles in flight.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;
use watch_engine::{ReconcileKey, WorkQueue};

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<ReconcileKey>,
    dirty: HashSet<ReconcileKey>,
    processing: HashSet<ReconcileKey>,
    shutting_down: bool,
}

/// FIFO work queue with per-key deduplication
#[derive(Debug, Default)]
pub struct DedupQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DedupQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `key` unless it is already waiting
    pub fn push(&self, key: ReconcileKey) {
        let mut state = self.lock();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            debug!("{} is in flight, deferring", key);
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Queue `key` after `delay`
    pub fn add_after(self: &Arc<Self>, key: ReconcileKey, delay: Duration) {
        if delay.is_zero() {
            self.push(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.push(key);
        });
    }

    /// Wait for the next key; `None` once the queue is shut down and drained.
    ///
    /// The key stays in flight until [`DedupQueue::done`] is called.
    pub async fn next(&self) -> Option<ReconcileKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark the reconcile of `key` finished
    pub fn done(&self, key: &ReconcileKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting keys and wake every waiter
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Keys waiting to be reconciled
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no key is waiting
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WorkQueue for DedupQueue {
    fn add(&self, key: ReconcileKey) {
        self.push(key);
    }
}
