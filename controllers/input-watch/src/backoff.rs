//! # Fibonacci Backoff
//!
//! Retry delays for failed reconciles. The delay grows along the Fibonacci
//! sequence (min, min, 2*min, 3*min, 5*min, ...) and is capped at max, so a
//! key that keeps failing backs off more slowly than with exponential growth.
//!
//! Failures are tracked per work-queue key; a successful reconcile resets
//! that key.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use watch_engine::ReconcileKey;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a backoff bounded by `min` and `max` (whole seconds, at least 1)
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Delay after `error_count` consecutive failures (1-based; 0 counts as 1)
    ///
    /// Sequence for min=1s, max=60s: 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 34s,
    /// 55s, 60s (max).
    #[must_use]
    pub fn delay_for(&self, error_count: u32) -> Duration {
        let mut prev = 0u64;
        let mut current = self.min_secs;
        for _ in 1..error_count.max(1) {
            let next = prev.saturating_add(current);
            prev = current;
            current = next.min(self.max_secs);
            if current >= self.max_secs {
                break;
            }
        }
        Duration::from_secs(current)
    }
}

/// Per-key failure counts driving [`FibonacciBackoff`]
#[derive(Debug)]
pub struct KeyBackoff {
    backoff: FibonacciBackoff,
    failures: Mutex<HashMap<ReconcileKey, u32>>,
}

impl KeyBackoff {
    /// Track failures with `backoff`
    pub fn new(backoff: FibonacciBackoff) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure for `key` and return the delay before its retry
    pub fn next_delay(&self, key: &ReconcileKey) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.clone()).or_insert(0);
        *count = count.saturating_add(1);
        self.backoff.delay_for(*count)
    }

    /// Forget the failures of `key`
    pub fn reset(&self, key: &ReconcileKey) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Consecutive failures recorded for `key`
    pub fn failures(&self, key: &ReconcileKey) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}
