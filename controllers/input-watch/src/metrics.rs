//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `input_watch_reconciliations_total{result}` - Reconciles by result (success, error)
//! - `input_watch_reconciliation_duration_seconds` - Duration of reconcile operations
//! - `input_watch_queue_depth` - Keys waiting in the work queue
//! - every `input_watch_*` metric of the watch engine

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("input_watch_reconciliations_total", "Total number of reconciliations by result"),
        &["result"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "input_watch_reconciliation_duration_seconds",
            "Duration of reconciliation operations in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("input_watch_queue_depth", "Keys waiting in the work queue")
        .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

/// Register controller and watch engine metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    watch_engine::metrics::register_metrics(&REGISTRY)?;
    Ok(())
}

pub fn record_reconcile(success: bool, duration_secs: f64) {
    let result = if success { "success" } else { "error" };
    RECONCILIATIONS_TOTAL.with_label_values(&[result]).inc();
    RECONCILIATION_DURATION.observe(duration_secs);
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}
