//! # Metrics
//!
//! Prometheus metrics for the watch engine.
//!
//! ## Metrics Exposed
//!
//! - `input_watch_events_total{outcome}` - Dispatcher outcomes (forwarded, filtered, no_filters, malformed, closed)
//! - `input_watch_stream_errors_total` - Transient errors reported by watch streams
//! - `input_watch_registered_streams` - Number of distinct watch streams registered
//! - `input_watch_duplicate_selectors_total` - Selectors that reused an existing stream
//! - `input_watch_caches_synced` - 1 once every registered stream reported its cache hydrated

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;

static EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("input_watch_events_total", "Watch notifications by dispatch outcome"),
        &["outcome"],
    )
    .expect("Failed to create EVENTS_TOTAL metric - this should never happen")
});

static STREAM_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "input_watch_stream_errors_total",
        "Transient errors reported by watch streams",
    )
    .expect("Failed to create STREAM_ERRORS_TOTAL metric - this should never happen")
});

static REGISTERED_STREAMS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "input_watch_registered_streams",
        "Number of distinct watch streams registered",
    )
    .expect("Failed to create REGISTERED_STREAMS metric - this should never happen")
});

static DUPLICATE_SELECTORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "input_watch_duplicate_selectors_total",
        "Selectors whose kind already had a registered watch stream",
    )
    .expect("Failed to create DUPLICATE_SELECTORS_TOTAL metric - this should never happen")
});

static CACHES_SYNCED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "input_watch_caches_synced",
        "1 once every registered watch stream reported its cache hydrated",
    )
    .expect("Failed to create CACHES_SYNCED metric - this should never happen")
});

/// Register the engine metrics with `registry`
pub fn register_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(EVENTS_TOTAL.clone()))?;
    registry.register(Box::new(STREAM_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(REGISTERED_STREAMS.clone()))?;
    registry.register(Box::new(DUPLICATE_SELECTORS_TOTAL.clone()))?;
    registry.register(Box::new(CACHES_SYNCED.clone()))?;
    Ok(())
}

pub(crate) fn record_event(outcome: &str) {
    EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub(crate) fn increment_stream_errors() {
    STREAM_ERRORS_TOTAL.inc();
}

pub(crate) fn set_registered_streams(count: usize) {
    REGISTERED_STREAMS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub(crate) fn increment_duplicate_selectors() {
    DUPLICATE_SELECTORS_TOTAL.inc();
}

pub(crate) fn set_caches_synced(synced: bool) {
    CACHES_SYNCED.set(i64::from(synced));
}
