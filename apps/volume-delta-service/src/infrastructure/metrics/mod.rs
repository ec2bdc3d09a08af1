//! Prometheus Metrics Module
//!
//! Exposes service metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Trades**: trades applied or dropped, by source and outcome
//! - **Flushes**: ticks executed, records produced, sink failures and tick latency
//! - **Store**: number of tracked buckets
//! - **Feeds**: WebSocket reconnection attempts
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::interval::Interval;
use crate::domain::market::Source;
use crate::domain::volume::ApplyOutcome;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if another global recorder was already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "volume_delta_trades_total",
        "Total trades received, by source and outcome"
    );

    describe_counter!(
        "volume_delta_flushes_total",
        "Total flush ticks executed per interval"
    );
    describe_counter!(
        "volume_delta_records_total",
        "Total delta records produced by flushes"
    );
    describe_counter!(
        "volume_delta_sink_failures_total",
        "Total delta records the sink failed to record"
    );

    describe_gauge!(
        "volume_delta_tracked_buckets",
        "Number of (source, symbol, interval) buckets in the store"
    );

    describe_counter!(
        "volume_delta_feed_reconnects_total",
        "Total exchange feed reconnection attempts"
    );

    describe_histogram!(
        "volume_delta_flush_duration_seconds",
        "Time to flush an interval and deliver its records"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a trade handed to the store.
pub fn record_trade(source: &Source, outcome: ApplyOutcome) {
    counter!(
        "volume_delta_trades_total",
        "source" => source.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a completed flush tick.
pub fn record_flush(interval: Interval, records: usize, failed: usize, duration: Duration) {
    counter!("volume_delta_flushes_total", "interval" => interval.as_str()).increment(1);
    counter!("volume_delta_records_total", "interval" => interval.as_str())
        .increment(records as u64);
    if failed > 0 {
        counter!("volume_delta_sink_failures_total", "interval" => interval.as_str())
            .increment(failed as u64);
    }
    histogram!(
        "volume_delta_flush_duration_seconds",
        "interval" => interval.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Update the tracked bucket count.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_buckets(count: usize) {
    gauge!("volume_delta_tracked_buckets").set(count as f64);
}

/// Record a feed reconnection attempt.
pub fn record_reconnect(source: &Source) {
    counter!(
        "volume_delta_feed_reconnects_total",
        "source" => source.to_string()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
