//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ticks**: ticks stored and messages discarded, per symbol
//! - **Connections**: feed connections by lifecycle state
//! - **Storage**: failed writes and append latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! before [`init_metrics`] is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once and return its handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
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
        "pairs_ticks_received_total",
        "Ticks decoded from the feed and handed to the store"
    );
    describe_counter!(
        "pairs_messages_discarded_total",
        "Feed messages that did not decode into a valid tick"
    );
    describe_counter!(
        "pairs_storage_failures_total",
        "Tick appends that failed"
    );
    describe_counter!(
        "pairs_reconnects_total",
        "Feed reconnection attempts"
    );

    describe_gauge!(
        "pairs_connections",
        "Feed connections in each active lifecycle state"
    );

    describe_histogram!(
        "pairs_append_seconds",
        "Time to append one tick to the store"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a tick stored for `symbol`.
pub fn record_tick(symbol: &str) {
    counter!("pairs_ticks_received_total", "symbol" => symbol.to_string()).increment(1);
}

/// Record a discarded feed message for `symbol`.
pub fn record_discard(symbol: &str) {
    counter!("pairs_messages_discarded_total", "symbol" => symbol.to_string()).increment(1);
}

/// Record a failed append for `symbol`.
pub fn record_storage_failure(symbol: &str) {
    counter!("pairs_storage_failures_total", "symbol" => symbol.to_string()).increment(1);
}

/// Record a reconnection attempt for `symbol`.
pub fn record_reconnect(symbol: &str) {
    counter!("pairs_reconnects_total", "symbol" => symbol.to_string()).increment(1);
}

/// Move one connection from `from` to `to` in the state gauge.
///
/// Only active states are counted.
pub fn record_transition(from: ConnectionState, to: ConnectionState) {
    if from.as_str() == to.as_str() {
        return;
    }
    if from.is_active() {
        gauge!("pairs_connections", "state" => from.as_str()).decrement(1.0);
    }
    if to.is_active() {
        gauge!("pairs_connections", "state" => to.as_str()).increment(1.0);
    }
}

/// Record how long one append took.
pub fn record_append_duration(duration: Duration) {
    histogram!("pairs_append_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
