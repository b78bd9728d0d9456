//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, status
//! - `http_request_duration_seconds` (histogram): latency distribution
//! - `http_requests_in_flight` (gauge): requests currently being served
//! - `tracing_init_failures_total` (counter): exporter pipeline failed to start
//! - `lifecycle_drain_timeouts_total` (counter): drains that overran their deadline
//!
//! # Design Decisions
//! - Recorder installed once per process; later calls reuse the handle
//! - Rendered on the diagnostics listener, never on the API port

use std::sync::OnceLock;
use std::time::Instant;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder, or return the one already installed.
///
/// Returns `None` when another recorder owns the global slot.
pub fn init_metrics() -> Option<PrometheusHandle> {
    RECORDER
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        })
        .clone()
}

/// Record a completed HTTP request.
pub fn record_request(method: &str, status: u16, start_time: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels)
        .record(start_time.elapsed().as_secs_f64());
}

pub fn record_in_flight(count: u64) {
    metrics::gauge!("http_requests_in_flight").set(count as f64);
}

pub fn record_tracing_init_failure() {
    metrics::counter!("tracing_init_failures_total").increment(1);
}

pub fn record_drain_timeout() {
    metrics::counter!("lifecycle_drain_timeouts_total").increment(1);
}
