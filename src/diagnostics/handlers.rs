use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::net::InFlightTracker;

/// Shared state for the introspection endpoints.
#[derive(Clone)]
pub struct DiagnosticsState {
    pub started_at: Instant,
    pub tracker: InFlightTracker,
    pub config: Arc<serde_json::Value>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct RuntimeStatus {
    pub workers: usize,
    pub alive_tasks: usize,
    pub in_flight_requests: u64,
    pub uptime_secs: u64,
}

pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn get_build() -> Json<BuildInfo> {
    Json(BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_runtime(State(state): State<DiagnosticsState>) -> Json<RuntimeStatus> {
    let runtime = tokio::runtime::Handle::current().metrics();
    Json(RuntimeStatus {
        workers: runtime.num_workers(),
        alive_tasks: runtime.num_alive_tasks(),
        in_flight_requests: state.tracker.active_count(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_config(State(state): State<DiagnosticsState>) -> Json<serde_json::Value> {
    Json(state.config.as_ref().clone())
}

pub async fn get_metrics(State(state): State<DiagnosticsState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}
