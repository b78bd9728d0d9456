//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use axum::{routing::get, Router};
use catalogue_service::config::ServiceConfig;
use catalogue_service::lifecycle::{Phase, Teardown};
use catalogue_service::net::InFlightTracker;
use catalogue_service::observability::TelemetryError;
use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;

/// Config bound to ephemeral loopback ports with tracing off.
pub fn test_config(drain_timeout_ms: u64) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.primary.bind_address = "127.0.0.1:0".into();
    config.diagnostics.bind_address = "127.0.0.1:0".into();
    config.tracing.enabled = false;
    config.observability.metrics_enabled = false;
    config.shutdown.drain_timeout_ms = drain_timeout_ms;
    config.shutdown.flush_reserve_ms = 200;
    config
}

/// API with `/slow` that takes `delay` and `/stuck` that never answers.
pub fn slow_api(delay: Duration) -> Router {
    Router::new()
        .route(
            "/slow",
            get(move || async move {
                tokio::time::sleep(delay).await;
                "done"
            }),
        )
        .route("/stuck", get(|| std::future::pending::<&'static str>()))
        .merge(catalogue_service::http::api::router())
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Wait until the coordinator reports `phase`.
pub async fn wait_for_phase(phases: &mut watch::Receiver<Phase>, phase: Phase) {
    tokio::time::timeout(Duration::from_secs(5), phases.wait_for(|p| *p == phase))
        .await
        .expect("phase not reached in time")
        .expect("coordinator dropped");
}

/// Wait until exactly `count` requests are being served.
pub async fn wait_for_in_flight(tracker: &InFlightTracker, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while tracker.active_count() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("requests never reached the handler");
}

pub async fn accepts_connections(addr: SocketAddr) -> bool {
    TcpStream::connect(addr).await.is_ok()
}

/// What the recording teardown observed when it ran.
#[derive(Debug, Clone)]
pub struct TeardownRecord {
    pub at: Instant,
    pub primary_accepting: Option<bool>,
}

/// Teardown stand-in that records when it ran and whether the primary
/// listener was still accepting at that moment.
#[derive(Clone, Default)]
pub struct RecordingTeardown {
    pub primary: Arc<OnceLock<SocketAddr>>,
    pub records: Arc<Mutex<Vec<TeardownRecord>>>,
}

impl RecordingTeardown {
    pub fn records(&self) -> Vec<TeardownRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Teardown for RecordingTeardown {
    fn teardown(self: Box<Self>, _deadline: Instant) -> BoxFuture<'static, Result<(), TelemetryError>> {
        Box::pin(async move {
            let at = Instant::now();
            let primary_accepting = match self.primary.get() {
                Some(addr) => Some(accepts_connections(*addr).await),
                None => None,
            };
            self.records.lock().unwrap().push(TeardownRecord {
                at,
                primary_accepting,
            });
            Ok(())
        })
    }
}
