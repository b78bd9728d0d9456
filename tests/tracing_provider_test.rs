//! Span export against a stand-in OTLP/HTTP collector.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use catalogue_service::config::TracingConfig;
use catalogue_service::observability::{TelemetryError, TracingProvider};
use opentelemetry::trace::{Span as _, Tracer as _};
use serial_test::serial;
use tokio::net::TcpListener;
use tokio::time::Instant;

/// Counts export requests and the bytes they carried.
#[derive(Clone, Default)]
struct Collector {
    exports: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
    /// Time taken before answering each export.
    delay: Duration,
}

async fn accept_traces(State(collector): State<Collector>, body: Bytes) -> StatusCode {
    tokio::time::sleep(collector.delay).await;
    collector.exports.fetch_add(1, Ordering::SeqCst);
    collector.bytes.fetch_add(body.len(), Ordering::SeqCst);
    StatusCode::OK
}

async fn spawn_collector() -> (SocketAddr, Collector) {
    spawn_collector_with_delay(Duration::ZERO).await
}

async fn spawn_collector_with_delay(delay: Duration) -> (SocketAddr, Collector) {
    let collector = Collector {
        delay,
        ..Collector::default()
    };
    let app = Router::new()
        .route("/v1/traces", post(accept_traces))
        .with_state(collector.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, collector)
}

fn config_for(addr: SocketAddr) -> TracingConfig {
    TracingConfig {
        collector_endpoint: format!("http://{addr}/v1/traces"),
        service_name: "catalogue-test".into(),
        export_timeout_secs: 2,
        ..TracingConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn shutdown_flushes_buffered_spans() {
    let (addr, collector) = spawn_collector().await;
    let provider = TracingProvider::start(&config_for(addr)).await.unwrap();
    assert_eq!(provider.endpoint(), format!("http://{addr}/v1/traces"));

    let tracer = provider.tracer();
    let mut span = tracer.start("catalogue.lookup");
    span.set_attribute(opentelemetry::KeyValue::new("movie.id", 42));
    span.end();

    // The batch interval is seconds long; only the shutdown flush sends it.
    provider
        .shutdown(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    assert!(collector.exports.load(Ordering::SeqCst) >= 1);
    assert!(collector.bytes.load(Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn only_one_provider_at_a_time() {
    let (addr, _collector) = spawn_collector().await;
    let config = config_for(addr);

    let first = TracingProvider::start(&config).await.unwrap();
    assert!(matches!(
        TracingProvider::start(&config).await,
        Err(TelemetryError::AlreadyActive)
    ));

    first
        .shutdown(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();

    let second = TracingProvider::start(&config).await.unwrap();
    second
        .shutdown(Instant::now() + Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn service_keeps_serving_without_a_collector() {
    let mut config = TracingConfig::default();
    config.collector_endpoint = "http://127.0.0.1:1/v1/traces".into();
    config.connect_timeout_ms = 200;

    let error = TracingProvider::start(&config).await.unwrap_err();
    assert!(matches!(error, TelemetryError::Unreachable { .. }));

    // Startup carries on with no provider, as the binary does.
    let mut service = catalogue_service::ServiceConfig::default();
    service.primary.bind_address = "127.0.0.1:0".into();
    service.diagnostics.enabled = false;
    service.tracing = config;

    let (signal_tx, signal_rx) = tokio::sync::mpsc::channel(1);
    let coordinator = catalogue_service::Bootstrap::new(service)
        .api(catalogue_service::http::api::router())
        .signals(catalogue_service::lifecycle::SignalSource::Channel(signal_rx))
        .launch()
        .await
        .unwrap();
    let primary = coordinator.primary_addr();
    let running = tokio::spawn(coordinator.run());

    let version: serde_json::Value = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("http://{primary}/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["tracing_exporting"], false);

    signal_tx
        .send(catalogue_service::lifecycle::ShutdownSignal::Terminate)
        .await
        .unwrap();
    let outcome = running.await.unwrap();
    assert_eq!(outcome.exit_status(), 0);
    assert!(outcome.telemetry.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn slow_collector_misses_the_deadline_and_closes_in_background() {
    let (addr, _collector) = spawn_collector_with_delay(Duration::from_secs(5)).await;
    let config = config_for(addr);
    let provider = TracingProvider::start(&config).await.unwrap();

    let mut span = provider.tracer().start("catalogue.search");
    span.end();

    let started = Instant::now();
    let result = provider
        .shutdown(Instant::now() + Duration::from_millis(300))
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(TelemetryError::ShutdownTimeout)));
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(1_500), "took {elapsed:?}");

    // The close is still flushing, so the slot stays taken.
    assert!(matches!(
        TracingProvider::start(&config).await,
        Err(TelemetryError::AlreadyActive)
    ));

    // Released once the background close gives up on the export.
    let restarted = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            match TracingProvider::start(&config).await {
                Ok(provider) => return provider,
                Err(TelemetryError::AlreadyActive) => {
                    tokio::time::sleep(Duration::from_millis(100)).await
                }
                Err(other) => panic!("unexpected start error: {other}"),
            }
        }
    })
    .await
    .expect("provider slot never released");
    restarted
        .shutdown(Instant::now() + Duration::from_secs(10))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn request_spans_are_exported_when_service_stops() {
    let (addr, collector) = spawn_collector().await;
    let provider = TracingProvider::start(&config_for(addr)).await.unwrap();

    let mut service = catalogue_service::ServiceConfig::default();
    service.primary.bind_address = "127.0.0.1:0".into();
    service.diagnostics.enabled = false;

    let (signal_tx, signal_rx) = tokio::sync::mpsc::channel(1);
    let coordinator = catalogue_service::Bootstrap::new(service)
        .api(catalogue_service::http::api::router())
        .telemetry(provider)
        .signals(catalogue_service::lifecycle::SignalSource::Channel(signal_rx))
        .launch()
        .await
        .unwrap();
    let primary = coordinator.primary_addr();
    let running = tokio::spawn(coordinator.run());

    let version: serde_json::Value = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("http://{primary}/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["tracing_exporting"], true);

    signal_tx
        .send(catalogue_service::lifecycle::ShutdownSignal::Terminate)
        .await
        .unwrap();
    let outcome = running.await.unwrap();
    assert!(matches!(outcome.telemetry, Some(Ok(()))));
    assert!(collector.exports.load(Ordering::SeqCst) >= 1);
}
