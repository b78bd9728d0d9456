//! Distributed tracing support.
//!
//! # Responsibilities
//! - Build the OTLP/HTTP batch exporter pipeline
//! - Hand out the tracer explicitly (no OpenTelemetry global)
//! - Flush and close the pipeline within a deadline on shutdown
//!
//! # Design Decisions
//! - At most one active provider per process, checked at start
//! - Failures here degrade observability but never stop request serving
//! - The close runs on a blocking worker; a missed deadline leaves it running
//!   to completion in the background instead of dropping the exporter mid-flush

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime;
use opentelemetry_sdk::trace::{Sampler, Tracer, TracerProvider as SdkTracerProvider};
use opentelemetry_sdk::Resource;
use tokio::net::TcpStream;
use tokio::time::Instant;
use url::Url;

use crate::config::TracingConfig;
use crate::lifecycle::coordinator::Teardown;
use crate::lifecycle::error::Severity;

static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Errors that can occur while starting or stopping the exporter pipeline.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("tracing is disabled")]
    Disabled,

    #[error("invalid collector endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("collector {endpoint} is unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build span exporter: {0}")]
    Exporter(String),

    #[error("a tracing provider is already active in this process")]
    AlreadyActive,

    #[error("span flush did not finish before the shutdown deadline")]
    ShutdownTimeout,

    #[error("tracing shutdown failed: {0}")]
    Shutdown(String),
}

impl TelemetryError {
    /// Tracing never takes the service down.
    pub fn severity(&self) -> Severity {
        Severity::Degraded
    }
}

/// Span source handed to request handlers through request extensions.
///
/// Empty when the exporter pipeline is not running.
#[derive(Debug, Clone, Default)]
pub struct SpanSource {
    tracer: Option<Tracer>,
}

impl SpanSource {
    pub fn tracer(&self) -> Option<&Tracer> {
        self.tracer.as_ref()
    }

    pub fn is_exporting(&self) -> bool {
        self.tracer.is_some()
    }
}

/// Owner of the span exporter pipeline.
#[derive(Debug)]
pub struct TracingProvider {
    provider: SdkTracerProvider,
    tracer: Tracer,
    endpoint: String,
}

impl TracingProvider {
    /// Start the batch exporter described by `config`.
    pub async fn start(config: &TracingConfig) -> Result<Self, TelemetryError> {
        if !config.enabled {
            return Err(TelemetryError::Disabled);
        }

        let endpoint = parse_endpoint(&config.collector_endpoint)?;
        if config.check_collector {
            check_reachable(&endpoint, Duration::from_millis(config.connect_timeout_ms)).await?;
        }

        if ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TelemetryError::AlreadyActive);
        }

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint.as_str())
            .with_timeout(Duration::from_secs(config.export_timeout_secs))
            .build()
            .map_err(|e| {
                ACTIVE.store(false, Ordering::SeqCst);
                TelemetryError::Exporter(e.to_string())
            })?;

        let provider = SdkTracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                config.sampling_ratio,
            ))))
            .with_resource(Resource::new(vec![
                KeyValue::new("service.name", config.service_name.clone()),
                KeyValue::new("environment", config.environment.clone()),
                KeyValue::new("ID", config.instance_id),
            ]))
            .build();
        let tracer = provider.tracer(config.service_name.clone());

        Ok(Self {
            provider,
            tracer,
            endpoint: endpoint.to_string(),
        })
    }

    /// Tracer for the `tracing-opentelemetry` layer.
    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }

    pub fn span_source(&self) -> SpanSource {
        SpanSource {
            tracer: Some(self.tracer.clone()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Flush buffered spans and close the exporter, bounded by `deadline`.
    pub async fn shutdown(self, deadline: Instant) -> Result<(), TelemetryError> {
        let provider = self.provider;
        let close = tokio::task::spawn_blocking(move || {
            let result = provider
                .shutdown()
                .map_err(|e| TelemetryError::Shutdown(e.to_string()));
            ACTIVE.store(false, Ordering::SeqCst);
            result
        });

        match tokio::time::timeout_at(deadline, close).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                ACTIVE.store(false, Ordering::SeqCst);
                Err(TelemetryError::Shutdown(join.to_string()))
            }
            Err(_) => Err(TelemetryError::ShutdownTimeout),
        }
    }
}

impl Teardown for TracingProvider {
    fn teardown(self: Box<Self>, deadline: Instant) -> BoxFuture<'static, Result<(), TelemetryError>> {
        Box::pin((*self).shutdown(deadline))
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, TelemetryError> {
    let invalid = |reason: String| TelemetryError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// OTLP/HTTP exporters connect lazily, so check reachability up front.
async fn check_reachable(endpoint: &Url, timeout: Duration) -> Result<(), TelemetryError> {
    let unreachable = |source| TelemetryError::Unreachable {
        endpoint: endpoint.to_string(),
        source,
    };
    let host = endpoint.host_str().unwrap_or_default();
    let port = endpoint.port_or_known_default().unwrap_or(80);

    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(unreachable(e)),
        Err(_) => Err(unreachable(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no connection within {}ms", timeout.as_millis()),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> TracingConfig {
        TracingConfig {
            collector_endpoint: endpoint.to_string(),
            connect_timeout_ms: 200,
            ..TracingConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_config_starts_nothing() {
        let config = TracingConfig {
            enabled: false,
            ..TracingConfig::default()
        };
        assert!(matches!(
            TracingProvider::start(&config).await,
            Err(TelemetryError::Disabled)
        ));
    }

    #[tokio::test]
    async fn rejects_non_http_endpoint() {
        let err = TracingProvider::start(&config("grpc://collector:4317"))
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidEndpoint { .. }));
        assert_eq!(err.severity(), Severity::Degraded);
    }

    #[tokio::test]
    async fn unreachable_collector_is_reported() {
        // Nothing listens on port 1.
        let err = TracingProvider::start(&config("http://127.0.0.1:1/v1/traces"))
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Unreachable { .. }));
    }

    #[test]
    fn empty_span_source_does_not_export() {
        assert!(!SpanSource::default().is_exporting());
    }
}
