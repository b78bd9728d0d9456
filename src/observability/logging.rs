//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Select pretty or JSON output
//! - Bridge spans into the OpenTelemetry pipeline when one is running
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level
//! - The OpenTelemetry tracer is passed in, never fetched from a global

use opentelemetry_sdk::trace::Tracer;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Install the process-wide subscriber.
///
/// `tracer` comes from a running [`TracingProvider`](super::tracing::TracingProvider);
/// pass `None` to log without exporting spans.
pub fn init_logging(config: &ObservabilityConfig, tracer: Option<Tracer>) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json, pretty) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
    };

    let telemetry = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(telemetry)
        .try_init()
}
