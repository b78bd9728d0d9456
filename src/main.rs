//! Movie catalogue service
//!
//! Serves the catalogue API, exports request spans to an OTLP collector and
//! shuts down gracefully on SIGINT/SIGTERM.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                 CATALOGUE SERVICE                 │
//!                     │                                                   │
//!   API clients ──────┼─▶ primary listener ──▶ middleware ──▶ API routes  │
//!                     │   (0.0.0.0:8081)          │                       │
//!                     │                           ▼ spans                 │
//!   operators ────────┼─▶ diagnostics listener  tracing provider ───────┼──▶ OTLP collector
//!                     │   (0.0.0.0:4000)                                  │
//!                     │                                                   │
//!   SIGINT/SIGTERM ───┼─▶ signal watcher ──▶ shutdown coordinator         │
//!                     │        (fan-in over listeners + signal)           │
//!                     └──────────────────────────────────────────────────┘
//! ```
//!
//! Exit status: 0 after a graceful shutdown, 1 when the primary listener
//! fails, 2 on a configuration error.

use std::process::ExitCode;

use clap::Parser;

use catalogue_service::config::Cli;
use catalogue_service::http::api;
use catalogue_service::lifecycle::{Bootstrap, DrainReport, Termination};
use catalogue_service::observability::{logging, metrics, TelemetryError, TracingProvider};

// Backs the heap statistics served on /debug/pprof/heap.
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    // Started before the subscriber so request spans can be bridged into it.
    let telemetry = TracingProvider::start(&config.tracing).await;
    let tracer = telemetry.as_ref().ok().map(TracingProvider::tracer);

    if let Err(e) = logging::init_logging(&config.observability, tracer) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(2);
    }
    if config.observability.metrics_enabled {
        metrics::init_metrics();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "catalogue-service starting");
    tracing::info!(
        primary = %config.primary.bind_address,
        service = %config.tracing.service_name,
        sampling_ratio = config.tracing.sampling_ratio,
        diagnostics = %config.diagnostics.bind_address,
        drain_timeout_ms = config.shutdown.drain_timeout_ms,
        database_host = %config.database.host,
        "Configuration loaded"
    );

    let mut bootstrap = Bootstrap::new(config).api(api::router());
    match telemetry {
        Ok(provider) => {
            tracing::info!(endpoint = provider.endpoint(), "Tracing exporter started");
            bootstrap = bootstrap.telemetry(provider);
        }
        Err(TelemetryError::Disabled) => tracing::info!("Tracing disabled"),
        Err(error) => {
            metrics::record_tracing_init_failure();
            tracing::error!(
                error = %error,
                severity = ?error.severity(),
                "Tracing unavailable; serving without span export"
            );
        }
    }

    let coordinator = match bootstrap.launch().await {
        Ok(coordinator) => coordinator,
        Err(error) => {
            tracing::error!(error = %error, severity = ?error.severity(), "Startup failed");
            return ExitCode::from(1);
        }
    };

    let outcome = coordinator.run().await;
    match &outcome.termination {
        Termination::Graceful {
            signal,
            drain: DrainReport::Completed { .. },
        } => tracing::info!(signal = %signal, "Shutdown complete"),
        Termination::Graceful {
            signal,
            drain: DrainReport::TimedOut { in_flight },
        } => tracing::warn!(signal = %signal, in_flight, "Shutdown complete with dropped requests"),
        Termination::Failed { error } => tracing::error!(error = %error, "Service terminated"),
    }

    ExitCode::from(outcome.exit_status())
}
