//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (spans exported over OTLP)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → diagnostics listener /metrics (Prometheus scrape)
//!     → OTLP collector (e.g., Jaeger)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through request spans
//! - Tracing is best-effort: its failures are logged and counted, never fatal

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::tracing::{SpanSource, TelemetryError, TracingProvider};
