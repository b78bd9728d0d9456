//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the catalogue service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Primary API listener.
    pub primary: ListenerConfig,

    /// Diagnostics listener (runtime introspection).
    pub diagnostics: DiagnosticsConfig,

    /// Distributed tracing exporter.
    pub tracing: TracingConfig,

    /// Graceful shutdown budget.
    pub shutdown: ShutdownConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Connection parameters handed to the persistence layer.
    pub database: DatabaseConfig,
}

impl ServiceConfig {
    /// Copy of the configuration that is safe to expose on the diagnostics port.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.database.password.is_empty() {
            config.database.password = "<redacted>".to_string();
        }
        config
    }
}

/// Primary listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    pub bind_address: String,

    /// Maximum requests processed concurrently (backpressure).
    pub max_connections: usize,

    /// Per-request timeout in seconds. Independent of the drain budget.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8081".to_string(),
            max_connections: 10_000,
            request_timeout_secs: 30,
        }
    }
}

/// Diagnostics listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Start the diagnostics listener at all.
    pub enabled: bool,

    /// Bind address for introspection endpoints.
    pub bind_address: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:4000".to_string(),
        }
    }
}

/// Tracing exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Enable span export.
    pub enabled: bool,

    /// `service.name` resource attribute.
    pub service_name: String,

    /// `environment` resource attribute.
    pub environment: String,

    /// Numeric instance identifier (`ID` resource attribute).
    pub instance_id: i64,

    /// OTLP/HTTP collector endpoint, including the `/v1/traces` path.
    pub collector_endpoint: String,

    /// Fraction of root traces to sample (0.0 ..= 1.0).
    pub sampling_ratio: f64,

    /// Check that the collector accepts TCP connections before starting.
    pub check_collector: bool,

    /// Budget for the startup connect check in milliseconds.
    pub connect_timeout_ms: u64,

    /// Timeout for a single export request in seconds.
    pub export_timeout_secs: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "trace-sales-api".to_string(),
            environment: "production".to_string(),
            instance_id: 1,
            collector_endpoint: "http://localhost:4318/v1/traces".to_string(),
            sampling_ratio: 1.0,
            check_collector: true,
            connect_timeout_ms: 500,
            export_timeout_secs: 10,
        }
    }
}

/// Shutdown budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight requests after a shutdown signal.
    pub drain_timeout_ms: u64,

    /// Minimum time left for the span flush once draining has finished.
    pub flush_reserve_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 10_000,
            flush_reserve_ms: 1_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, multi-line.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Install the Prometheus recorder and serve `/metrics` on the diagnostics port.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "catalogue_service=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
        }
    }
}

/// Persistence connection parameters.
///
/// Only carried through for the persistence layer; nothing in the lifecycle
/// core opens a database connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl DatabaseConfig {
    /// Key/value connection string in libpq format.
    pub fn dsn(&self) -> String {
        format!(
            "host={} user={} password={} dbname={} port={}",
            self.host, self.user, self.password, self.name, self.port
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "app".to_string(),
            password: String::new(),
            name: "movie".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = ServiceConfig::default();
        assert_eq!(config.primary.bind_address, "0.0.0.0:8081");
        assert_eq!(config.diagnostics.bind_address, "0.0.0.0:4000");
        assert_eq!(config.tracing.service_name, "trace-sales-api");
        assert_eq!(config.tracing.instance_id, 1);
    }

    #[test]
    fn dsn_includes_every_parameter() {
        let db = DatabaseConfig {
            password: "hunter2".into(),
            ..DatabaseConfig::default()
        };
        assert_eq!(
            db.dsn(),
            "host=localhost user=app password=hunter2 dbname=movie port=5432"
        );
    }

    #[test]
    fn redacted_hides_password() {
        let mut config = ServiceConfig::default();
        config.database.password = "hunter2".into();
        let shown = config.redacted();
        assert_eq!(shown.database.password, "<redacted>");
        assert_eq!(config.database.password, "hunter2");
    }
}
