//! Command-line flags layered over the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::validate_config;

#[derive(Debug, Parser)]
#[command(name = "catalogue-service")]
#[command(about = "Movie catalogue API with tracing and graceful shutdown", long_about = None)]
pub struct Cli {
    /// TOML configuration file; flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port for the primary HTTP listener.
    #[arg(long)]
    pub port: Option<u16>,

    /// Bind address for the diagnostics listener.
    #[arg(long)]
    pub diagnostics_address: Option<String>,

    /// Do not start the diagnostics listener.
    #[arg(long)]
    pub disable_diagnostics: bool,

    /// OTLP/HTTP collector endpoint.
    #[arg(long)]
    pub collector_endpoint: Option<String>,

    /// Run without span export.
    #[arg(long)]
    pub disable_tracing: bool,

    /// Time allowed for in-flight requests after SIGINT/SIGTERM.
    #[arg(long)]
    pub drain_timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Postgres host.
    #[arg(long)]
    pub postgres_host: Option<String>,

    /// Postgres password.
    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub postgres_password: Option<String>,
}

impl Cli {
    /// Resolve defaults, the optional file and flag overrides into a validated config.
    pub fn into_config(self) -> Result<ServiceConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => ServiceConfig::default(),
        };
        self.apply(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }

    fn apply(self, config: &mut ServiceConfig) {
        if let Some(port) = self.port {
            config.primary.bind_address = format!("0.0.0.0:{port}");
        }
        if let Some(address) = self.diagnostics_address {
            config.diagnostics.bind_address = address;
        }
        if self.disable_diagnostics {
            config.diagnostics.enabled = false;
        }
        if let Some(endpoint) = self.collector_endpoint {
            config.tracing.collector_endpoint = endpoint;
        }
        if self.disable_tracing {
            config.tracing.enabled = false;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.shutdown.drain_timeout_ms = ms;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        if let Some(host) = self.postgres_host {
            config.database.host = host;
        }
        if let Some(password) = self.postgres_password {
            config.database.password = password;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "catalogue-service",
            "--port",
            "9090",
            "--disable-tracing",
            "--drain-timeout-ms",
            "250",
            "--log-format",
            "json",
            "--postgres-host",
            "db.internal",
        ])
        .unwrap();

        let config = cli.into_config().unwrap();
        assert_eq!(config.primary.bind_address, "0.0.0.0:9090");
        assert!(!config.tracing.enabled);
        assert_eq!(config.shutdown.drain_timeout_ms, 250);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.database.host, "db.internal");
    }

    #[test]
    fn invalid_override_fails_validation() {
        let cli = Cli::try_parse_from(["catalogue-service", "--drain-timeout-ms", "0"]).unwrap();
        assert!(matches!(
            cli.into_config(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn port_must_be_numeric() {
        assert!(Cli::try_parse_from(["catalogue-service", "--port", "http"]).is_err());
    }
}
