//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate bind addresses and that listeners do not collide
//! - Validate value ranges (timeouts > 0, sampling ratio within bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before any listener is bound

use std::net::SocketAddr;

use tokio::sync::Semaphore;
use url::Url;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("primary and diagnostics listeners share address {0}")]
    AddressConflict(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} must be at most {max}")]
    TooLarge { field: &'static str, max: usize },

    #[error("tracing.sampling_ratio must be within 0.0..=1.0, got {0}")]
    SamplingRatio(String),

    #[error("tracing.collector_endpoint {0:?} is not an http(s) URL")]
    CollectorEndpoint(String),

    #[error("tracing.service_name must not be empty")]
    ServiceName,
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let primary = parse_address(
        "primary.bind_address",
        &config.primary.bind_address,
        &mut errors,
    );
    if config.diagnostics.enabled {
        let diagnostics = parse_address(
            "diagnostics.bind_address",
            &config.diagnostics.bind_address,
            &mut errors,
        );
        // Port 0 asks the OS for a fresh port, so it never collides.
        if let (Some(p), Some(d)) = (primary, diagnostics) {
            let overlapping_ip = p.ip() == d.ip() || p.ip().is_unspecified() || d.ip().is_unspecified();
            if p.port() == d.port() && p.port() != 0 && overlapping_ip {
                errors.push(ValidationError::AddressConflict(p.to_string()));
            }
        }
    }

    if config.primary.max_connections == 0 {
        errors.push(ValidationError::Zero("primary.max_connections"));
    }
    // The concurrency gate is a semaphore with a hard permit ceiling.
    if config.primary.max_connections > Semaphore::MAX_PERMITS {
        errors.push(ValidationError::TooLarge {
            field: "primary.max_connections",
            max: Semaphore::MAX_PERMITS,
        });
    }
    if config.primary.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero("primary.request_timeout_secs"));
    }
    if config.shutdown.drain_timeout_ms == 0 {
        errors.push(ValidationError::Zero("shutdown.drain_timeout_ms"));
    }
    if config.shutdown.flush_reserve_ms == 0 {
        errors.push(ValidationError::Zero("shutdown.flush_reserve_ms"));
    }

    if config.tracing.enabled {
        let tracing = &config.tracing;
        if tracing.service_name.trim().is_empty() {
            errors.push(ValidationError::ServiceName);
        }
        if !(0.0..=1.0).contains(&tracing.sampling_ratio) {
            errors.push(ValidationError::SamplingRatio(
                tracing.sampling_ratio.to_string(),
            ));
        }
        let endpoint_ok = Url::parse(&tracing.collector_endpoint)
            .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
            .unwrap_or(false);
        if !endpoint_ok {
            errors.push(ValidationError::CollectorEndpoint(
                tracing.collector_endpoint.clone(),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_address(
    field: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            });
            None
        }
    }
}
