//! Built-in routes served on the primary listener.
//!
//! The catalogue REST resources are merged on top of this router by the
//! embedding program.

use axum::{routing::get, Extension, Json, Router};
use opentelemetry::trace::{Span as _, Tracer as _};
use opentelemetry::KeyValue;
use serde::Serialize;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::observability::SpanSource;

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub tracing_exporting: bool,
}

pub fn router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/version", get(version))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn version(Extension(spans): Extension<SpanSource>) -> Json<VersionInfo> {
    if let Some(tracer) = spans.tracer() {
        // Child of the request span opened by the trace layer.
        let parent = tracing::Span::current().context();
        let mut span = tracer.start_with_context("catalogue.version", &parent);
        span.set_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")));
        span.end();
    }

    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        tracing_exporting: spans.is_exporting(),
    })
}
