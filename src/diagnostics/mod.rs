//! Diagnostics listener.
//!
//! Runtime introspection and profiling on its own port, unauthenticated and
//! best-effort: a bind or serve failure is logged and the API keeps serving.

pub mod handlers;
pub mod profiling;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

use self::handlers::*;
use self::profiling::{get_cpu_profile, get_heap_profile};
use crate::config::DiagnosticsConfig;
use crate::lifecycle::shutdown::ShutdownListener;
use crate::net::listener::{self, ListenerError, ListenerRole};

pub use self::handlers::DiagnosticsState;

pub fn setup_diagnostics_router(state: DiagnosticsState) -> Router {
    Router::new()
        .route("/debug/health", get(get_health))
        .route("/debug/build", get(get_build))
        .route("/debug/runtime", get(get_runtime))
        .route("/debug/config", get(get_config))
        .route("/debug/pprof/profile", get(get_cpu_profile))
        .route("/debug/pprof/heap", get(get_heap_profile))
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

/// The introspection listener.
pub struct DiagnosticsListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl DiagnosticsListener {
    pub async fn bind(config: &DiagnosticsConfig) -> Result<Self, ListenerError> {
        let listener = listener::bind(ListenerRole::Diagnostics, &config.bind_address).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind {
                role: ListenerRole::Diagnostics,
                address: config.bind_address.clone(),
                source,
            })?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `shutdown` fires.
    pub async fn run(
        self,
        state: DiagnosticsState,
        shutdown: ShutdownListener,
    ) -> Result<(), ListenerError> {
        tracing::info!(address = %self.local_addr, "Diagnostics listener serving");

        axum::serve(self.listener, setup_diagnostics_router(state))
            .with_graceful_shutdown(shutdown.wait())
            .await
            .map_err(|source| ListenerError::Serve {
                role: ListenerRole::Diagnostics,
                source,
            })
    }
}
