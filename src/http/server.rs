//! Primary HTTP listener.
//!
//! # Responsibilities
//! - Wrap the API router with the service middleware stack
//! - Serve it on the bound primary socket
//! - Stop accepting on the coordinator's signal and let in-flight requests finish

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{Request as HttpRequest, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Extension, Router,
};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ListenerConfig;
use crate::http::request::{request_id, MakeRequestUuid};
use crate::lifecycle::shutdown::ShutdownListener;
use crate::net::listener::{self, ListenerError, ListenerRole};
use crate::net::InFlightTracker;
use crate::observability::{metrics, SpanSource};

/// The request-serving listener.
pub struct PrimaryListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl PrimaryListener {
    /// Bind the configured address. Failure here is fatal to startup.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let listener = listener::bind(ListenerRole::Primary, &config.bind_address).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind {
                role: ListenerRole::Primary,
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

    /// Serve `app` until `shutdown` fires, then wait for open connections.
    ///
    /// Returns `Ok(())` only when the stop was requested; the caller bounds
    /// the wait for in-flight requests.
    pub async fn run(self, app: Router, shutdown: ShutdownListener) -> Result<(), ListenerError> {
        tracing::info!(address = %self.local_addr, "Primary listener serving");

        let requested = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&requested);
        let stop = async move {
            shutdown.wait().await;
            flag.store(true, Ordering::SeqCst);
            tracing::info!("Primary listener stopped accepting connections");
        };

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(stop)
        .await
        .map_err(|source| ListenerError::Serve {
            role: ListenerRole::Primary,
            source,
        })?;

        if requested.load(Ordering::SeqCst) {
            tracing::info!("Primary listener drained");
            Ok(())
        } else {
            Err(ListenerError::Exited {
                role: ListenerRole::Primary,
            })
        }
    }
}

/// Build the primary router: `api` plus the service middleware stack.
pub fn build_router(
    config: &ListenerConfig,
    api: Router,
    spans: SpanSource,
    tracker: InFlightTracker,
    cancel: ShutdownListener,
) -> Router {
    let gate = RequestGate {
        tracker,
        limit: Arc::new(Semaphore::new(config.max_connections)),
        cancel,
    };

    api.layer(Extension(spans))
        .layer(middleware::from_fn_with_state(gate, gate_request))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id(request),
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Shared by every route: one semaphore bounds the whole listener.
#[derive(Clone)]
struct RequestGate {
    tracker: InFlightTracker,
    limit: Arc<Semaphore>,
    /// Fires when the drain deadline passes.
    cancel: ShutdownListener,
}

/// Waits for a concurrency slot, counts the request as in flight and records its metrics.
async fn gate_request(State(gate): State<RequestGate>, request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();

    // Acquire permit first (backpressure)
    let Ok(_permit) = gate.limit.acquire_owned().await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };
    let _guard = gate.tracker.track();

    let response = tokio::select! {
        response = next.run(request) => response,
        _ = gate.cancel.clone().wait() => {
            tracing::warn!(method = %method, "Request cancelled at drain deadline");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    };
    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown::Shutdown;
    use axum::routing::get;

    #[tokio::test]
    async fn slow_request_times_out_with_408() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            request_timeout_secs: 1,
            ..ListenerConfig::default()
        };
        // Dropping the trigger would cancel every request with 503.
        let shutdown = Shutdown::new();
        let tracker = InFlightTracker::new();
        let api = Router::new().route("/stuck", get(|| std::future::pending::<&'static str>()));
        let app = build_router(
            &config,
            api,
            SpanSource::default(),
            tracker.clone(),
            shutdown.listener(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let res = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get(format!("http://{addr}/stuck"))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT.as_u16());
        assert!(res.headers().contains_key("x-request-id"));
        // The timed-out handler was dropped along with its in-flight guard.
        assert_eq!(tracker.active_count(), 0);
        assert!(!shutdown.is_triggered());
    }
}
