//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the primary listener, then the diagnostics listener
//! - Install the signal watcher
//! - Launch both listener tasks and hand everything to the coordinator
//!
//! # Design Decisions
//! - Primary bind failure is fatal and happens before diagnostics or signal
//!   handlers are touched; tracing is still torn down on that path
//! - Diagnostics bind failure is logged and the service starts without it
//! - Tracing has already been started by the caller (the log subscriber needs
//!   its tracer); a missing provider only means no spans are exported

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ServiceConfig;
use crate::diagnostics::{DiagnosticsListener, DiagnosticsState};
use crate::http::{build_router, PrimaryListener};
use crate::lifecycle::coordinator::{LifecycleEvent, Phase, ShutdownCoordinator, Teardown};
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::fan_in::FanIn;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::SignalSource;
use crate::net::{InFlightTracker, ListenerError, ListenerRole};
use crate::observability::{metrics, SpanSource, TracingProvider};

/// Assembles the service before launch.
pub struct Bootstrap {
    config: ServiceConfig,
    api: Router,
    spans: SpanSource,
    telemetry: Option<Box<dyn Teardown>>,
    signals: SignalSource,
}

impl Bootstrap {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            api: Router::new(),
            spans: SpanSource::default(),
            telemetry: None,
            signals: SignalSource::Os,
        }
    }

    /// Routes served on the primary listener.
    pub fn api(mut self, api: Router) -> Self {
        self.api = api;
        self
    }

    /// Export request spans through `provider` and shut it down last.
    pub fn telemetry(mut self, provider: TracingProvider) -> Self {
        self.spans = provider.span_source();
        self.telemetry = Some(Box::new(provider));
        self
    }

    /// Replace what is torn down after the drain.
    pub fn teardown(mut self, teardown: impl Teardown + 'static) -> Self {
        self.telemetry = Some(Box::new(teardown));
        self
    }

    pub fn signals(mut self, signals: SignalSource) -> Self {
        self.signals = signals;
        self
    }

    /// Bind sockets, launch listener tasks and return the coordinator in `Starting`.
    pub async fn launch(self) -> Result<ShutdownCoordinator, LifecycleError> {
        let Bootstrap {
            config,
            api,
            spans,
            mut telemetry,
            signals,
        } = self;

        let (phase, _) = watch::channel(Phase::Starting);
        tracing::info!(phase = ?Phase::Starting, "Lifecycle phase changed");

        let primary = match PrimaryListener::bind(&config.primary).await {
            Ok(listener) => listener,
            Err(error) => {
                abandon(&config, telemetry.take()).await;
                return Err(error.into());
            }
        };

        let diagnostics = if config.diagnostics.enabled {
            match DiagnosticsListener::bind(&config.diagnostics).await {
                Ok(listener) => Some(listener),
                Err(error) => {
                    tracing::error!(
                        error = %error,
                        severity = ?error.severity(),
                        "Diagnostics listener unavailable; continuing without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        let watcher = match signals.watch() {
            Ok(watcher) => watcher,
            Err(error) => {
                abandon(&config, telemetry.take()).await;
                return Err(error.into());
            }
        };

        let events = FanIn::new();
        let stop = Shutdown::new();
        let diagnostics_stop = Shutdown::new();
        let cancel = Shutdown::new();
        let tracker = InFlightTracker::new();

        let primary_addr = primary.local_addr();
        let app = build_router(
            &config.primary,
            api,
            spans,
            tracker.clone(),
            cancel.listener(),
        );
        let primary_task = events.attach(
            {
                let stopped = stop.listener();
                async move { LifecycleEvent::Primary(primary.run(app, stopped).await) }
            },
            |e| {
                LifecycleEvent::Primary(Err(ListenerError::Aborted {
                    role: ListenerRole::Primary,
                    reason: e.to_string(),
                }))
            },
        );

        let diagnostics_addr = diagnostics.as_ref().map(DiagnosticsListener::local_addr);
        if let Some(listener) = diagnostics {
            let state = DiagnosticsState {
                started_at: std::time::Instant::now(),
                tracker: tracker.clone(),
                config: Arc::new(
                    serde_json::to_value(config.redacted()).unwrap_or(serde_json::Value::Null),
                ),
                metrics: if config.observability.metrics_enabled {
                    metrics::init_metrics()
                } else {
                    None
                },
            };
            let stopped = diagnostics_stop.listener();
            events.attach(
                async move { LifecycleEvent::Diagnostics(listener.run(state, stopped).await) },
                |e| {
                    LifecycleEvent::Diagnostics(Err(ListenerError::Aborted {
                        role: ListenerRole::Diagnostics,
                        reason: e.to_string(),
                    }))
                },
            );
        }

        // A closed signal source means no signal will ever arrive.
        events.attach(
            async move {
                match watcher.recv().await {
                    Some(signal) => LifecycleEvent::Signal(signal),
                    None => std::future::pending().await,
                }
            },
            |e| {
                tracing::error!(error = %e, "Signal watcher task ended");
                LifecycleEvent::Primary(Err(ListenerError::Aborted {
                    role: ListenerRole::Primary,
                    reason: "signal watcher lost".to_string(),
                }))
            },
        );

        tracing::info!(
            primary = %primary_addr,
            diagnostics = ?diagnostics_addr,
            "Service started"
        );

        Ok(ShutdownCoordinator {
            config: config.shutdown,
            events,
            stop,
            diagnostics_stop,
            cancel,
            primary: primary_task,
            telemetry,
            tracker,
            phase,
            history: vec![Phase::Starting],
            primary_addr,
            diagnostics_addr,
        })
    }
}

/// Best-effort tracing teardown when startup fails.
async fn abandon(config: &ServiceConfig, telemetry: Option<Box<dyn Teardown>>) {
    if let Some(telemetry) = telemetry {
        let deadline = Instant::now() + Duration::from_millis(config.shutdown.flush_reserve_ms);
        if let Err(error) = telemetry.teardown(deadline).await {
            tracing::warn!(error = %error, "Tracing provider shutdown incomplete");
        }
    }
}
