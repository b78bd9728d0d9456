//! Shutdown coordination.
//!
//! # State Machine
//! ```text
//! Starting → Running → Draining → Terminated
//!               └────→ Failed ───→ Terminated
//! ```
//!
//! - Running: first event decides. Primary outcome → Failed, signal →
//!   Draining, diagnostics outcome → logged, keep waiting.
//! - Draining: stop accepting, wait for the primary listener until the
//!   deadline. On overrun, cancel the remaining requests and abort it.
//! - Tracing teardown always runs after the primary listener is gone, on
//!   both paths, with at least `flush_reserve` left.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::config::ShutdownConfig;
use crate::lifecycle::fan_in::FanIn;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::ShutdownSignal;
use crate::net::{InFlightTracker, ListenerError, ListenerRole};
use crate::observability::{metrics, TelemetryError};

/// Lifecycle phase of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Running,
    Draining,
    Failed,
    Terminated,
}

/// One arrival at the coordinator's fan-in.
#[derive(Debug)]
pub enum LifecycleEvent {
    Primary(Result<(), ListenerError>),
    Diagnostics(Result<(), ListenerError>),
    Signal(ShutdownSignal),
}

/// How the drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainReport {
    /// Every in-flight request finished.
    Completed { elapsed: Duration },
    /// The deadline passed; remaining connections were dropped.
    TimedOut { in_flight: u64 },
}

#[derive(Debug)]
pub enum Termination {
    Graceful {
        signal: ShutdownSignal,
        drain: DrainReport,
    },
    Failed {
        error: ListenerError,
    },
}

/// Final result of [`ShutdownCoordinator::run`].
#[derive(Debug)]
pub struct Outcome {
    pub termination: Termination,
    /// `None` when no tracing provider was running.
    pub telemetry: Option<Result<(), TelemetryError>>,
    /// Every phase entered, in order.
    pub phases: Vec<Phase>,
}

impl Outcome {
    /// Process exit status: 0 after a graceful shutdown, 1 after a fatal listener failure.
    pub fn exit_status(&self) -> u8 {
        match self.termination {
            Termination::Graceful { .. } => 0,
            Termination::Failed { .. } => 1,
        }
    }
}

/// Something that must be flushed and closed last.
pub trait Teardown: Send {
    fn teardown(self: Box<Self>, deadline: Instant) -> BoxFuture<'static, Result<(), TelemetryError>>;
}

/// Owns the running service and drives it to `Terminated`.
pub struct ShutdownCoordinator {
    pub(crate) config: ShutdownConfig,
    pub(crate) events: FanIn<LifecycleEvent>,
    pub(crate) stop: Shutdown,
    pub(crate) diagnostics_stop: Shutdown,
    /// Cancels requests still running at the drain deadline.
    pub(crate) cancel: Shutdown,
    pub(crate) primary: AbortHandle,
    pub(crate) telemetry: Option<Box<dyn Teardown>>,
    pub(crate) tracker: InFlightTracker,
    pub(crate) phase: watch::Sender<Phase>,
    pub(crate) history: Vec<Phase>,
    pub(crate) primary_addr: SocketAddr,
    pub(crate) diagnostics_addr: Option<SocketAddr>,
}

impl ShutdownCoordinator {
    pub fn primary_addr(&self) -> SocketAddr {
        self.primary_addr
    }

    /// `None` when the diagnostics listener is disabled or failed to bind.
    pub fn diagnostics_addr(&self) -> Option<SocketAddr> {
        self.diagnostics_addr
    }

    /// Requests currently being served by the primary listener.
    pub fn in_flight(&self) -> InFlightTracker {
        self.tracker.clone()
    }

    /// Watch phase transitions while [`run`](Self::run) is in progress.
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Block until the service has terminated.
    pub async fn run(mut self) -> Outcome {
        self.enter(Phase::Running);

        let termination = match self.wait_for_decision().await {
            Decision::Drain(signal) => {
                let deadline = Instant::now() + Duration::from_millis(self.config.drain_timeout_ms);
                let drain = self.drain(signal, deadline).await;
                let telemetry = self.teardown(deadline).await;
                return self.finish(Termination::Graceful { signal, drain }, telemetry);
            }
            Decision::Fail(error) => {
                self.enter(Phase::Failed);
                tracing::error!(
                    error = %error,
                    severity = ?error.severity(),
                    "Primary listener failed; skipping drain"
                );
                Termination::Failed { error }
            }
        };

        let telemetry = self.teardown(Instant::now()).await;
        self.finish(termination, telemetry)
    }

    async fn wait_for_decision(&mut self) -> Decision {
        loop {
            match self.events.next().await {
                Some(LifecycleEvent::Signal(signal)) => return Decision::Drain(signal),
                Some(LifecycleEvent::Primary(result)) => {
                    return Decision::Fail(result.err().unwrap_or(ListenerError::Exited {
                        role: ListenerRole::Primary,
                    }))
                }
                Some(LifecycleEvent::Diagnostics(result)) => log_diagnostics_exit(result),
                None => {
                    return Decision::Fail(ListenerError::Exited {
                        role: ListenerRole::Primary,
                    })
                }
            }
        }
    }

    async fn drain(&mut self, signal: ShutdownSignal, deadline: Instant) -> DrainReport {
        self.enter(Phase::Draining);
        let started = Instant::now();
        tracing::info!(
            signal = %signal,
            in_flight = self.tracker.active_count(),
            drain_timeout_ms = self.config.drain_timeout_ms,
            "Shutdown started; draining primary listener"
        );

        self.stop.trigger();
        match tokio::time::timeout_at(deadline, self.primary_stopped()).await {
            Ok(result) => {
                if let Err(error) = result {
                    tracing::warn!(error = %error, "Primary listener reported an error while draining");
                }
                let elapsed = started.elapsed();
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "Drain complete");
                DrainReport::Completed { elapsed }
            }
            Err(_) => {
                let in_flight = self.tracker.active_count();
                self.cancel.trigger();
                self.primary.abort();
                metrics::record_drain_timeout();
                tracing::warn!(
                    in_flight,
                    drain_timeout_ms = self.config.drain_timeout_ms,
                    "Drain deadline exceeded; dropping remaining connections"
                );
                DrainReport::TimedOut { in_flight }
            }
        }
    }

    async fn primary_stopped(&mut self) -> Result<(), ListenerError> {
        loop {
            match self.events.next().await {
                Some(LifecycleEvent::Primary(result)) => return result,
                Some(LifecycleEvent::Diagnostics(result)) => log_diagnostics_exit(result),
                Some(LifecycleEvent::Signal(signal)) => {
                    tracing::debug!(signal = %signal, "Already draining");
                }
                None => return Ok(()),
            }
        }
    }

    async fn teardown(&mut self, deadline: Instant) -> Option<Result<(), TelemetryError>> {
        let telemetry = self.telemetry.take()?;
        let floor = Instant::now() + Duration::from_millis(self.config.flush_reserve_ms);
        let result = telemetry.teardown(deadline.max(floor)).await;
        match &result {
            Ok(()) => tracing::info!("Tracing provider flushed and closed"),
            Err(error) => tracing::warn!(
                error = %error,
                severity = ?error.severity(),
                "Tracing provider shutdown incomplete"
            ),
        }
        Some(result)
    }

    fn finish(
        mut self,
        termination: Termination,
        telemetry: Option<Result<(), TelemetryError>>,
    ) -> Outcome {
        self.diagnostics_stop.trigger();
        self.enter(Phase::Terminated);
        Outcome {
            termination,
            telemetry,
            phases: self.history,
        }
    }

    pub(crate) fn enter(&mut self, phase: Phase) {
        tracing::info!(phase = ?phase, "Lifecycle phase changed");
        self.history.push(phase);
        self.phase.send_replace(phase);
    }
}

enum Decision {
    Drain(ShutdownSignal),
    Fail(ListenerError),
}

fn log_diagnostics_exit(result: Result<(), ListenerError>) {
    match result {
        Ok(()) => tracing::warn!("Diagnostics listener stopped; continuing without it"),
        Err(error) => tracing::error!(
            error = %error,
            severity = ?error.severity(),
            "Diagnostics listener failed; continuing without it"
        ),
    }
}
