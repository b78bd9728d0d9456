//! Startup errors and their severity.

use crate::lifecycle::signals::SignalError;
use crate::net::ListenerError;

/// How far an error is allowed to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Ends the process with a non-zero exit.
    Fatal,
    /// Logged and absorbed at the component boundary.
    Degraded,
}

/// Errors that stop the service before it reaches `Running`.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Signal(#[from] SignalError),
}

impl LifecycleError {
    pub fn severity(&self) -> Severity {
        match self {
            LifecycleError::Listener(e) => e.severity(),
            // Without signal handlers there is no graceful path at all.
            LifecycleError::Signal(_) => Severity::Fatal,
        }
    }
}
