//! TCP listener binding.
//!
//! # Responsibilities
//! - Bind to configured address(es)
//! - Tag every failure with the listener it came from
//! - Classify failures as fatal or degraded
//!
//! # Design Decisions
//! - Binding is never retried: a taken port is a misconfiguration
//! - Neither listener waits on the other being bound

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::lifecycle::error::Severity;

/// Which listener an error or event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    /// Serves the API; its failure ends the process.
    Primary,
    /// Serves runtime introspection; its failure is only logged.
    Diagnostics,
}

impl ListenerRole {
    /// Severity of any failure of this listener.
    pub fn severity(self) -> Severity {
        match self {
            ListenerRole::Primary => Severity::Fatal,
            ListenerRole::Diagnostics => Severity::Degraded,
        }
    }
}

impl std::fmt::Display for ListenerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerRole::Primary => write!(f, "primary"),
            ListenerRole::Diagnostics => write!(f, "diagnostics"),
        }
    }
}

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind {
        role: ListenerRole,
        address: String,
        source: std::io::Error,
    },
    /// The accept loop failed.
    Serve {
        role: ListenerRole,
        source: std::io::Error,
    },
    /// The accept loop returned without being told to stop.
    Exited { role: ListenerRole },
    /// The listener task panicked or was cancelled.
    Aborted { role: ListenerRole, reason: String },
}

impl ListenerError {
    pub fn role(&self) -> ListenerRole {
        match self {
            ListenerError::Bind { role, .. }
            | ListenerError::Serve { role, .. }
            | ListenerError::Exited { role }
            | ListenerError::Aborted { role, .. } => *role,
        }
    }

    pub fn severity(&self) -> Severity {
        self.role().severity()
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind {
                role,
                address,
                source,
            } => write!(f, "Failed to bind {} listener to {}: {}", role, address, source),
            ListenerError::Serve { role, source } => {
                write!(f, "{} listener failed: {}", role, source)
            }
            ListenerError::Exited { role } => {
                write!(f, "{} listener stopped unexpectedly", role)
            }
            ListenerError::Aborted { role, reason } => {
                write!(f, "{} listener task aborted: {}", role, reason)
            }
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } | ListenerError::Serve { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Bind a TCP listener for `role` at `address`.
pub async fn bind(role: ListenerRole, address: &str) -> Result<TcpListener, ListenerError> {
    let bind_error = |source| ListenerError::Bind {
        role,
        address: address.to_string(),
        source,
    };

    let addr: SocketAddr = address.parse().map_err(|e| {
        bind_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;

    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    tracing::info!(
        listener = %role,
        address = %local_addr,
        "Listener bound"
    );

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_reports_port_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = taken.local_addr().unwrap().to_string();

        let err = bind(ListenerRole::Diagnostics, &address).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert_eq!(err.role(), ListenerRole::Diagnostics);
        assert_eq!(err.severity(), Severity::Degraded);
    }

    #[tokio::test]
    async fn bind_rejects_unparseable_address() {
        let err = bind(ListenerRole::Primary, "localhost:http").await.unwrap_err();
        assert_eq!(err.severity(), Severity::Fatal);
        assert!(err.to_string().contains("primary"));
    }

    #[tokio::test]
    async fn bind_to_ephemeral_port() {
        let listener = bind(ListenerRole::Primary, "127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
