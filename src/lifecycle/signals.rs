//! OS signal handling.
//!
//! # Responsibilities
//! - Register SIGINT and SIGTERM handlers once per process
//! - Publish the first delivery as a single [`ShutdownSignal`]
//! - Stop watching after that; a burst of signals produces one notification
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The watcher only reports; the coordinator decides what to do
//! - An in-process channel can stand in for the OS with the same semantics

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Which termination request arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("signal handlers are already installed in this process")]
    AlreadyInstalled,

    #[error("failed to register {signal} handler: {source}")]
    Register {
        signal: ShutdownSignal,
        #[source]
        source: std::io::Error,
    },
}

/// Where shutdown notifications come from.
#[derive(Debug)]
pub enum SignalSource {
    /// SIGINT / SIGTERM delivered to this process.
    Os,
    /// Signals sent by the embedding program.
    Channel(mpsc::Receiver<ShutdownSignal>),
}

impl SignalSource {
    /// Start watching this source.
    pub fn watch(self) -> Result<SignalWatcher, SignalError> {
        match self {
            SignalSource::Os => SignalWatcher::install(),
            SignalSource::Channel(rx) => Ok(SignalWatcher::from_receiver(rx)),
        }
    }
}

/// One-shot notification of the first termination request.
#[derive(Debug)]
pub struct SignalWatcher {
    rx: oneshot::Receiver<ShutdownSignal>,
}

impl SignalWatcher {
    /// Register OS signal handlers. Must be called from within a Tokio runtime.
    pub fn install() -> Result<Self, SignalError> {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(SignalError::AlreadyInstalled);
        }

        let (tx, rx) = oneshot::channel();
        match spawn_os_watcher(tx) {
            Ok(()) => {
                tracing::debug!("Signal handlers installed");
                Ok(Self { rx })
            }
            Err(e) => {
                INSTALLED.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Watch an in-process channel. Only the first message is published.
    pub fn from_receiver(mut source: mpsc::Receiver<ShutdownSignal>) -> Self {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Some(signal) = source.recv().await {
                tracing::info!(signal = %signal, "Shutdown signal received");
                let _ = tx.send(signal);
            }
        });
        Self { rx }
    }

    /// Wait for the notification. `None` if the source closed without one.
    pub async fn recv(self) -> Option<ShutdownSignal> {
        self.rx.await.ok()
    }
}

#[cfg(unix)]
fn spawn_os_watcher(tx: oneshot::Sender<ShutdownSignal>) -> Result<(), SignalError> {
    use tokio::signal::unix::{signal, SignalKind};

    let register = |kind, which| {
        signal(kind).map_err(|source| SignalError::Register {
            signal: which,
            source,
        })
    };
    let mut interrupt = register(SignalKind::interrupt(), ShutdownSignal::Interrupt)?;
    let mut terminate = register(SignalKind::terminate(), ShutdownSignal::Terminate)?;

    tokio::spawn(async move {
        let received = tokio::select! {
            Some(()) = interrupt.recv() => ShutdownSignal::Interrupt,
            Some(()) = terminate.recv() => ShutdownSignal::Terminate,
            else => return,
        };
        tracing::info!(signal = %received, "Shutdown signal received");
        let _ = tx.send(received);
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_os_watcher(tx: oneshot::Sender<ShutdownSignal>) -> Result<(), SignalError> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(signal = %ShutdownSignal::Interrupt, "Shutdown signal received");
            let _ = tx.send(ShutdownSignal::Interrupt);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_yields_first_signal_only() {
        let (tx, rx) = mpsc::channel(8);
        let watcher = SignalWatcher::from_receiver(rx);

        tx.send(ShutdownSignal::Terminate).await.unwrap();
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        tx.send(ShutdownSignal::Terminate).await.unwrap();

        assert_eq!(watcher.recv().await, Some(ShutdownSignal::Terminate));
    }

    #[tokio::test]
    async fn watcher_stops_after_first_signal() {
        let (tx, rx) = mpsc::channel(1);
        let watcher = SignalWatcher::from_receiver(rx);
        tx.send(ShutdownSignal::Interrupt).await.unwrap();
        assert_eq!(watcher.recv().await, Some(ShutdownSignal::Interrupt));

        // The watcher task dropped its receiver once it published.
        tokio::time::timeout(std::time::Duration::from_secs(1), tx.closed())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn closed_source_yields_nothing() {
        let (tx, rx) = mpsc::channel(1);
        let watcher = SignalWatcher::from_receiver(rx);
        drop(tx);
        assert_eq!(watcher.recv().await, None);
    }

    #[test]
    fn signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
    }
}
