//! Wait for the first of several independent event sources.
//!
//! Each source runs as its own task and reports exactly one event into a
//! shared queue. Events are totally ordered by arrival; the consumer decides
//! on the first and may keep reading later ones.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError};

pub struct FanIn<E> {
    tx: mpsc::UnboundedSender<E>,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E: Send + 'static> FanIn<E> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Spawn `source` and forward its output as an event.
    ///
    /// If the task panics or is aborted, `recover` turns the join error into
    /// the event instead, so a dead source is never silent. The returned
    /// handle aborts the source task.
    pub fn attach<F, R>(&self, source: F, recover: R) -> AbortHandle
    where
        F: Future<Output = E> + Send + 'static,
        R: FnOnce(JoinError) -> E + Send + 'static,
    {
        let task = tokio::spawn(source);
        let abort = task.abort_handle();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match task.await {
                Ok(event) => event,
                Err(e) => recover(e),
            };
            let _ = tx.send(event);
        });
        abort
    }

    /// Next event in arrival order.
    pub async fn next(&mut self) -> Option<E> {
        self.rx.recv().await
    }
}

impl<E: Send + 'static> Default for FanIn<E> {
    fn default() -> Self {
        Self::new()
    }
}
