#![forbid(unsafe_code)]

// Stop signal: one-shot broadcast built on a watch channel

use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Broadcast side of the stop signal. Flips from "running" to "stopped" once.
#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fires the signal. Returns `true` only for the call that actually fired it;
    /// later calls leave every listener untouched.
    pub fn trigger(&self) -> bool {
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                true
            }
        })
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side handed to every session and to the reporter.
#[derive(Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    /// Resolves once the signal has fired. Safe to use as a `select!` branch
    /// repeatedly: it stays pending until the signal fires.
    /// A dropped `StopSignal` counts as stopped.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed the run is left to
/// end on its own instead of stopping at once.
pub async fn ctrl_c() {
    interrupt_from(tokio::signal::ctrl_c()).await
}

async fn interrupt_from<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
