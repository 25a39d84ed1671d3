//! Shutdown coordination for responder workers.
//!
//! Workers hold a [`ShutdownHandle`] and stop picking up new messages once it
//! fires. A request already being handled is finished and answered first.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// A handle for triggering or checking shutdown status.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// Creates a handle that has not fired.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Triggers a shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a future that completes when shutdown is triggered.
    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    /// Triggers the shutdown on Ctrl+C (and SIGTERM on Unix).
    pub fn trigger_on_signal(&self) {
        let handle = self.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
                            _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, initiating shutdown"),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                        if tokio::signal::ctrl_c().await.is_ok() {
                            info!("Received Ctrl+C, initiating shutdown");
                        }
                    }
                }
            }
            #[cfg(not(unix))]
            {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, initiating shutdown");
                }
            }
            handle.trigger();
        });
    }
}

/// A signal that completes when shutdown is signaled.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal.
    pub async fn wait(mut self) {
        // An Err means every sender is gone; nothing can trigger anymore.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}
