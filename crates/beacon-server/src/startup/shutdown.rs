//! Graceful shutdown handling for Beacon server

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shutdown broadcast shared by every background task
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn sender(&self) -> &broadcast::Sender<()> {
        &self.sender
    }

    pub fn shutdown(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.sender.send(());
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Trigger `signal` on Ctrl+C or SIGTERM
pub fn wait_for_shutdown_signal(signal: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
        }

        signal.shutdown();
    })
}

/// Waits for the shutdown broadcast, then for background tasks to finish
pub struct GracefulShutdown {
    shutdown_signal: ShutdownSignal,
    shutdown_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(shutdown_signal: ShutdownSignal, shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_signal,
            shutdown_timeout,
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Resolves once shutdown has been triggered
    pub async fn wait_for_shutdown(&self) {
        let mut receiver = self.shutdown_signal.subscribe();
        if self.shutdown_signal.is_shutdown() {
            return;
        }
        let _ = receiver.recv().await;
    }

    /// Wait up to the shutdown timeout for `handles`. Returns whether they all
    /// finished in time.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>) -> bool {
        let count = handles.len();
        match tokio::time::timeout(self.shutdown_timeout, join_all(handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("Background task ended abnormally: {}", e);
                    }
                }
                info!(tasks = count, "Background tasks stopped");
                true
            }
            Err(_) => {
                warn!(
                    "Background tasks still running after {:?}, giving up",
                    self.shutdown_timeout
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        assert!(!signal.is_shutdown());

        let signal_clone = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signal_clone.shutdown();
        });

        let result = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(result.is_ok());
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns() {
        let signal = ShutdownSignal::new();
        signal.shutdown();
        let graceful = GracefulShutdown::new(signal, Duration::from_secs(1));
        let result =
            tokio::time::timeout(Duration::from_millis(100), graceful.wait_for_shutdown()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_drain_stops_tasks() {
        let signal = ShutdownSignal::new();
        let mut rx = signal.subscribe();
        let handle = tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        signal.shutdown();
        let graceful = GracefulShutdown::new(signal, Duration::from_secs(1));
        assert!(graceful.drain(vec![handle]).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out() {
        let graceful = GracefulShutdown::new(ShutdownSignal::new(), Duration::from_secs(1));
        let handle = tokio::spawn(std::future::pending::<()>());
        assert!(!graceful.drain(vec![handle]).await);
    }
}
