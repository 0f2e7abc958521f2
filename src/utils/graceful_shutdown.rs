use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::{signal, sync::broadcast};

/// Why the process is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Requested from code, e.g. after a fatal server error
    Requested,
    /// The shutdown channel went away
    Force,
}

/// Fans a single shutdown request out to every interested task.
///
/// The dev server waits on [`GracefulShutdown::wait_for_shutdown_signal`] to
/// stop accepting connections, then tears down the route watcher.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    // Set once by the first trigger; late waiters read it from here.
    reason: Arc<OnceCell<ShutdownReason>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            reason: Arc::new(OnceCell::new()),
        }
    }

    /// Get a receiver for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.reason.get().is_some()
    }

    /// The reason passed to the first [`trigger_shutdown`](Self::trigger_shutdown).
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Start shutdown. Only the first call has an effect.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!("Shutting down: {:?}", reason);
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::debug!("Shutdown already initiated, ignoring {:?}", reason);
        }
    }

    /// Listen for SIGINT / SIGTERM and trigger shutdown on the first one.
    pub async fn run_signal_handler(&self) {
        tracing::debug!("Signal handler started. Listening for SIGTERM and SIGINT");

        let reason = tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                ShutdownReason::Interrupt
            }
            _ = wait_for_sigterm() => ShutdownReason::Terminate,
        };

        self.trigger_shutdown(reason);
    }

    /// Wait for the shutdown signal, returning immediately if it already fired.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        if let Some(reason) = self.reason() {
            return reason;
        }

        match receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => {
                tracing::warn!("Shutdown channel closed unexpectedly");
                ShutdownReason::Force
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // Only Ctrl+C is available
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_creation() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_trigger_reaches_all_subscribers() {
        let shutdown = GracefulShutdown::new();
        let mut receiver1 = shutdown.subscribe();
        let mut receiver2 = shutdown.subscribe();

        shutdown.trigger_shutdown(ShutdownReason::Requested);
        assert!(shutdown.is_shutdown_initiated());

        assert_eq!(receiver1.try_recv().unwrap(), ShutdownReason::Requested);
        assert_eq!(receiver2.try_recv().unwrap(), ShutdownReason::Requested);
    }

    #[tokio::test]
    async fn test_only_first_trigger_is_sent() {
        let shutdown = GracefulShutdown::new();
        let mut receiver = shutdown.subscribe();

        shutdown.trigger_shutdown(ShutdownReason::Interrupt);
        shutdown.trigger_shutdown(ShutdownReason::Terminate);

        assert_eq!(receiver.try_recv().unwrap(), ShutdownReason::Interrupt);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_after_trigger_returns_immediately() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger_shutdown(ShutdownReason::Requested);

        let reason = timeout(Duration::from_secs(1), shutdown.wait_for_shutdown_signal())
            .await
            .unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }

    #[tokio::test]
    async fn test_late_waiter_gets_original_reason() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger_shutdown(ShutdownReason::Terminate);
        shutdown.trigger_shutdown(ShutdownReason::Requested);

        let reason = timeout(Duration::from_secs(1), shutdown.wait_for_shutdown_signal())
            .await
            .unwrap();
        assert_eq!(reason, ShutdownReason::Terminate);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn test_wait_sees_later_trigger() {
        let shutdown = GracefulShutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_shutdown_signal().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger_shutdown(ShutdownReason::Terminate);

        let reason = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert_eq!(reason, ShutdownReason::Terminate);
    }
}
