//! Ctrl+C handling for recording runs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::debug;

/// Shutdown request raised by Ctrl+C
#[derive(Clone)]
pub struct ShutdownSignal {
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self {
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Mark shutdown requested and wake waiters
    pub fn trigger(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }

    /// Listen for Ctrl+C in the background
    pub fn setup(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    debug!("received interrupt");
                    signal.trigger();
                }
                Err(e) => debug!(error = %e, "cannot listen for interrupts"),
            }
        });
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
