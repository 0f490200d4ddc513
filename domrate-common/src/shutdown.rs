//! Coordinated graceful stop: stop accepting, drain, snapshot queues, close
//! persistence, remove the PID file. Shared by the coordinator and both
//! worker binaries, which all run the same accept-loop-plus-background-task
//! shape.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Clone)]
pub struct Shutdown {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip the shared flag false and wake every task waiting on it.
    pub fn trigger(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolve once `trigger` has been called. Used in `tokio::select!`
    /// alongside `listener.accept()` so an accept loop doesn't have to wait
    /// for a new connection before noticing shutdown.
    pub async fn notified(&self) {
        if !self.is_running() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_a_pending_notified_waiter() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("notified() should resolve after trigger")
            .unwrap();
    }

    #[tokio::test]
    async fn notified_returns_immediately_if_already_triggered() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        tokio::time::timeout(Duration::from_millis(50), shutdown.notified())
            .await
            .expect("notified() should not block once already triggered");
    }
}
