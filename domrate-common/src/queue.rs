//! Generic FIFO queue with crash-safe snapshot-to-file and restore-on-startup.
//!
//! Used for the coordinator's `scan_queue`/`review_queue` (entries are
//! [`crate::types::ScanTask`]/[`crate::types::ReviewTask`]) and for the
//! scanner's retry queue (entries are [`crate::types::RetryTask`]). The type
//! itself is agnostic to which: it only requires `Serialize`/`DeserializeOwned`
//! for the snapshot format and a caller-supplied validator to decide which
//! restored entries are still live.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::warn;

/// A restore-time validity check over a raw parsed entry. Boxed so callers
/// can close over `&Persistence` (and, for retry entries, `&ModuleRegistry`)
/// without the queue type needing to know about either.
pub type SnapshotValidator<'a, T> = dyn Fn(&T) -> bool + Send + Sync + 'a;

pub struct QueueStore<T> {
    inner: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> Default for QueueStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueueStore<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Push to the tail. Used both for brand-new work and for requeue-on-drop,
    /// which is why a requeued task loses its original position (documented
    /// behavior: push-order is preserved only in the absence of drops).
    pub async fn push(&self, item: T) {
        let mut guard = self.inner.lock().await;
        guard.push_back(item);
        drop(guard);
        self.notify.notify_one();
    }

    /// Pop the head, waiting up to `timeout` for an item to arrive. Returns
    /// `None` on timeout so a caller's poll loop can re-check its shutdown
    /// flag instead of blocking indefinitely.
    pub async fn pull(&self, timeout: Duration) -> Option<T> {
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.pop_front() {
                    return Some(item);
                }
            }
            let notified = self.notify.notified();
            if tokio::time::timeout(timeout, notified).await.is_err() {
                return None;
            }
        }
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Pop the head without waiting. Used by the retry watchdog, which needs
    /// to take a fixed-size pass over the queue rather than block on it.
    pub async fn try_pull(&self) -> Option<T> {
        self.inner.lock().await.pop_front()
    }
}

impl<T: Serialize> QueueStore<T> {
    /// Write one JSON object per line to `path`, draining the queue in the
    /// process. Intended for the shutdown path only.
    pub async fn snapshot(&self, path: &Path) -> io::Result<usize> {
        let mut guard = self.inner.lock().await;
        let mut out = String::new();
        for item in guard.iter() {
            out.push_str(&serde_json::to_string(item).expect("queue entries are always JSON-serializable"));
            out.push('\n');
        }
        tokio::fs::write(path, out).await?;
        let count = guard.len();
        guard.clear();
        Ok(count)
    }
}

impl<T: DeserializeOwned> QueueStore<T> {
    /// Parse `path` line by line, push every entry that `validator` accepts,
    /// log-and-drop the rest, then delete the file. A missing file is not an
    /// error: a coordinator that never shut down cleanly simply has nothing
    /// to restore.
    pub async fn restore(
        &self,
        path: &Path,
        validator: &SnapshotValidator<'_, T>,
    ) -> io::Result<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let contents = tokio::fs::read_to_string(path).await?;
        let mut restored = 0usize;
        let mut guard = self.inner.lock().await;
        for (line_no, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(line) {
                Ok(entry) => {
                    if validator(&entry) {
                        guard.push_back(entry);
                        restored += 1;
                    } else {
                        warn!(snapshot = %path.display(), line = line_no + 1, "dropping invalidated snapshot entry");
                    }
                }
                Err(e) => {
                    warn!(snapshot = %path.display(), line = line_no + 1, error = %e, "dropping unparseable snapshot entry");
                }
            }
        }
        drop(guard);
        if restored > 0 {
            self.notify.notify_waiters();
        }
        tokio::fs::remove_file(path).await?;
        Ok(restored)
    }
}
