//! Thread-safe registry of connected dispatch workers, keyed by remote port.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Scanner,
    Reviewer,
}

#[derive(Debug, Clone)]
pub struct WorkerSession {
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Process-wide singleton mapping remote port → session, one bucket per
/// [`WorkerKind`]. A single mutex guards both buckets; call volume is low
/// enough that finer-grained locking buys nothing.
#[derive(Default)]
pub struct SessionRegistry {
    scanners: Mutex<HashMap<u16, WorkerSession>>,
    reviewers: Mutex<HashMap<u16, WorkerSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, kind: WorkerKind) -> &Mutex<HashMap<u16, WorkerSession>> {
        match kind {
            WorkerKind::Scanner => &self.scanners,
            WorkerKind::Reviewer => &self.reviewers,
        }
    }

    pub fn register(&self, kind: WorkerKind, remote_addr: SocketAddr) {
        let mut bucket = self.bucket(kind).lock().unwrap();
        bucket.insert(
            remote_addr.port(),
            WorkerSession { remote_addr, connected_at: Utc::now() },
        );
    }

    pub fn deregister(&self, kind: WorkerKind, port: u16) {
        self.bucket(kind).lock().unwrap().remove(&port);
    }

    pub fn count(&self, kind: WorkerKind) -> usize {
        self.bucket(kind).lock().unwrap().len()
    }

    pub fn sessions(&self, kind: WorkerKind) -> Vec<(u16, WorkerSession)> {
        self.bucket(kind)
            .lock()
            .unwrap()
            .iter()
            .map(|(port, session)| (*port, session.clone()))
            .collect()
    }
}
