//! DispatchEndpoint (§4.4): long-lived worker connections, one instance each
//! for scan and review, parameterized by queue type and session bucket.

use domrate_common::Shutdown;
use domrate_common::protocol::{DispatchResponse, TaskRequest};
use domrate_common::types::HasDomainContext;
use domrate_common::wire::{WireError, read_message, write_message};
use domrate_common::{QueueStore, SessionRegistry, WorkerKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

pub async fn run<T>(
    label: &'static str,
    listener: TcpListener,
    queue: Arc<QueueStore<T>>,
    registry: Arc<SessionRegistry>,
    worker_kind: WorkerKind,
    pull_timeout: Duration,
    shutdown: Shutdown,
) where
    T: HasDomainContext + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!(endpoint = label, "dispatch endpoint shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let queue = queue.clone();
                        let registry = registry.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            handle_session(label, stream, addr, queue, registry, worker_kind, pull_timeout, shutdown).await;
                        });
                    }
                    Err(e) => warn!(endpoint = label, error = %e, "dispatch accept failed"),
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_session<T>(
    label: &'static str,
    stream: TcpStream,
    addr: SocketAddr,
    queue: Arc<QueueStore<T>>,
    registry: Arc<SessionRegistry>,
    worker_kind: WorkerKind,
    pull_timeout: Duration,
    shutdown: Shutdown,
) where
    T: HasDomainContext + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    registry.register(worker_kind, addr);
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut last_task: Option<T> = None;

    loop {
        let request: Result<TaskRequest, _> = read_message(&mut reader).await;
        match request {
            Ok(req) if req.is_task_pull() => {}
            Ok(_) => {
                warn!(endpoint = label, "unrecognized dispatch request shape");
                break;
            }
            Err(WireError::Eof) => break,
            Err(e) => {
                warn!(endpoint = label, error = %e, "dispatch protocol violation");
                break;
            }
        }

        // last_task was delivered and acknowledged by reaching the next pull.
        last_task = None;

        let item = loop {
            if !shutdown.is_running() {
                let _ = write_message(&mut write_half, &DispatchResponse::shutdown()).await;
                registry.deregister(worker_kind, addr.port());
                return;
            }
            if let Some(item) = queue.pull(pull_timeout).await {
                break item;
            }
        };

        if write_message(
            &mut write_half,
            &DispatchResponse::task(item.domain(), item.request_id()),
        )
        .await
        .is_err()
        {
            queue.push(item).await;
            registry.deregister(worker_kind, addr.port());
            return;
        }
        last_task = Some(item);
    }

    if let Some(item) = last_task {
        warn!(endpoint = label, "worker dropped before completion notification, requeuing");
        queue.push(item).await;
    }
    registry.deregister(worker_kind, addr.port());
}
