//! NotificationEndpoint (§4.5): one-shot, one-way scan/review completion
//! notifications. Never writes a reply; invalid messages are logged and
//! discarded.

use domrate_common::Shutdown;
use domrate_common::protocol::Notification;
use domrate_common::types::{Access, RequestState, ReviewTask};
use domrate_common::wire::{WireError, read_message};
use domrate_common::{Persistence, QueueStore};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub async fn run(
    listener: TcpListener,
    persistence: Arc<dyn Persistence>,
    review_queue: Arc<QueueStore<ReviewTask>>,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!("notification endpoint shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let persistence = persistence.clone();
                        let review_queue = review_queue.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, persistence, review_queue).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "notification accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    persistence: Arc<dyn Persistence>,
    review_queue: Arc<QueueStore<ReviewTask>>,
) {
    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let message: Result<Notification, _> = read_message(&mut reader).await;
    let message = match message {
        Ok(m) => m,
        Err(WireError::Eof) => return,
        Err(e) => {
            warn!(error = %e, "discarding malformed notification");
            return;
        }
    };

    match message {
        Notification::Scan { notification } => handle_scan_finished(&persistence, &review_queue, notification.scan).await,
        Notification::Review { notification } => handle_review_finished(&persistence, notification.review).await,
    }
}

async fn handle_scan_finished(
    persistence: &Arc<dyn Persistence>,
    review_queue: &Arc<QueueStore<ReviewTask>>,
    body: domrate_common::protocol::ScanNotificationBody,
) {
    match persistence.is_request_valid(body.request_id, &body.domain) {
        Ok(true) => {
            if let Err(e) =
                persistence.update_request(body.request_id, RequestState::Scanned, Some(String::new()))
            {
                warn!(error = %e, "failed to mark request scanned");
                return;
            }
            review_queue
                .push(ReviewTask { request_id: body.request_id, domain: body.domain })
                .await;
        }
        Ok(false) => warn!(
            request_id = body.request_id,
            domain = %body.domain,
            "discarding scan-finished notification for unknown request"
        ),
        Err(e) => warn!(error = %e, "persistence validation failed"),
    }
}

async fn handle_review_finished(
    persistence: &Arc<dyn Persistence>,
    body: domrate_common::protocol::ReviewNotificationBody,
) {
    let access = match body.access.as_str() {
        "permitted" => Access::Permitted,
        "denied" => Access::Denied,
        other => {
            warn!(access = %other, "discarding review notification with unknown access value");
            return;
        }
    };
    let request_state = match access {
        Access::Permitted => RequestState::Permitted,
        Access::Denied => RequestState::Denied,
    };

    match persistence.is_request_valid(body.request_id, &body.domain) {
        Ok(true) => {
            let comment = Some(body.comment_or_empty().to_string());
            if let Err(e) = persistence.update_request(body.request_id, request_state, comment.clone()) {
                warn!(error = %e, "failed to update request on review notification");
                return;
            }
            if let Err(e) = persistence.update_domain(&body.domain, access, comment) {
                warn!(error = %e, "failed to update domain on review notification");
            }
        }
        Ok(false) => warn!(
            request_id = body.request_id,
            domain = %body.domain,
            "discarding review-finished notification for unknown request"
        ),
        Err(e) => warn!(error = %e, "persistence validation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domrate_common::JsonlPersistence;
    use domrate_common::queue::QueueStore;
    use tempfile::tempdir;

    fn open_persistence() -> (JsonlPersistence, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        (JsonlPersistence::open(&path).unwrap(), dir)
    }

    #[tokio::test]
    async fn scan_finished_marks_scanned_and_enqueues_review() {
        let (persistence, _dir): (JsonlPersistence, _) = open_persistence();
        let persistence: Arc<dyn Persistence> = Arc::new(persistence);
        let review_queue = Arc::new(QueueStore::<ReviewTask>::new());

        let domain_id = persistence.insert_domain("example.com").unwrap();
        let request_id = persistence.insert_request(domain_id).unwrap();

        handle_scan_finished(
            &persistence,
            &review_queue,
            domrate_common::protocol::ScanNotificationBody {
                domain: "example.com".to_string(),
                request_id,
            },
        )
        .await;

        let request = persistence.get_request(request_id).unwrap().unwrap();
        assert_eq!(request.state, RequestState::Scanned);
        assert_eq!(review_queue.size().await, 1);
    }

    #[tokio::test]
    async fn scan_finished_for_unknown_request_is_discarded() {
        let (persistence, _dir): (JsonlPersistence, _) = open_persistence();
        let persistence: Arc<dyn Persistence> = Arc::new(persistence);
        let review_queue = Arc::new(QueueStore::<ReviewTask>::new());

        handle_scan_finished(
            &persistence,
            &review_queue,
            domrate_common::protocol::ScanNotificationBody {
                domain: "example.com".to_string(),
                request_id: 999,
            },
        )
        .await;

        assert_eq!(review_queue.size().await, 0);
    }

    #[tokio::test]
    async fn review_finished_updates_request_and_domain() {
        let (persistence, _dir): (JsonlPersistence, _) = open_persistence();
        let persistence: Arc<dyn Persistence> = Arc::new(persistence);

        let domain_id = persistence.insert_domain("bad.test").unwrap();
        let request_id = persistence.insert_request(domain_id).unwrap();

        handle_review_finished(
            &persistence,
            domrate_common::protocol::ReviewNotificationBody {
                domain: "bad.test".to_string(),
                request_id,
                access: "denied".to_string(),
                comment: Some("malware".to_string()),
            },
        )
        .await;

        let request = persistence.get_request(request_id).unwrap().unwrap();
        assert_eq!(request.state, RequestState::Denied);
        assert_eq!(request.comment.as_deref(), Some("malware"));

        let domain = persistence.find_domain("bad.test").unwrap().unwrap();
        assert_eq!(domain.state, Access::Denied);
        assert_eq!(domain.comment.as_deref(), Some("malware"));
    }

    #[tokio::test]
    async fn review_finished_with_unknown_access_is_discarded() {
        let (persistence, _dir): (JsonlPersistence, _) = open_persistence();
        let persistence: Arc<dyn Persistence> = Arc::new(persistence);

        let domain_id = persistence.insert_domain("example.com").unwrap();
        let request_id = persistence.insert_request(domain_id).unwrap();

        handle_review_finished(
            &persistence,
            domrate_common::protocol::ReviewNotificationBody {
                domain: "example.com".to_string(),
                request_id,
                access: "maybe".to_string(),
                comment: None,
            },
        )
        .await;

        let request = persistence.get_request(request_id).unwrap().unwrap();
        assert_eq!(request.state, RequestState::Queued);
    }
}
