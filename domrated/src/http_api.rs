//! HTTP surface for observability: Prometheus metrics and a liveness probe.
//! Only bound when `metrics_port` is configured.

use crate::metrics;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
    Json,
};
use domrate_common::{QueueStore, SessionRegistry, WorkerKind};
use domrate_common::types::{ReviewTask, ScanTask};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct HttpState {
    pub scan_queue: Arc<QueueStore<ScanTask>>,
    pub review_queue: Arc<QueueStore<ReviewTask>>,
    pub sessions: Arc<SessionRegistry>,
    pub started_at: Instant,
    pub pid: u32,
}

pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::new(state))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "pid": state.pid,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    metrics::SCAN_QUEUE_DEPTH.set(state.scan_queue.size().await as i64);
    metrics::REVIEW_QUEUE_DEPTH.set(state.review_queue.size().await as i64);
    metrics::SCANNER_SESSIONS.set(state.sessions.count(WorkerKind::Scanner) as i64);
    metrics::REVIEWER_SESSIONS.set(state.sessions.count(WorkerKind::Reviewer) as i64);

    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

pub async fn start_server(
    port: u16,
    state: HttpState,
) -> tokio::task::JoinHandle<Result<(), std::io::Error>> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(port, "starting observability http server");

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_test_state() -> HttpState {
        HttpState {
            scan_queue: Arc::new(QueueStore::new()),
            review_queue: Arc::new(QueueStore::new()),
            sessions: Arc::new(SessionRegistry::new()),
            started_at: Instant::now(),
            pid: 4242,
        }
    }

    #[tokio::test]
    async fn health_reports_pid_and_uptime() {
        let router = create_router(make_test_state());
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["pid"], 4242);
    }

    #[tokio::test]
    async fn metrics_reflects_current_queue_depth() {
        let state = make_test_state();
        state.scan_queue.push(ScanTask { request_id: 1, domain: "a.test".into() }).await;
        let router = create_router(state);
        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("domrate_scan_queue_depth 1"));
    }
}
