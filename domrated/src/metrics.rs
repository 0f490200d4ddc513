//! Prometheus metrics registered once at process start and scraped at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SCAN_QUEUE_DEPTH: IntGauge =
        IntGauge::new("domrate_scan_queue_depth", "Entries waiting in the scan dispatch queue")
            .expect("metric can be created");
    pub static ref REVIEW_QUEUE_DEPTH: IntGauge =
        IntGauge::new("domrate_review_queue_depth", "Entries waiting in the review dispatch queue")
            .expect("metric can be created");
    pub static ref SCANNER_SESSIONS: IntGauge =
        IntGauge::new("domrate_scanner_sessions", "Connected scanner worker sessions")
            .expect("metric can be created");
    pub static ref REVIEWER_SESSIONS: IntGauge =
        IntGauge::new("domrate_reviewer_sessions", "Connected reviewer worker sessions")
            .expect("metric can be created");
    pub static ref RATING_REQUESTS_TOTAL: IntCounter = IntCounter::new(
        "domrate_rating_requests_total",
        "Rating requests accepted by the rating endpoint"
    )
    .expect("metric can be created");
}

/// Register every metric with the process-wide registry. Idempotent: safe to
/// call more than once (subsequent registrations are ignored).
pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(SCAN_QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(REVIEW_QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(SCANNER_SESSIONS.clone()));
    let _ = REGISTRY.register(Box::new(REVIEWER_SESSIONS.clone()));
    let _ = REGISTRY.register(Box::new(RATING_REQUESTS_TOTAL.clone()));
}

/// Render the current registry in Prometheus text exposition format.
pub fn encode_metrics() -> Result<Vec<u8>, prometheus::Error> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_metrics_produces_prometheus_text_after_registration() {
        register_metrics();
        SCAN_QUEUE_DEPTH.set(3);
        let output = encode_metrics().unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("domrate_scan_queue_depth"));
    }
}
