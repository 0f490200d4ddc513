//! RatingEndpoint (§4.3): one-shot request/response, cache-or-enqueue policy.

use domrate_common::Shutdown;
use chrono::{DateTime, Utc};
use domrate_common::wire::{WireError, read_message, write_message};
use domrate_common::protocol::{RatingRequest, RatingResponse};
use domrate_common::types::{Access, Domain, ScanTask};
use domrate_common::{Persistence, QueueStore};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct RatingEndpointConfig {
    pub domain_expiration_days: u32,
    pub request_expiration_days: u32,
}

/// `now - timestamp` in whole days is strictly less than `expiration_days`.
/// Boundary is exclusive per §8: `timedelta.days < expiration` is "fresh".
fn is_fresh(timestamp: DateTime<Utc>, expiration_days: u32) -> bool {
    let age_days = (Utc::now() - timestamp).num_days();
    age_days < i64::from(expiration_days)
}

pub async fn run(
    listener: TcpListener,
    persistence: Arc<dyn Persistence>,
    scan_queue: Arc<QueueStore<ScanTask>>,
    config: Arc<RatingEndpointConfig>,
    shutdown: Shutdown,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => {
                info!("rating endpoint shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let persistence = persistence.clone();
                        let scan_queue = scan_queue.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, persistence, scan_queue, config).await {
                                warn!(error = %e, "rating connection ended with an error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "rating endpoint accept failed"),
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    persistence: Arc<dyn Persistence>,
    scan_queue: Arc<QueueStore<ScanTask>>,
    config: Arc<RatingEndpointConfig>,
) -> Result<(), WireError> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let request: Result<RatingRequest, _> = read_message(&mut reader).await;
    let request = match request {
        Ok(req) => req,
        Err(WireError::Eof) => return Ok(()),
        Err(_) => {
            write_message(&mut write_half, &RatingResponse::invalid_request()).await?;
            return Ok(());
        }
    };

    let domain_name = Domain::normalize_name(request.domain());
    if domain_name.is_empty() {
        write_message(&mut write_half, &RatingResponse::invalid_request()).await?;
        return Ok(());
    }

    if !domrate_common::dns::resolves(&domain_name).await {
        write_message(&mut write_half, &RatingResponse::invalid_domain()).await?;
        return Ok(());
    }

    crate::metrics::RATING_REQUESTS_TOTAL.inc();

    match persistence.find_domain(&domain_name) {
        Ok(Some(domain)) => {
            write_message(
                &mut write_half,
                &RatingResponse::verdict(&domain_name, domain.state, domain.comment.clone()),
            )
            .await?;
            maybe_enqueue_for_existing_domain(&persistence, &scan_queue, &config, &domain).await;
        }
        Ok(None) => {
            write_message(
                &mut write_half,
                &RatingResponse::verdict(&domain_name, Access::Permitted, None),
            )
            .await?;
            enqueue_new_domain(&persistence, &scan_queue, &domain_name).await;
        }
        Err(e) => {
            warn!(error = %e, domain = %domain_name, "persistence lookup failed");
            write_message(&mut write_half, &RatingResponse::invalid_request()).await?;
        }
    }

    Ok(())
}

async fn maybe_enqueue_for_existing_domain(
    persistence: &Arc<dyn Persistence>,
    scan_queue: &Arc<QueueStore<ScanTask>>,
    config: &RatingEndpointConfig,
    domain: &Domain,
) {
    let domain_fresh = is_fresh(domain.updated_at, config.domain_expiration_days);
    let latest_request = persistence.latest_request_for(domain.id).ok().flatten();
    let request_fresh = latest_request
        .as_ref()
        .is_some_and(|r| is_fresh(r.created_at, config.request_expiration_days));

    if domain_fresh && request_fresh {
        return;
    }

    if let Ok(request_id) = persistence.insert_request(domain.id) {
        scan_queue
            .push(ScanTask { request_id, domain: domain.name.clone() })
            .await;
    }
}

async fn enqueue_new_domain(
    persistence: &Arc<dyn Persistence>,
    scan_queue: &Arc<QueueStore<ScanTask>>,
    domain_name: &str,
) {
    let Ok(domain_id) = persistence.insert_domain(domain_name) else {
        warn!(domain = %domain_name, "failed to insert new domain row");
        return;
    };
    let Ok(request_id) = persistence.insert_request(domain_id) else {
        warn!(domain = %domain_name, "failed to insert request row");
        return;
    };
    scan_queue
        .push(ScanTask { request_id, domain: domain_name.to_string() })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn fresh_boundary_is_strict_inequality() {
        let now = Utc::now();
        assert!(is_fresh(now, 1));
        let exactly_one_day_old = now - ChronoDuration::days(1);
        assert!(!is_fresh(exactly_one_day_old, 1));
        let just_under_one_day = now - ChronoDuration::hours(23);
        assert!(is_fresh(just_under_one_day, 1));
    }

    #[test]
    fn zero_expiration_is_never_fresh() {
        assert!(!is_fresh(Utc::now(), 0));
    }

    mod proptest_boundary {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn matches_strict_inequality_on_whole_day_age(
                age_days in 0i64..3650,
                expiration_days in 0u32..3650,
            ) {
                let timestamp = Utc::now() - ChronoDuration::days(age_days) - ChronoDuration::hours(1);
                let fresh = is_fresh(timestamp, expiration_days);
                prop_assert_eq!(fresh, age_days < i64::from(expiration_days));
            }

            #[test]
            fn exactly_on_a_day_boundary_is_never_fresh_for_that_expiration(
                boundary_days in 1u32..3650,
            ) {
                let timestamp = Utc::now() - ChronoDuration::days(i64::from(boundary_days));
                prop_assert!(!is_fresh(timestamp, boundary_days));
            }

            #[test]
            fn just_under_a_day_boundary_is_fresh_for_that_expiration(
                boundary_days in 1u32..3650,
            ) {
                let timestamp = Utc::now() - ChronoDuration::days(i64::from(boundary_days) - 1) - ChronoDuration::hours(1);
                prop_assert!(is_fresh(timestamp, boundary_days));
            }
        }
    }
}
