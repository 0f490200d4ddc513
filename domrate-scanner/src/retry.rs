//! RetryQueue + Watchdog (§4.8): a FIFO of [`RetryTask`]s polled at
//! `rerun_queue_check_delay` intervals. A head entry whose backoff threshold
//! hasn't elapsed is re-appended to the tail; once it has, the Watchdog
//! invokes the scheduler with the restricted module set.

use crate::config::ScannerConfig;
use crate::scheduler::ModuleScheduler;
use chrono::Utc;
use domrate_common::Shutdown;
use domrate_common::queue::QueueStore;
use domrate_common::types::RetryTask;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub type RetryQueue = QueueStore<RetryTask>;

/// Sweeps `queue` once per `check_delay`, re-running any entry whose
/// per-attempt backoff has elapsed and re-appending the rest.
///
/// A full pass pulls at most `queue.size()` entries at the moment the tick
/// starts, so a task re-appended to the tail during the same tick is not
/// re-examined until the next one (bounded per §9's "fixed-size pass").
pub async fn run(config: Arc<ScannerConfig>, queue: Arc<RetryQueue>, scheduler: Arc<ModuleScheduler>, shutdown: Shutdown) {
    loop {
        if !shutdown.is_running() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.rerun_queue_check_delay) => {}
            _ = shutdown.notified() => return,
        }

        let pending = queue.size().await;
        for _ in 0..pending {
            let Some(task) = queue.try_pull().await else { break };
            let threshold_minutes = config.threshold_for_attempt(task.attempt);
            let elapsed = Utc::now().signed_duration_since(task.enqueued_at);
            if elapsed < chrono::Duration::minutes(threshold_minutes as i64) {
                queue.push(task).await;
                continue;
            }

            info!(
                request_id = task.request_id,
                domain = %task.domain,
                attempt = task.attempt,
                rerun_modules = ?task.rerun_modules,
                "retry threshold elapsed, rerunning modules"
            );
            let scheduler = scheduler.clone();
            if let Err(e) = scheduler
                .run(task.request_id, task.domain.clone(), task.attempt, Some(task.rerun_modules.clone()))
                .await
            {
                warn!(request_id = task.request_id, domain = %task.domain, error = %e, "retry run failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{Module, ModuleRegistry, QueryKind};
    use domrate_common::errors::ModuleError;
    use domrate_common::persistence::Persistence;
    use domrate_common::JsonlPersistence;
    use std::collections::BTreeSet;

    struct AlwaysOk(&'static str);
    impl Module for AlwaysOk {
        fn name(&self) -> &'static str {
            self.0
        }
        fn version(&self) -> u64 {
            1
        }
        fn dependencies(&self) -> &'static [&'static str] {
            &[]
        }
        fn queries(&self, _kind: QueryKind) -> Vec<String> {
            vec![]
        }
        fn run(&self, _p: &dyn Persistence, _r: u64, _d: &str, _a: u32) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn test_config() -> Arc<ScannerConfig> {
        let mut cfg = ScannerConfig::load(None).unwrap();
        cfg.rerun_queue_check_delay = Duration::from_millis(10);
        cfg.rerun_thresholds = vec![0];
        Arc::new(cfg)
    }

    #[tokio::test]
    async fn elapsed_entry_is_rerun_and_drained() {
        let dir = tempfile::tempdir().unwrap();
        let persistence: Arc<dyn Persistence> =
            Arc::new(JsonlPersistence::open(dir.path().join("journal.jsonl")).unwrap());
        let registry = Arc::new(ModuleRegistry::new(vec![Arc::new(AlwaysOk("A"))], &BTreeSet::new()).unwrap());
        let retry_queue = Arc::new(RetryQueue::new());
        let scheduler = Arc::new(ModuleScheduler::new(
            registry,
            persistence.clone(),
            retry_queue.clone(),
            "127.0.0.1".to_string(),
            1,
            10,
        ));
        let config = test_config();

        retry_queue
            .push(RetryTask {
                request_id: 1,
                domain: "example.com".to_string(),
                attempt: 2,
                rerun_modules: BTreeSet::from(["A".to_string()]),
                enqueued_at: Utc::now() - chrono::Duration::minutes(5),
            })
            .await;

        let shutdown = Shutdown::new();
        let shutdown_for_task = shutdown.clone();
        let task = tokio::spawn(run(config, retry_queue.clone(), scheduler, shutdown_for_task));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();
        let _ = task.await;

        assert_eq!(retry_queue.size().await, 0);
    }
}
