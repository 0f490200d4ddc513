//! ModuleScheduler (§4.7): dependency-ordered parallel execution of a scan
//! run's module set, with transient/permanent/cascade failure classification
//! and retry hand-off.

use crate::modules::ModuleRegistry;
use chrono::Utc;
use domrate_common::errors::DomRateError;
use domrate_common::persistence::Persistence;
use domrate_common::protocol::Notification;
use domrate_common::queue::QueueStore;
use domrate_common::types::RetryTask;
use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex};
use tracing::{info, warn};

enum Outcome {
    Success,
    Transient(String),
    Permanent(String),
}

/// Mutable state for one in-flight run, guarded by one mutex and condvar
/// (§4.7, §5): the sweep loop and every module-completion callback share it.
struct RunState {
    pending: BTreeSet<String>,
    running: BTreeSet<String>,
    done: BTreeSet<String>,
    failed_transient: BTreeSet<String>,
    failed_permanent: BTreeSet<String>,
    failed_cascade: BTreeSet<String>,
}

pub struct ModuleScheduler {
    registry: Arc<ModuleRegistry>,
    persistence: Arc<dyn Persistence>,
    retry_queue: Arc<QueueStore<RetryTask>>,
    notification_host: String,
    notification_port: u16,
    rerun_counter_max: u32,
    /// Serializes whole runs: only one scan run is ever in flight per
    /// process (§5), so module executions across different requests never
    /// interleave.
    run_lock: tokio::sync::Mutex<()>,
}

impl ModuleScheduler {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        persistence: Arc<dyn Persistence>,
        retry_queue: Arc<QueueStore<RetryTask>>,
        notification_host: String,
        notification_port: u16,
        rerun_counter_max: u32,
    ) -> Self {
        Self {
            registry,
            persistence,
            retry_queue,
            notification_host,
            notification_port,
            rerun_counter_max,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run (or rerun, when `rerun_modules` is given) the module DAG for
    /// `(request_id, domain)` at the given `attempt`.
    pub async fn run(
        &self,
        request_id: u64,
        domain: String,
        attempt: u32,
        rerun_modules: Option<BTreeSet<String>>,
    ) -> Result<(), DomRateError> {
        let _guard = self.run_lock.lock().await;

        let targets = rerun_modules.clone().unwrap_or_else(|| self.registry.all_names());

        if attempt > self.rerun_counter_max {
            warn!(request_id, domain = %domain, attempt, "retry attempts exhausted, expiring run");
            for module in &targets {
                self.insert_error(request_id, module, "Module expired")?;
            }
            return Ok(());
        }

        // A restricted rerun treats every module outside the rerun set as
        // already satisfied (§9 Open Question 1): it only ever targets the
        // prior run's transitive failed_transient set, whose own
        // dependencies all previously reached `done`.
        let done_init: BTreeSet<String> = match &rerun_modules {
            Some(subset) => self.registry.all_names().difference(subset).cloned().collect(),
            None => BTreeSet::new(),
        };

        let registry = self.registry.clone();
        let persistence = self.persistence.clone();
        let domain_for_run = domain.clone();
        let final_state = tokio::task::spawn_blocking(move || {
            run_to_completion(registry, persistence, request_id, domain_for_run, attempt, targets, done_init)
        })
        .await
        .map_err(|e| DomRateError::Internal {
            detail: format!("scheduler run task panicked: {e}"),
        })?;

        self.finish_run(request_id, domain, attempt, final_state).await
    }

    async fn finish_run(
        &self,
        request_id: u64,
        domain: String,
        attempt: u32,
        mut state: RunState,
    ) -> Result<(), DomRateError> {
        // Step 5: fixpoint pass promoting transient modules whose dependency
        // turned out to be (or cascade from) a permanent failure.
        loop {
            let mut promoted = Vec::new();
            for name in &state.failed_transient {
                let deps = self.registry.get(name).map(|m| m.dependencies_set()).unwrap_or_default();
                if !deps.is_disjoint(&state.failed_permanent) || !deps.is_disjoint(&state.failed_cascade) {
                    promoted.push(name.clone());
                }
            }
            if promoted.is_empty() {
                break;
            }
            for name in promoted {
                state.failed_transient.remove(&name);
                state.failed_cascade.insert(name);
            }
        }

        for module in &state.failed_cascade {
            self.insert_error(request_id, module, "Module depends on finally failed module")?;
        }

        if !state.failed_transient.is_empty() {
            let retry_task = RetryTask {
                request_id,
                domain: domain.clone(),
                attempt: attempt + 1,
                rerun_modules: state.failed_transient.clone(),
                enqueued_at: Utc::now(),
            };
            info!(
                request_id,
                domain = %domain,
                attempt = retry_task.attempt,
                rerun_modules = ?retry_task.rerun_modules,
                "run produced transient failures, queued for retry"
            );
            self.retry_queue.push(retry_task).await;
            return Ok(());
        }

        info!(request_id, domain = %domain, "scan run complete, notifying coordinator");
        if let Err(e) = domrate_common::notify_client::send_notification(
            &self.notification_host,
            self.notification_port,
            &Notification::scan_finished(domain, request_id),
        )
        .await
        {
            warn!(request_id, error = %e, "failed to deliver scan-finished notification");
        }
        Ok(())
    }

    fn insert_error(&self, request_id: u64, module: &str, comment: &str) -> Result<(), DomRateError> {
        self.persistence
            .insert_error(request_id, module, comment)
            .map_err(|e| DomRateError::Persistence { detail: e.to_string() })
    }
}

/// The blocking mutex/condvar rendezvous of §4.7, run on its own
/// `spawn_blocking` task. Each ready module executes on its own OS thread so
/// dependency-independent modules genuinely run concurrently; the inner loop
/// sweeps `pending` to a fixpoint before waiting so a multi-level cascade
/// (one module's failure unblocking another's classification) resolves
/// within the same wakeup instead of needing an extra round trip.
#[allow(clippy::too_many_arguments)]
fn run_to_completion(
    registry: Arc<ModuleRegistry>,
    persistence: Arc<dyn Persistence>,
    request_id: u64,
    domain: String,
    attempt: u32,
    targets: BTreeSet<String>,
    done_init: BTreeSet<String>,
) -> RunState {
    let state = Arc::new(Mutex::new(RunState {
        pending: targets,
        running: BTreeSet::new(),
        done: done_init,
        failed_transient: BTreeSet::new(),
        failed_permanent: BTreeSet::new(),
        failed_cascade: BTreeSet::new(),
    }));
    let condvar = Arc::new(Condvar::new());
    let mut handles: Vec<std::thread::JoinHandle<()>> = Vec::new();

    {
        let mut guard = state.lock().expect("scheduler state mutex poisoned");
        loop {
            loop {
                let mut changed = false;
                let snapshot: Vec<String> = guard.pending.iter().cloned().collect();
                for name in snapshot {
                    let Some(module) = registry.get(&name) else { continue };
                    let deps = module.dependencies_set();
                    if deps.is_subset(&guard.done) {
                        guard.pending.remove(&name);
                        guard.running.insert(name.clone());
                        changed = true;

                        let state = state.clone();
                        let condvar = condvar.clone();
                        let persistence = persistence.clone();
                        let domain = domain.clone();
                        handles.push(std::thread::spawn(move || {
                            let outcome = match module.run(persistence.as_ref(), request_id, &domain, attempt) {
                                Ok(()) => Outcome::Success,
                                Err(e) if e.rerun => Outcome::Transient(e.message),
                                Err(e) => Outcome::Permanent(e.message),
                            };
                            if let Outcome::Transient(ref msg) | Outcome::Permanent(ref msg) = outcome {
                                if let Err(e) = persistence.insert_error(request_id, &name, msg) {
                                    warn!(request_id, module = %name, error = %e, "failed to record module error");
                                }
                            }
                            let mut guard = state.lock().expect("scheduler state mutex poisoned");
                            guard.running.remove(&name);
                            match outcome {
                                Outcome::Success => {
                                    guard.done.insert(name);
                                }
                                Outcome::Transient(_) => {
                                    guard.failed_transient.insert(name);
                                }
                                Outcome::Permanent(_) => {
                                    guard.failed_permanent.insert(name);
                                }
                            }
                            drop(guard);
                            condvar.notify_all();
                        }));
                    } else if !deps.is_disjoint(&guard.failed_permanent) || !deps.is_disjoint(&guard.failed_cascade) {
                        guard.pending.remove(&name);
                        guard.failed_cascade.insert(name);
                        changed = true;
                    } else if !deps.is_disjoint(&guard.failed_transient) {
                        guard.pending.remove(&name);
                        guard.failed_transient.insert(name);
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            if guard.pending.is_empty() && guard.running.is_empty() {
                break;
            }
            guard = condvar.wait(guard).expect("scheduler state mutex poisoned");
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    Arc::try_unwrap(state)
        .ok()
        .expect("no outstanding references after every worker thread joined")
        .into_inner()
        .expect("scheduler state mutex poisoned")
}
