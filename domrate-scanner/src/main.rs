//! Scanner worker binary: pulls ScanTasks from the coordinator's dispatch
//! endpoint, runs the module DAG via [`scheduler::ModuleScheduler`], and
//! reports completion to the coordinator's notification endpoint.

mod config;
mod modules;
mod retry;
mod scheduler;

use clap::Parser;
use config::ScannerConfig;
use domrate_common::types::RetryTask;
use domrate_common::{DispatchClient, JsonlPersistence, Persistence, Pulled, QueueStore, Shutdown};
use modules::ModuleRegistry;
use scheduler::ModuleScheduler;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "domrate-scanner", about = "Domain rating scanner worker")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON instead of human-readable text.
    #[arg(long)]
    json_logs: bool,

    /// Override the scan dispatch host to connect to.
    #[arg(long)]
    dispatch_host: Option<String>,

    /// Override the scan dispatch port to connect to.
    #[arg(long)]
    dispatch_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    domrate_common::logging::init(cli.verbose, cli.json_logs);

    let mut config = ScannerConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.dispatch_host {
        config.scan_dispatch_host = host;
    }
    if let Some(port) = cli.dispatch_port {
        config.scan_dispatch_port = port;
    }
    let config = Arc::new(config);
    info!(
        dispatch_host = %config.scan_dispatch_host,
        dispatch_port = config.scan_dispatch_port,
        notification_port = config.notification_port,
        "scanner starting"
    );

    let _pid_file = domrate_common::pidfile::PidFile::create(config.pid_file.clone())?;

    let persistence: Arc<dyn Persistence> = Arc::new(JsonlPersistence::open(&config.persistence_journal_path)?);

    let norun: BTreeSet<String> = config.norun.iter().cloned().collect();
    let registry = Arc::new(ModuleRegistry::with_builtins(&norun)?);
    registry.reconcile_versions(persistence.as_ref())?;
    info!(modules = registry.all_names().len(), "module registry ready");

    let retry_queue = Arc::new(QueueStore::<RetryTask>::new());
    {
        let registry = registry.clone();
        let persistence = persistence.clone();
        let request_expiration_days = config.request_expiration_days;
        let validator: &domrate_common::queue::SnapshotValidator<'_, RetryTask> = &move |task: &RetryTask| {
            let age_days = (chrono::Utc::now() - task.enqueued_at).num_days();
            if age_days >= i64::from(request_expiration_days) {
                return false;
            }
            if !task.rerun_modules.iter().all(|m| registry.contains(m)) {
                return false;
            }
            persistence.is_request_valid(task.request_id, &task.domain).unwrap_or(false)
        };
        let restored = retry_queue.restore(&config.retry_queue_snapshot_path, validator).await?;
        info!(restored, "retry queue restored from snapshot");
    }

    let shutdown = Shutdown::new();

    let scheduler = Arc::new(ModuleScheduler::new(
        registry,
        persistence.clone(),
        retry_queue.clone(),
        config.notification_host.clone(),
        config.notification_port,
        config.rerun_counter_max,
    ));

    let watchdog_task = tokio::spawn(retry::run(
        config.clone(),
        retry_queue.clone(),
        scheduler.clone(),
        shutdown.clone(),
    ));

    let dispatch_task = tokio::spawn(dispatch_loop(config.clone(), scheduler.clone(), shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining scanner");
    shutdown.trigger();

    for task in [watchdog_task, dispatch_task] {
        if let Err(e) = task.await {
            error!(error = %e, "scanner background task panicked");
        }
    }

    let retried_snapshotted = retry_queue.snapshot(&config.retry_queue_snapshot_path).await?;
    info!(retried_snapshotted, "retry queue snapshotted, shutting down");

    Ok(())
}

/// Maintains one persistent connection to the scan dispatch endpoint,
/// running each pulled task to completion before asking for the next
/// (§4.4: the next pull is itself the prior task's acknowledgement).
async fn dispatch_loop(config: Arc<ScannerConfig>, scheduler: Arc<ModuleScheduler>, shutdown: Shutdown) {
    while shutdown.is_running() {
        let mut client = match DispatchClient::connect(&config.scan_dispatch_host, config.scan_dispatch_port).await {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "failed to connect to scan dispatch, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => continue,
                    _ = shutdown.notified() => return,
                }
            }
        };

        loop {
            if !shutdown.is_running() {
                return;
            }
            let pulled = tokio::select! {
                pulled = client.pull() => pulled,
                _ = shutdown.notified() => return,
            };
            match pulled {
                Ok(Pulled::Task(task)) => {
                    if let Err(e) = scheduler.run(task.request_id, task.domain.clone(), 1, None).await {
                        error!(request_id = task.request_id, domain = %task.domain, error = %e, "scan run failed");
                    }
                }
                Ok(Pulled::Shutdown) => return,
                Err(e) => {
                    warn!(error = %e, "dispatch connection lost, reconnecting");
                    break;
                }
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
