//! Coordinator binary: hosts the rating, scan-dispatch, review-dispatch and
//! notification endpoints, plus an optional observability HTTP surface.

mod config;
mod endpoints;
mod http_api;
mod metrics;

use clap::Parser;
use config::CoordinatorConfig;
use domrate_common::types::{ReviewTask, ScanTask};
use domrate_common::{JsonlPersistence, Persistence, QueueStore, SessionRegistry};
use domrate_common::Shutdown;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "domrated", about = "Domain rating coordinator")]
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
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    domrate_common::logging::init(cli.verbose, cli.json_logs);

    let config = CoordinatorConfig::load(cli.config.as_deref())?;
    info!(
        rating_port = config.rating_port,
        scan_dispatch_port = config.scan_dispatch_port,
        notification_port = config.notification_port,
        review_dispatch_port = config.review_dispatch_port,
        "coordinator starting"
    );

    let _pid_file = domrate_common::pidfile::PidFile::create(config.pid_file.clone())?;

    let persistence: Arc<dyn Persistence> = Arc::new(JsonlPersistence::open(&config.persistence_journal_path)?);
    let scan_queue: Arc<QueueStore<ScanTask>> = Arc::new(QueueStore::new());
    let review_queue: Arc<QueueStore<ReviewTask>> = Arc::new(QueueStore::new());
    let sessions = Arc::new(SessionRegistry::new());

    {
        let persistence = persistence.clone();
        let validator: &domrate_common::SnapshotValidator<'_, ScanTask> =
            &|task: &ScanTask| persistence.is_request_valid(task.request_id, &task.domain).unwrap_or(false);
        let restored = scan_queue.restore(&config.scan_queue_snapshot_path, validator).await?;
        info!(restored, "scan queue restored from snapshot");
    }
    {
        let persistence = persistence.clone();
        let validator: &domrate_common::SnapshotValidator<'_, ReviewTask> =
            &|task: &ReviewTask| persistence.is_request_valid(task.request_id, &task.domain).unwrap_or(false);
        let restored = review_queue.restore(&config.review_queue_snapshot_path, validator).await?;
        info!(restored, "review queue restored from snapshot");
    }

    let shutdown = Shutdown::new();

    let rating_listener = TcpListener::bind((config.host.as_str(), config.rating_port)).await?;
    let scan_dispatch_listener = TcpListener::bind((config.host.as_str(), config.scan_dispatch_port)).await?;
    let notification_listener = TcpListener::bind((config.host.as_str(), config.notification_port)).await?;
    let review_dispatch_listener = TcpListener::bind((config.host.as_str(), config.review_dispatch_port)).await?;

    let rating_config = Arc::new(endpoints::rating::RatingEndpointConfig {
        domain_expiration_days: config.domain_expiration_days,
        request_expiration_days: config.request_expiration_days,
    });

    let rating_task = tokio::spawn(endpoints::rating::run(
        rating_listener,
        persistence.clone(),
        scan_queue.clone(),
        rating_config,
        shutdown.clone(),
    ));

    let scan_dispatch_task = tokio::spawn(endpoints::dispatch::run(
        "scan",
        scan_dispatch_listener,
        scan_queue.clone(),
        sessions.clone(),
        domrate_common::WorkerKind::Scanner,
        config.dispatch_pull_timeout,
        shutdown.clone(),
    ));

    let review_dispatch_task = tokio::spawn(endpoints::dispatch::run(
        "review",
        review_dispatch_listener,
        review_queue.clone(),
        sessions.clone(),
        domrate_common::WorkerKind::Reviewer,
        config.dispatch_pull_timeout,
        shutdown.clone(),
    ));

    let notification_task = tokio::spawn(endpoints::notification::run(
        notification_listener,
        persistence.clone(),
        review_queue.clone(),
        shutdown.clone(),
    ));

    let http_task = if let Some(port) = config.metrics_port {
        metrics::register_metrics();
        let state = http_api::HttpState {
            scan_queue: scan_queue.clone(),
            review_queue: review_queue.clone(),
            sessions: sessions.clone(),
            started_at: Instant::now(),
            pid: std::process::id(),
        };
        Some(http_api::start_server(port, state).await)
    } else {
        None
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining endpoints");
    shutdown.trigger();

    for task in [rating_task, scan_dispatch_task, review_dispatch_task, notification_task] {
        if let Err(e) = task.await {
            error!(error = %e, "endpoint task panicked");
        }
    }
    if let Some(task) = http_task {
        task.abort();
    }

    let scan_snapshotted = scan_queue.snapshot(&config.scan_queue_snapshot_path).await?;
    let review_snapshotted = review_queue.snapshot(&config.review_queue_snapshot_path).await?;
    info!(scan_snapshotted, review_snapshotted, "queues snapshotted, shutting down");

    Ok(())
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
