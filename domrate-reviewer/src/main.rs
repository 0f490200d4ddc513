//! Reviewer worker binary: a single-threaded pull-execute-notify loop (§2,
//! §4.9) that pulls ReviewTasks from the coordinator's review dispatch
//! endpoint, computes a verdict from the scan's recorded module output, and
//! reports it to the coordinator's notification endpoint.

mod config;
mod verdict;

use clap::Parser;
use config::ReviewerConfig;
use domrate_common::protocol::Notification;
use domrate_common::{DispatchClient, JsonlPersistence, Persistence, Pulled, Shutdown};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "domrate-reviewer", about = "Domain rating reviewer worker")]
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

    /// Override the review dispatch host to connect to.
    #[arg(long)]
    dispatch_host: Option<String>,

    /// Override the review dispatch port to connect to.
    #[arg(long)]
    dispatch_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    domrate_common::logging::init(cli.verbose, cli.json_logs);

    let mut config = ReviewerConfig::load(cli.config.as_deref())?;
    if let Some(host) = cli.dispatch_host {
        config.review_dispatch_host = host;
    }
    if let Some(port) = cli.dispatch_port {
        config.review_dispatch_port = port;
    }
    let config = Arc::new(config);
    info!(
        dispatch_host = %config.review_dispatch_host,
        dispatch_port = config.review_dispatch_port,
        notification_port = config.notification_port,
        "reviewer starting"
    );

    let _pid_file = domrate_common::pidfile::PidFile::create(config.pid_file.clone())?;

    let persistence: Arc<dyn Persistence> = Arc::new(JsonlPersistence::open(&config.persistence_journal_path)?);

    let shutdown = Shutdown::new();

    let loop_task = tokio::spawn(review_loop(config.clone(), persistence.clone(), shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining reviewer");
    shutdown.trigger();

    if let Err(e) = loop_task.await {
        error!(error = %e, "reviewer loop task panicked");
    }

    Ok(())
}

/// Single-threaded pull-execute-notify loop (§4.9): one persistent
/// connection to the review dispatch endpoint, one task in flight at a
/// time, the next pull itself acknowledging the previous task.
async fn review_loop(config: Arc<ReviewerConfig>, persistence: Arc<dyn Persistence>, shutdown: Shutdown) {
    while shutdown.is_running() {
        let mut client =
            match DispatchClient::connect(&config.review_dispatch_host, config.review_dispatch_port).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "failed to connect to review dispatch, retrying");
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
                    match verdict::compute(persistence.as_ref(), task.request_id) {
                        Ok((access, comment)) => {
                            info!(
                                request_id = task.request_id,
                                domain = %task.domain,
                                access = %access,
                                "review complete, notifying coordinator"
                            );
                            let notification =
                                Notification::review_finished(task.domain.clone(), task.request_id, access, comment);
                            if let Err(e) = domrate_common::notify_client::send_notification(
                                &config.notification_host,
                                config.notification_port,
                                &notification,
                            )
                            .await
                            {
                                warn!(request_id = task.request_id, error = %e, "failed to deliver review-finished notification");
                            }
                        }
                        Err(e) => {
                            error!(request_id = task.request_id, domain = %task.domain, error = %e, "failed to compute verdict");
                        }
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
