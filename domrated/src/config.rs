//! Coordinator configuration: compiled-in defaults, an optional TOML file,
//! and `DOMRATE_`-prefixed environment variables (highest precedence).

use domrate_common::config::{EnvParser, Sourced, load_toml_file};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `--config` file shape. Every field is optional: an absent key simply
/// falls through to the environment/default layers.
#[derive(Debug, Default, Deserialize)]
pub struct CoordinatorFileConfig {
    pub host: Option<String>,
    pub rating_port: Option<u16>,
    pub scan_dispatch_port: Option<u16>,
    pub notification_port: Option<u16>,
    pub review_dispatch_port: Option<u16>,
    pub domain_expiration_days: Option<u32>,
    pub request_expiration_days: Option<u32>,
    pub dispatch_pull_timeout_secs: Option<u64>,
    pub scan_queue_snapshot_path: Option<PathBuf>,
    pub review_queue_snapshot_path: Option<PathBuf>,
    pub persistence_journal_path: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub host: String,
    pub rating_port: u16,
    pub scan_dispatch_port: u16,
    pub notification_port: u16,
    pub review_dispatch_port: u16,
    pub domain_expiration_days: u32,
    pub request_expiration_days: u32,
    pub dispatch_pull_timeout: Duration,
    pub scan_queue_snapshot_path: PathBuf,
    pub review_queue_snapshot_path: PathBuf,
    pub persistence_journal_path: PathBuf,
    pub pid_file: PathBuf,
    pub metrics_port: Option<u16>,
}

impl CoordinatorConfig {
    /// Load the layered configuration, collecting every parse error instead
    /// of failing on the first so a startup diagnostic can name all of them.
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let file: Option<CoordinatorFileConfig> = load_toml_file(config_path)?;
        let file = file.unwrap_or_default();
        let mut env = EnvParser::new();

        let host = env
            .get_string("HOST", "0.0.0.0")
            .resolve_with_file(file.host.clone());
        let rating_port = env
            .get_u16_range("RATING_PORT", 8010, 1, 65535)
            .resolve_with_file(file.rating_port);
        let scan_dispatch_port = env
            .get_u16_range("SCAN_DISPATCH_PORT", 8020, 1, 65535)
            .resolve_with_file(file.scan_dispatch_port);
        let notification_port = env
            .get_u16_range("NOTIFICATION_PORT", 8030, 1, 65535)
            .resolve_with_file(file.notification_port);
        let review_dispatch_port = env
            .get_u16_range("REVIEW_DISPATCH_PORT", 8040, 1, 65535)
            .resolve_with_file(file.review_dispatch_port);
        let domain_expiration_days = env
            .get_u32_range("DOMAIN_EXPIRATION_DAYS", 1, 0, 3650)
            .resolve_with_file(file.domain_expiration_days);
        let request_expiration_days = env
            .get_u32_range("REQUEST_EXPIRATION_DAYS", 1, 0, 3650)
            .resolve_with_file(file.request_expiration_days);
        let dispatch_pull_timeout = env
            .get_duration_secs("DISPATCH_PULL_TIMEOUT", Duration::from_secs(5))
            .resolve_with_file(file.dispatch_pull_timeout_secs.map(Duration::from_secs));
        let scan_queue_snapshot_path = env
            .get_path("SCAN_QUEUE_SNAPSHOT_PATH", "/var/lib/domrate/scan_queue.snapshot")
            .resolve_with_file(file.scan_queue_snapshot_path.clone());
        let review_queue_snapshot_path = env
            .get_path(
                "REVIEW_QUEUE_SNAPSHOT_PATH",
                "/var/lib/domrate/review_queue.snapshot",
            )
            .resolve_with_file(file.review_queue_snapshot_path.clone());
        let persistence_journal_path = env
            .get_path("PERSISTENCE_JOURNAL_PATH", "/var/lib/domrate/journal.jsonl")
            .resolve_with_file(file.persistence_journal_path.clone());
        let pid_file = env
            .get_path("PID_FILE", "/var/run/domrated.pid")
            .resolve_with_file(file.pid_file.clone());
        let metrics_port_sourced: Sourced<u64> = env
            .get_u64_range("METRICS_PORT", 0, 0, 65535)
            .resolve_with_file(file.metrics_port.map(u64::from));

        if env.has_errors() {
            anyhow::bail!(
                "invalid coordinator configuration: {}",
                env.errors()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        let metrics_port = match metrics_port_sourced.value {
            0 => None,
            port => Some(port as u16),
        };

        Ok(Self {
            host: host.value,
            rating_port: rating_port.value,
            scan_dispatch_port: scan_dispatch_port.value,
            notification_port: notification_port.value,
            review_dispatch_port: review_dispatch_port.value,
            domain_expiration_days: domain_expiration_days.value,
            request_expiration_days: request_expiration_days.value,
            dispatch_pull_timeout: dispatch_pull_timeout.value,
            scan_queue_snapshot_path: scan_queue_snapshot_path.value,
            review_queue_snapshot_path: review_queue_snapshot_path.value,
            persistence_journal_path: persistence_journal_path.value,
            pid_file: pid_file.value,
            metrics_port,
        })
    }
}
