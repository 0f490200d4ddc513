//! Reviewer configuration: compiled-in defaults, an optional TOML file, and
//! `DOMRATE_`-prefixed environment variables (highest precedence).

use domrate_common::config::{EnvParser, load_toml_file};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// `--config` file shape. Every field is optional: an absent key simply
/// falls through to the environment/default layers.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewerFileConfig {
    pub review_dispatch_host: Option<String>,
    pub review_dispatch_port: Option<u16>,
    pub notification_host: Option<String>,
    pub notification_port: Option<u16>,
    pub persistence_journal_path: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ReviewerConfig {
    pub review_dispatch_host: String,
    pub review_dispatch_port: u16,
    pub notification_host: String,
    pub notification_port: u16,
    pub persistence_journal_path: PathBuf,
    pub pid_file: PathBuf,
}

impl ReviewerConfig {
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let file: Option<ReviewerFileConfig> = load_toml_file(config_path)?;
        let file = file.unwrap_or_default();
        let mut env = EnvParser::new();

        let review_dispatch_host = env
            .get_string("REVIEW_DISPATCH_HOST", "127.0.0.1")
            .resolve_with_file(file.review_dispatch_host.clone());
        let review_dispatch_port = env
            .get_u16_range("REVIEW_DISPATCH_PORT", 8040, 1, 65535)
            .resolve_with_file(file.review_dispatch_port);
        let notification_host = env
            .get_string("NOTIFICATION_HOST", "127.0.0.1")
            .resolve_with_file(file.notification_host.clone());
        let notification_port = env
            .get_u16_range("NOTIFICATION_PORT", 8030, 1, 65535)
            .resolve_with_file(file.notification_port);
        let persistence_journal_path = env
            .get_path("PERSISTENCE_JOURNAL_PATH", "/var/lib/domrate/journal.jsonl")
            .resolve_with_file(file.persistence_journal_path.clone());
        let pid_file = env
            .get_path("REVIEWER_PID_FILE", "/var/run/domrate-reviewer.pid")
            .resolve_with_file(file.pid_file.clone());

        if env.has_errors() {
            anyhow::bail!(
                "invalid reviewer configuration: {}",
                env.errors()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        Ok(Self {
            review_dispatch_host: review_dispatch_host.value,
            review_dispatch_port: review_dispatch_port.value,
            notification_host: notification_host.value,
            notification_port: notification_port.value,
            persistence_journal_path: persistence_journal_path.value,
            pid_file: pid_file.value,
        })
    }
}
