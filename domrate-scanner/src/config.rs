//! Scanner configuration: compiled-in defaults, an optional TOML file, and
//! `DOMRATE_`-prefixed environment variables (highest precedence).

use domrate_common::config::{EnvParser, ModuleConfig, load_toml_file};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `--config` file shape. Every field is optional: an absent key simply
/// falls through to the environment/default layers. `[ModuleName]` tables
/// alongside the scalar keys feed `modules`, per §4.6.
#[derive(Debug, Default, Deserialize)]
pub struct ScannerFileConfig {
    pub scan_dispatch_host: Option<String>,
    pub scan_dispatch_port: Option<u16>,
    pub notification_host: Option<String>,
    pub notification_port: Option<u16>,
    pub rerun_queue_check_delay_secs: Option<u64>,
    pub rerun_counter_max: Option<u32>,
    pub rerun_thresholds: Option<Vec<u64>>,
    pub norun: Option<Vec<String>>,
    pub persistence_journal_path: Option<PathBuf>,
    pub retry_queue_snapshot_path: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub request_expiration_days: Option<u32>,
    #[serde(flatten)]
    pub modules: ModuleConfig,
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub scan_dispatch_host: String,
    pub scan_dispatch_port: u16,
    pub notification_host: String,
    pub notification_port: u16,
    /// How often the watchdog sweeps the retry queue for expired backoffs.
    pub rerun_queue_check_delay: Duration,
    /// Number of reruns a module is allowed before it is treated as
    /// permanently failed (§4.7, §9 Q2).
    pub rerun_counter_max: u32,
    /// Minutes to wait before retrying attempt N, indexed by
    /// `min(attempt - 1, len - 1)` so the last entry applies to every
    /// attempt beyond the configured list (§9 Q3).
    pub rerun_thresholds: Vec<u64>,
    pub norun: Vec<String>,
    pub persistence_journal_path: PathBuf,
    pub retry_queue_snapshot_path: PathBuf,
    pub pid_file: PathBuf,
    /// A restored retry snapshot entry older than this many days is dropped
    /// rather than requeued (§4.2).
    pub request_expiration_days: u32,
    pub modules: ModuleConfig,
}

impl ScannerConfig {
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let file: Option<ScannerFileConfig> = load_toml_file(config_path)?;
        let mut file = file.unwrap_or_default();
        let modules = std::mem::take(&mut file.modules);
        let mut env = EnvParser::new();

        let scan_dispatch_host = env
            .get_string("SCAN_DISPATCH_HOST", "127.0.0.1")
            .resolve_with_file(file.scan_dispatch_host.clone());
        let scan_dispatch_port = env
            .get_u16_range("SCAN_DISPATCH_PORT", 8020, 1, 65535)
            .resolve_with_file(file.scan_dispatch_port);
        let notification_host = env
            .get_string("NOTIFICATION_HOST", "127.0.0.1")
            .resolve_with_file(file.notification_host.clone());
        let notification_port = env
            .get_u16_range("NOTIFICATION_PORT", 8030, 1, 65535)
            .resolve_with_file(file.notification_port);
        let rerun_queue_check_delay = env
            .get_duration_secs("RERUN_QUEUE_CHECK_DELAY", Duration::from_secs(10))
            .resolve_with_file(file.rerun_queue_check_delay_secs.map(Duration::from_secs));
        let rerun_counter_max = env
            .get_u32_range("RERUN_COUNTER_MAX", 10, 1, 1000)
            .resolve_with_file(file.rerun_counter_max);
        let rerun_thresholds = env
            .get_u64_list("RERUN_THRESHOLDS", vec![1, 5, 10, 30, 60])
            .resolve_with_file(file.rerun_thresholds.clone());
        let norun = env
            .get_string_list(
                "NORUN",
                vec!["MXToolbox".to_string(), "Traceroute".to_string(), "Nmap".to_string()],
            )
            .resolve_with_file(file.norun.clone());
        let persistence_journal_path = env
            .get_path("PERSISTENCE_JOURNAL_PATH", "/var/lib/domrate/journal.jsonl")
            .resolve_with_file(file.persistence_journal_path.clone());
        let retry_queue_snapshot_path = env
            .get_path(
                "RETRY_QUEUE_SNAPSHOT_PATH",
                "/var/lib/domrate/retry_queue.snapshot",
            )
            .resolve_with_file(file.retry_queue_snapshot_path.clone());
        let pid_file = env
            .get_path("SCANNER_PID_FILE", "/var/run/domrate-scanner.pid")
            .resolve_with_file(file.pid_file.clone());
        let request_expiration_days = env
            .get_u32_range("REQUEST_EXPIRATION_DAYS", 1, 0, 3650)
            .resolve_with_file(file.request_expiration_days);

        if env.has_errors() {
            anyhow::bail!(
                "invalid scanner configuration: {}",
                env.errors()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        if rerun_thresholds.value.is_empty() {
            anyhow::bail!("invalid scanner configuration: rerun_thresholds must not be empty");
        }

        Ok(Self {
            scan_dispatch_host: scan_dispatch_host.value,
            scan_dispatch_port: scan_dispatch_port.value,
            notification_host: notification_host.value,
            notification_port: notification_port.value,
            rerun_queue_check_delay: rerun_queue_check_delay.value,
            rerun_counter_max: rerun_counter_max.value,
            rerun_thresholds: rerun_thresholds.value,
            norun: norun.value,
            persistence_journal_path: persistence_journal_path.value,
            retry_queue_snapshot_path: retry_queue_snapshot_path.value,
            pid_file: pid_file.value,
            request_expiration_days: request_expiration_days.value,
            modules,
        })
    }

    /// The backoff (in minutes) before the given 1-based `attempt` number is
    /// retried, per §9 Q3: beyond the configured list, the last entry repeats.
    pub fn threshold_for_attempt(&self, attempt: u32) -> u64 {
        let idx = (attempt.saturating_sub(1) as usize).min(self.rerun_thresholds.len() - 1);
        self.rerun_thresholds[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn defaults_match_the_documented_assignment() {
        let cfg = ScannerConfig::load(None).unwrap();
        assert_eq!(cfg.scan_dispatch_port, 8020);
        assert_eq!(cfg.notification_port, 8030);
        assert_eq!(cfg.rerun_counter_max, 10);
        assert_eq!(cfg.rerun_thresholds, vec![1, 5, 10, 30, 60]);
        assert_eq!(cfg.norun, vec!["MXToolbox", "Traceroute", "Nmap"]);
    }

    #[test]
    #[serial_test::serial]
    fn environment_overrides_thresholds_and_norun() {
        unsafe {
            std::env::set_var("DOMRATE_RERUN_THRESHOLDS", "2,4,8");
            std::env::set_var("DOMRATE_NORUN", "Nmap");
        }
        let cfg = ScannerConfig::load(None).unwrap();
        assert_eq!(cfg.rerun_thresholds, vec![2, 4, 8]);
        assert_eq!(cfg.norun, vec!["Nmap"]);
        unsafe {
            std::env::remove_var("DOMRATE_RERUN_THRESHOLDS");
            std::env::remove_var("DOMRATE_NORUN");
        }
    }

    #[test]
    fn threshold_for_attempt_repeats_the_final_entry_beyond_the_list() {
        let mut cfg = ScannerConfig::load(None).unwrap();
        cfg.rerun_thresholds = vec![1, 5, 10];
        assert_eq!(cfg.threshold_for_attempt(1), 1);
        assert_eq!(cfg.threshold_for_attempt(2), 5);
        assert_eq!(cfg.threshold_for_attempt(3), 10);
        assert_eq!(cfg.threshold_for_attempt(4), 10);
        assert_eq!(cfg.threshold_for_attempt(100), 10);
    }
}
