//! Core data model shared by the coordinator, scanner and reviewer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Verdict a domain or request can carry once classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Permitted,
    Denied,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Permitted => "permitted",
            Access::Denied => "denied",
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a `Request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Queued,
    Scanned,
    Permitted,
    Denied,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Permitted | RequestState::Denied)
    }
}

/// A unique domain name, cached with its last known verdict.
///
/// One row per distinct (lowercased, trimmed) name; `updated_at` is bumped only
/// by review notifications, never by scan completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: u64,
    pub name: String,
    pub state: Access,
    pub comment: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    pub fn normalize_name(raw: &str) -> String {
        raw.trim().to_ascii_lowercase()
    }
}

/// A single rating request against a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub domain_id: u64,
    pub state: RequestState,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Opaque per-module output row, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub request_id: u64,
    pub module: String,
    pub payload: serde_json::Value,
}

/// Recorded version of a module, reconciled against the in-process code version at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub module: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Append-only error log entry, attached to a request and (usually) a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub request_id: u64,
    pub module: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Transient queue entry handed to a scanner. Carries the domain alongside the
/// request id so dispatch never needs a persistence lookup to serve a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTask {
    pub request_id: u64,
    pub domain: String,
}

/// Transient queue entry handed to a reviewer. Same shape as `ScanTask` but kept
/// as a distinct type so the two queues can't be mixed up at the type level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTask {
    pub request_id: u64,
    pub domain: String,
}

/// A task waiting in the scanner's retry queue for its backoff threshold to elapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryTask {
    pub request_id: u64,
    pub domain: String,
    pub attempt: u32,
    pub rerun_modules: BTreeSet<String>,
    pub enqueued_at: DateTime<Utc>,
}

/// Common accessors shared by the two task queue entry types.
pub trait HasDomainContext {
    fn request_id(&self) -> u64;
    fn domain(&self) -> &str;
}

impl HasDomainContext for ScanTask {
    fn request_id(&self) -> u64 {
        self.request_id
    }

    fn domain(&self) -> &str {
        &self.domain
    }
}

impl HasDomainContext for ReviewTask {
    fn request_id(&self) -> u64 {
        self.request_id
    }

    fn domain(&self) -> &str {
        &self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_display_matches_wire_strings() {
        assert_eq!(Access::Permitted.as_str(), "permitted");
        assert_eq!(Access::Denied.to_string(), "denied");
    }

    #[test]
    fn request_state_terminality() {
        assert!(!RequestState::Queued.is_terminal());
        assert!(!RequestState::Scanned.is_terminal());
        assert!(RequestState::Permitted.is_terminal());
        assert!(RequestState::Denied.is_terminal());
    }

    #[test]
    fn domain_name_normalization_trims_and_lowercases() {
        assert_eq!(Domain::normalize_name("  Example.COM \n"), "example.com");
    }

    #[test]
    fn retry_task_round_trips_through_json() {
        let task = RetryTask {
            request_id: 7,
            domain: "example.com".to_string(),
            attempt: 2,
            rerun_modules: BTreeSet::from(["ASN".to_string(), "Whois".to_string()]),
            enqueued_at: Utc::now(),
        };
        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: RetryTask = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, task);
    }
}
