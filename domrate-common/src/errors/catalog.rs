use std::fmt;

/// Stable, numbered error catalog shared across the coordinator, scanner and
/// reviewer binaries. Every fatal or per-message failure maps to exactly one
/// variant here, each with a remediation hint an operator can act on.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum DomRateError {
    #[error("configuration key '{key}' has an invalid value: {detail}")]
    InvalidConfigValue { key: String, detail: String },

    #[error("a previous instance is already running (pid file at {path})")]
    AlreadyRunning { path: String },

    #[error("malformed wire message: {detail}")]
    MalformedMessage { detail: String },

    #[error("message exceeded the {limit}-byte read buffer")]
    MessageTooLarge { limit: usize },

    #[error("domain '{domain}' failed name resolution")]
    InvalidDomain { domain: String },

    #[error("request {request_id} does not reference domain '{domain}'")]
    RequestMismatch { request_id: u64, domain: String },

    #[error("module '{module}' is not registered")]
    UnknownModule { module: String },

    #[error("module '{module}' depends on excluded module '{dependency}'")]
    ExcludedDependency { module: String, dependency: String },

    #[error("module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency { module: String, dependency: String },

    #[error("cyclic module dependency detected starting at '{module}'")]
    CyclicDependency { module: String },

    #[error(
        "module '{module}' stored version {stored} is newer than the running code version {code}"
    )]
    ModuleVersionRegressed { module: String, stored: u64, code: u64 },

    #[error("persistence operation failed: {detail}")]
    Persistence { detail: String },

    #[error("queue snapshot at {path} contained an unparseable entry: {detail}")]
    SnapshotCorrupt { path: String, detail: String },

    #[error("an internal invariant was violated: {detail}")]
    Internal { detail: String },
}

/// Broad grouping of [`DomRateError`] variants, used for metrics labels and
/// the numeric code ranges documented on the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Protocol,
    Validation,
    ModuleScheduling,
    PersistenceQueue,
    Internal,
}

impl ErrorCategory {
    pub const fn name(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Validation => "validation",
            ErrorCategory::ModuleScheduling => "module_scheduling",
            ErrorCategory::PersistenceQueue => "persistence_queue",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully formatted catalog entry: code, category, message and remediation.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: &'static [&'static str],
}

impl ErrorEntry {
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }

    pub fn format_full(&self) -> String {
        let mut out = format!(
            "[{}] ({}) {}\n",
            self.code,
            self.category,
            self.message
        );
        for step in self.remediation {
            out.push_str("  - ");
            out.push_str(step);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_brief())
    }
}

impl DomRateError {
    /// Three-digit numeric code, unique per variant.
    pub const fn code_number(&self) -> u16 {
        match self {
            DomRateError::InvalidConfigValue { .. } => 1,
            DomRateError::AlreadyRunning { .. } => 2,
            DomRateError::MalformedMessage { .. } => 100,
            DomRateError::MessageTooLarge { .. } => 101,
            DomRateError::InvalidDomain { .. } => 200,
            DomRateError::RequestMismatch { .. } => 201,
            DomRateError::UnknownModule { .. } => 300,
            DomRateError::ExcludedDependency { .. } => 301,
            DomRateError::UnknownDependency { .. } => 302,
            DomRateError::CyclicDependency { .. } => 303,
            DomRateError::ModuleVersionRegressed { .. } => 304,
            DomRateError::Persistence { .. } => 400,
            DomRateError::SnapshotCorrupt { .. } => 401,
            DomRateError::Internal { .. } => 500,
        }
    }

    pub fn code_string(&self) -> String {
        format!("DR-E{:03}", self.code_number())
    }

    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            0..=99 => ErrorCategory::Configuration,
            100..=199 => ErrorCategory::Protocol,
            200..=299 => ErrorCategory::Validation,
            300..=399 => ErrorCategory::ModuleScheduling,
            400..=499 => ErrorCategory::PersistenceQueue,
            _ => ErrorCategory::Internal,
        }
    }

    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            DomRateError::InvalidConfigValue { .. } => &[
                "Check the offending key's type against the documented configuration schema.",
                "Remove the key to fall back to its compiled-in default.",
            ],
            DomRateError::AlreadyRunning { .. } => &[
                "Confirm no other instance is actually running before removing the pid file.",
                "If the previous process crashed, remove the stale pid file and restart.",
            ],
            DomRateError::MalformedMessage { .. } => &[
                "Verify the sender serializes the documented JSON envelope exactly.",
            ],
            DomRateError::MessageTooLarge { .. } => &[
                "Reduce the size of free-text fields (e.g. comments) in the message.",
            ],
            DomRateError::InvalidDomain { .. } => &[
                "Confirm the domain resolves via DNS from the coordinator's network.",
            ],
            DomRateError::RequestMismatch { .. } => &[
                "The request id and domain no longer agree with persistence; drop the message.",
            ],
            DomRateError::UnknownModule { .. } => &[
                "Add the module to the registration table or remove it from configuration.",
            ],
            DomRateError::ExcludedDependency { .. } => &[
                "Remove the dependency from `norun`, or exclude the dependent module too.",
            ],
            DomRateError::UnknownDependency { .. } => &[
                "Register the missing module or fix the typo in the dependency declaration.",
            ],
            DomRateError::CyclicDependency { .. } => &[
                "Break the cycle by removing one of the dependency edges.",
            ],
            DomRateError::ModuleVersionRegressed { .. } => &[
                "The running binary is older than the persisted module version; deploy the newer build.",
            ],
            DomRateError::Persistence { .. } => &[
                "Check that the journal file's directory is writable and has free space.",
            ],
            DomRateError::SnapshotCorrupt { .. } => &[
                "The snapshot entry was dropped; inspect the file manually if recovery is needed.",
            ],
            DomRateError::Internal { .. } => &[
                "This indicates a bug; please file an issue with the surrounding log lines.",
            ],
        }
    }

    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.to_string(),
            remediation: self.remediation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_variants() -> Vec<DomRateError> {
        vec![
            DomRateError::InvalidConfigValue {
                key: "rerun_counter_max".into(),
                detail: "not an integer".into(),
            },
            DomRateError::AlreadyRunning {
                path: "/tmp/domrated.pid".into(),
            },
            DomRateError::MalformedMessage {
                detail: "missing 'request'".into(),
            },
            DomRateError::MessageTooLarge { limit: 65536 },
            DomRateError::InvalidDomain {
                domain: "not-a-real-tld.invalid".into(),
            },
            DomRateError::RequestMismatch {
                request_id: 7,
                domain: "example.com".into(),
            },
            DomRateError::UnknownModule {
                module: "Bogus".into(),
            },
            DomRateError::ExcludedDependency {
                module: "A".into(),
                dependency: "Nmap".into(),
            },
            DomRateError::UnknownDependency {
                module: "A".into(),
                dependency: "B".into(),
            },
            DomRateError::CyclicDependency { module: "A".into() },
            DomRateError::ModuleVersionRegressed {
                module: "ASN".into(),
                stored: 5,
                code: 3,
            },
            DomRateError::Persistence {
                detail: "disk full".into(),
            },
            DomRateError::SnapshotCorrupt {
                path: "/var/domrate/scan_queue.snapshot".into(),
                detail: "bad json on line 3".into(),
            },
            DomRateError::Internal {
                detail: "unreachable state".into(),
            },
        ]
    }

    #[test]
    fn error_code_numbers_are_unique() {
        let variants = sample_variants();
        let mut seen = std::collections::HashSet::new();
        for variant in &variants {
            assert!(
                seen.insert(variant.code_number()),
                "duplicate code number for {:?}",
                variant
            );
        }
    }

    #[test]
    fn code_string_formats_with_fixed_width() {
        let err = DomRateError::MalformedMessage {
            detail: "x".into(),
        };
        assert_eq!(err.code_string(), "DR-E100");
    }

    #[test]
    fn category_mapping_matches_documented_ranges() {
        assert_eq!(
            DomRateError::InvalidConfigValue {
                key: "k".into(),
                detail: "d".into()
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            DomRateError::MalformedMessage { detail: "d".into() }.category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            DomRateError::InvalidDomain {
                domain: "d".into()
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            DomRateError::CyclicDependency { module: "m".into() }.category(),
            ErrorCategory::ModuleScheduling
        );
        assert_eq!(
            DomRateError::Persistence { detail: "d".into() }.category(),
            ErrorCategory::PersistenceQueue
        );
        assert_eq!(
            DomRateError::Internal { detail: "d".into() }.category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn every_variant_has_non_empty_remediation() {
        for variant in sample_variants() {
            assert!(
                !variant.remediation().is_empty(),
                "missing remediation for {:?}",
                variant
            );
        }
    }

    #[test]
    fn entry_format_full_includes_every_remediation_step() {
        let err = DomRateError::CyclicDependency {
            module: "ASN".into(),
        };
        let entry = err.entry();
        let full = entry.format_full();
        for step in err.remediation() {
            assert!(full.contains(step));
        }
        assert!(full.contains("DR-E303"));
    }
}
