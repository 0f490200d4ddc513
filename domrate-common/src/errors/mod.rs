//! Error catalog for the domain rating pipeline.
//!
//! | Range | Category |
//! |---|---|
//! | E0xx | Configuration |
//! | E1xx | Protocol / wire |
//! | E2xx | Validation |
//! | E3xx | Module / scheduler |
//! | E4xx | Persistence / queue |
//! | E5xx | Internal / startup |

mod catalog;

pub use catalog::{DomRateError, ErrorCategory, ErrorEntry};

/// Signal a data-source module raises to classify its own failure.
///
/// Not part of [`DomRateError`]: whether a failure should be retried is a
/// per-module judgement call the scheduler classifies into
/// `failed_transient`/`failed_permanent`, not a system-wide numbered error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("module error (rerun={rerun}): {message}")]
pub struct ModuleError {
    pub rerun: bool,
    pub message: String,
}

impl ModuleError {
    pub fn rerun(message: impl Into<String>) -> Self {
        Self {
            rerun: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            rerun: false,
            message: message.into(),
        }
    }
}
