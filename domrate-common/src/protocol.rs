//! Wire protocol: newline-trimmed JSON messages exchanged over TCP between
//! clients, the coordinator's four endpoints, and the scanner/reviewer workers.

use serde::{Deserialize, Serialize};

/// Maximum size, in bytes, of a single wire message this implementation will
/// read before giving up. The reference reads into a 1 KiB buffer; this port
/// accepts up to 64 KiB to tolerate longer comments without truncation.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Rating endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRequestBody {
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRequestEnvelope {
    pub rating: RatingRequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRequest {
    pub request: RatingRequestEnvelope,
}

impl RatingRequest {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            request: RatingRequestEnvelope {
                rating: RatingRequestBody {
                    domain: domain.into(),
                },
            },
        }
    }

    pub fn domain(&self) -> &str {
        &self.request.rating.domain
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingVerdict {
    pub domain: String,
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Response to a rating request. Untagged so the two shapes (`rating` or `msg`)
/// serialize exactly as the wire schema in the specification's external
/// interfaces table, without a discriminant field of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RatingResponse {
    Rating { response: RatingResponseVerdict },
    Msg { response: RatingResponseMsg },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResponseVerdict {
    pub rating: RatingVerdict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingResponseMsg {
    pub msg: String,
}

impl RatingResponse {
    pub fn verdict(domain: impl Into<String>, access: crate::types::Access, comment: Option<String>) -> Self {
        RatingResponse::Rating {
            response: RatingResponseVerdict {
                rating: RatingVerdict {
                    domain: domain.into(),
                    access: access.as_str().to_string(),
                    comment,
                },
            },
        }
    }

    pub fn invalid_request() -> Self {
        RatingResponse::Msg {
            response: RatingResponseMsg {
                msg: "invalid request".to_string(),
            },
        }
    }

    pub fn invalid_domain() -> Self {
        RatingResponse::Msg {
            response: RatingResponseMsg {
                msg: "invalid domain".to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatch endpoints (scan / review)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub request: String,
}

impl TaskRequest {
    pub fn new() -> Self {
        Self {
            request: "task".to_string(),
        }
    }

    pub fn is_task_pull(&self) -> bool {
        self.request == "task"
    }
}

impl Default for TaskRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchedTask {
    pub domain: String,
    pub request_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchResponse {
    Task { response: DispatchTaskBody },
    Msg { response: DispatchMsgBody },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTaskBody {
    pub task: DispatchedTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchMsgBody {
    pub msg: String,
}

impl DispatchResponse {
    pub fn task(domain: impl Into<String>, request_id: u64) -> Self {
        DispatchResponse::Task {
            response: DispatchTaskBody {
                task: DispatchedTask {
                    domain: domain.into(),
                    request_id,
                },
            },
        }
    }

    pub fn shutdown() -> Self {
        DispatchResponse::Msg {
            response: DispatchMsgBody {
                msg: "shutdown".to_string(),
            },
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, DispatchResponse::Msg { response } if response.msg == "shutdown")
    }
}

// ---------------------------------------------------------------------------
// Notification endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanNotificationBody {
    pub domain: String,
    pub request_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewNotificationBody {
    pub domain: String,
    pub request_id: u64,
    pub access: String,
    /// Absent in a malformed sender; treated as empty string per the
    /// specification's resolution of this ambiguity.
    #[serde(default)]
    pub comment: Option<String>,
}

impl ReviewNotificationBody {
    pub fn comment_or_empty(&self) -> &str {
        self.comment.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    Scan { notification: ScanNotificationEnvelope },
    Review { notification: ReviewNotificationEnvelope },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanNotificationEnvelope {
    pub scan: ScanNotificationBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewNotificationEnvelope {
    pub review: ReviewNotificationBody,
}

impl Notification {
    pub fn scan_finished(domain: impl Into<String>, request_id: u64) -> Self {
        Notification::Scan {
            notification: ScanNotificationEnvelope {
                scan: ScanNotificationBody {
                    domain: domain.into(),
                    request_id,
                },
            },
        }
    }

    pub fn review_finished(
        domain: impl Into<String>,
        request_id: u64,
        access: crate::types::Access,
        comment: Option<String>,
    ) -> Self {
        Notification::Review {
            notification: ReviewNotificationEnvelope {
                review: ReviewNotificationBody {
                    domain: domain.into(),
                    request_id,
                    access: access.as_str().to_string(),
                    comment,
                },
            },
        }
    }
}
