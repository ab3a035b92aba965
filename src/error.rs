//! talkwalk error types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// talkwalk error types
#[derive(Debug, thiserror::Error)]
pub enum TalkWalkError {
    // Remote/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    // Response errors
    #[error("empty response from model")]
    EmptyResponse,

    /// The remote call succeeded but its output is unusable for the consumer.
    #[error("malformed {category} response: {reason}")]
    MalformedResponse { category: String, reason: String },

    // Execution errors
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TalkWalkError>,
    },

    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    // Storage errors
    #[error("cache I/O error: {0}")]
    CacheIo(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Reporting errors
    #[error("no rate configured for model: {0}")]
    UnknownModelRate(String),

    // Configuration errors
    #[error("no behavior registered for task category: {0}")]
    UnknownCategory(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Failure classes surfaced in run summaries.
///
/// Coarser than [`TalkWalkError`]: each variant maps to one remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rate limit, network or server-side failure. Retried.
    TransientRemote,
    /// Authentication or validation failure. Never retried.
    PermanentRemote,
    /// Remote call succeeded but produced unusable output.
    MalformedResponse,
    /// Cache store unreadable or unwritable.
    CacheIo,
    /// Cost estimation hit a model with no configured rate.
    UnknownModelRate,
    /// The per-task deadline elapsed.
    Timeout,
    /// Bad configuration or input.
    Configuration,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientRemote => "transient-remote",
            FailureKind::PermanentRemote => "permanent-remote",
            FailureKind::MalformedResponse => "malformed-response",
            FailureKind::CacheIo => "cache-io",
            FailureKind::UnknownModelRate => "unknown-model-rate",
            FailureKind::Timeout => "timeout",
            FailureKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TalkWalkError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, transport errors and server-side statuses are transient.
    /// Everything else (auth, validation, malformed output) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            TalkWalkError::RateLimited { .. } | TalkWalkError::Http(_) => true,
            TalkWalkError::Api { status, .. } => {
                matches!(status, 408 | 409 | 500..=599)
            }
            _ => false,
        }
    }

    /// Provider `retry-after` hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TalkWalkError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify this error into the reporting taxonomy.
    pub fn kind(&self) -> FailureKind {
        match self {
            TalkWalkError::RetriesExhausted { last, .. } => last.kind(),
            TalkWalkError::Timeout(_) => FailureKind::Timeout,
            TalkWalkError::EmptyResponse
            | TalkWalkError::MalformedResponse { .. }
            | TalkWalkError::Json(_) => FailureKind::MalformedResponse,
            TalkWalkError::CacheIo(_) => FailureKind::CacheIo,
            TalkWalkError::UnknownModelRate(_) => FailureKind::UnknownModelRate,
            TalkWalkError::UnknownCategory(_)
            | TalkWalkError::Configuration(_)
            | TalkWalkError::InvalidInput(_)
            | TalkWalkError::Io(_) => FailureKind::Configuration,
            e if e.is_transient() => FailureKind::TransientRemote,
            _ => FailureKind::PermanentRemote,
        }
    }
}

/// Result type alias for talkwalk operations
pub type Result<T> = std::result::Result<T, TalkWalkError>;
