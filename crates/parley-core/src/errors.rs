use std::time::Duration;

use crate::ids::InvalidId;

/// Failures from the generation backend, classified so callers can tell
/// transport problems apart from an upstream 2xx with nothing usable in it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("backend returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("backend produced no reply text")]
    EmptyReply,
    #[error("unreadable backend response: {0}")]
    MalformedReply(String),
}

impl GenerationError {
    /// Short classification string for logging and error envelopes.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "upstream_error",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
            Self::EmptyReply => "empty_reply",
            Self::MalformedReply(_) => "malformed_reply",
        }
    }
}

/// Error taxonomy for every conversation operation. Store and backend
/// failures are mapped into exactly one of these kinds at the operation
/// boundary; raw transport errors never escape.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("caller identity could not be resolved: {0}")]
    Unauthenticated(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("malformed identifier: {0}")]
    InvalidIdentifier(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),
    #[error("persistence failed: {0}")]
    PersistenceFailed(String),
    #[error("authenticity check failed: {0}")]
    Authenticity(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl ChatError {
    /// Stable kind string carried in every error envelope.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::NotFound(_) => "not_found",
            Self::GenerationFailed(_) => "generation_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
            Self::Authenticity(_) => "authenticity_error",
            Self::Conflict(_) => "conflict",
        }
    }
}

impl From<InvalidId> for ChatError {
    fn from(e: InvalidId) -> Self {
        ChatError::InvalidIdentifier(e.0)
    }
}
