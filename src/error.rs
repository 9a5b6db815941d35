//! Error kinds shared by every component, each carrying a stable code plus a
//! human message. Tool handlers never let these escape as transport-level
//! exceptions; they are always converted to a structured `CallToolResult`
//! with `is_error` set (see `server.rs`).

use thiserror::Error;

/// A server-wide error. Every variant maps to exactly one of the error kinds
/// enumerated in the specification's error handling section.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("blocked by policy: {0}")]
    PolicyBlocked(String),

    #[error("rate limited: too many requests, slow down")]
    RateLimited,

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("command timed out")]
    Timeout,

    #[error("history append failed: {0}")]
    PersistenceWarning(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidArgument(_) => "invalid_argument",
            ServerError::NotFound(_) => "not_found",
            ServerError::PolicyBlocked(_) => "policy_blocked",
            ServerError::RateLimited => "rate_limited",
            ServerError::CapacityExceeded(_) => "capacity_exceeded",
            ServerError::SpawnFailed(_) => "spawn_failed",
            ServerError::Timeout => "timeout",
            ServerError::PersistenceWarning(_) => "persistence_warning",
            ServerError::Internal(_) => "internal",
        }
    }

    /// A short actionable hint to append to the message shown to the caller,
    /// when one is useful.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ServerError::NotFound(_) => Some("list sessions or processes to see valid IDs"),
            ServerError::RateLimited => Some("wait a moment and retry"),
            ServerError::CapacityExceeded(_) => {
                Some("wait for existing work to finish or close unused sessions")
            }
            _ => None,
        }
    }

    /// Render as the single string surfaced to the MCP caller.
    #[must_use]
    pub fn to_message(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{self} ({hint})"),
            None => self.to_string(),
        }
    }
}
