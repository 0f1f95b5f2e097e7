//! Error types for the actor engine

use thiserror::Error;

/// Result type alias for engine operations
pub type ActorResult<T> = std::result::Result<T, ActorError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum ActorError {
    #[error("request timed out after {timeout_ms} ms")]
    RequestTimeout { timeout_ms: u64 },

    #[error("response process dropped before a reply arrived")]
    ResponseDropped,

    #[error("invalid pid string: {input}, reason: {reason}")]
    InvalidPid { input: String, reason: String },

    #[error("remote transport failed to start: {reason}")]
    RemoteStart { reason: String },
}

impl ActorError {
    /// Create an invalid pid error
    pub fn invalid_pid(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPid {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a remote start error
    pub fn remote_start(reason: impl Into<String>) -> Self {
        Self::RemoteStart {
            reason: reason.into(),
        }
    }
}
