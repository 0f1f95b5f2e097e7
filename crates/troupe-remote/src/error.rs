//! Error types for the remote transport

use thiserror::Error;

/// Result type alias for transport operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Transport error types
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("remote already started")]
    AlreadyStarted,

    #[error("failed to bind listener on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("frame encode failed: {reason}")]
    Encode { reason: String },

    #[error("frame decode failed: {reason}")]
    Decode { reason: String },

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("message is not registered for the wire: {message}")]
    UnregisteredMessage { message: String },

    #[error("no deserializer registered for type name {type_name}; register it with register_type")]
    UnknownTypeName { type_name: String },

    #[error("payload serialization failed: {reason}")]
    SerializeFailed { reason: String },

    #[error("payload deserialization failed for {type_name}: {reason}")]
    DeserializeFailed { type_name: String, reason: String },
}

impl RemoteError {
    /// Create a bind error
    pub fn bind(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Bind {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a frame decode error
    pub fn decode(reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            reason: reason.to_string(),
        }
    }
}
