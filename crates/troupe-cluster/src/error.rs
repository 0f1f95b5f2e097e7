//! Error types for the cluster layer

use thiserror::Error;

/// Result type alias for cluster operations
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Cluster error types
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("cluster engine failed to build: {reason}")]
    EngineBuild { reason: String },
}

impl ClusterError {
    /// Create an engine build error
    pub fn engine_build(reason: impl std::fmt::Display) -> Self {
        Self::EngineBuild {
            reason: reason.to_string(),
        }
    }
}
