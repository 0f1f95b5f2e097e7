//! Remote transport configuration

use crate::constants::FRAME_SIZE_BYTES_MAX_DEFAULT;
use crate::serializer::{Deserializer, JsonSerializer, Serializer};
use std::sync::Arc;

/// Transport configuration with pluggable payload serialization
#[derive(Clone)]
pub struct RemoteConfig {
    max_frame_bytes: usize,
    serializer: Arc<dyn Serializer>,
    deserializer: Arc<dyn Deserializer>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: FRAME_SIZE_BYTES_MAX_DEFAULT,
            serializer: Arc::new(JsonSerializer),
            deserializer: Arc::new(JsonSerializer),
        }
    }
}

impl RemoteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the size of a single frame in both directions
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        debug_assert!(max_frame_bytes > 0, "frame limit must be positive");
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Replace the outbound payload serializer
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Replace the inbound payload deserializer
    pub fn with_deserializer(mut self, deserializer: Arc<dyn Deserializer>) -> Self {
        self.deserializer = deserializer;
        self
    }

    pub(crate) fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    pub(crate) fn serializer(&self) -> Arc<dyn Serializer> {
        Arc::clone(&self.serializer)
    }

    pub(crate) fn deserializer(&self) -> Arc<dyn Deserializer> {
        Arc::clone(&self.deserializer)
    }
}
