//! Registered actor templates

use troupe_actor::Producer;

/// Per-kind configuration
///
/// Currently empty; it exists so registrations keep their shape when kind
/// options appear.
#[derive(Debug, Clone, Copy, Default)]
pub struct KindConfig;

impl KindConfig {
    pub fn new() -> Self {
        Self
    }
}

/// A named template that any advertising member can activate on demand
#[derive(Clone)]
pub(crate) struct Kind {
    pub(crate) name: String,
    pub(crate) producer: Producer,
    #[allow(dead_code)]
    pub(crate) config: KindConfig,
}

impl Kind {
    pub(crate) fn new(name: impl Into<String>, producer: Producer, config: KindConfig) -> Self {
        Self {
            name: name.into(),
            producer,
            config,
        }
    }
}
