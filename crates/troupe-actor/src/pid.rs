//! Process identifiers
//!
//! A `Pid` names a process anywhere in a cluster: the `address` part is the
//! listen address of the owning engine (or [`LOCAL_LOOKUP_ADDR`] when no
//! remote is configured), the `id` part is a `/`-separated hierarchical
//! identifier of the form `kind/user-id[/child-id]*`. Registry lookups use
//! only the id part.

use crate::error::{ActorError, ActorResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Address used by engines that have no remote transport configured
pub const LOCAL_LOOKUP_ADDR: &str = "local";

/// Separator between pid segments in the string form
pub const PID_SEPARATOR: char = '/';

/// Identifier of a process, unique within a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pid {
    /// Listen address of the owning engine, or `"local"`
    pub address: String,
    /// Hierarchical identifier, `kind/user-id[/child-id]*`
    pub id: String,
}

impl Pid {
    /// Create a new pid from an address and an id
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        let address = address.into();
        let id = id.into();
        debug_assert!(!address.is_empty(), "pid address must not be empty");
        debug_assert!(!id.is_empty(), "pid id must not be empty");
        Self { address, id }
    }

    /// Derive a child pid by appending a segment to the id part
    pub fn child(&self, id: &str) -> Pid {
        Pid::new(
            self.address.clone(),
            format!("{}{}{}", self.id, PID_SEPARATOR, id),
        )
    }

    /// Hash key over the concatenated address and id, used for interning
    pub fn lookup_key(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.address.hash(&mut hasher);
        self.id.hash(&mut hasher);
        hasher.finish()
    }

    /// Parse the string form `<address>/<kind>/<id>[/<child>]*`
    ///
    /// The first segment is the address, everything after the first
    /// separator is the id.
    pub fn parse(input: &str) -> ActorResult<Pid> {
        match input.split_once(PID_SEPARATOR) {
            Some((address, id)) if !address.is_empty() && !id.is_empty() => {
                Ok(Pid::new(address, id))
            }
            Some(_) => Err(ActorError::invalid_pid(input, "empty address or id")),
            None => Err(ActorError::invalid_pid(input, "missing separator")),
        }
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.address, PID_SEPARATOR, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_display() {
        let pid = Pid::new("127.0.0.1:4000", "echo/1");
        assert_eq!(pid.to_string(), "127.0.0.1:4000/echo/1");
    }

    #[test]
    fn test_pid_parse_roundtrip() {
        let pid = Pid::new("127.0.0.1:4000", "echo/1/worker/2");
        let parsed = Pid::parse(&pid.to_string()).unwrap();
        assert_eq!(parsed, pid);

        let local = Pid::new(LOCAL_LOOKUP_ADDR, "eventstream/42");
        assert_eq!(Pid::parse(&local.to_string()).unwrap(), local);
    }

    #[test]
    fn test_pid_parse_invalid() {
        assert!(Pid::parse("no-separator").is_err());
        assert!(Pid::parse("/leading").is_err());
        assert!(Pid::parse("trailing/").is_err());
    }

    #[test]
    fn test_pid_child() {
        let pid = Pid::new("local", "supervisor/1");
        let child = pid.child("worker/9");
        assert_eq!(child.address, "local");
        assert_eq!(child.id, "supervisor/1/worker/9");
    }

    #[test]
    fn test_pid_equality_and_lookup_key() {
        let a = Pid::new("local", "echo/1");
        let b = Pid::new("local", "echo/1");
        let c = Pid::new("127.0.0.1:4000", "echo/1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.lookup_key(), b.lookup_key());
        assert_ne!(a.lookup_key(), c.lookup_key());
    }
}
