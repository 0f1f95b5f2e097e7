//! Local process registry
//!
//! Maps the id part of a pid (never the address) to the owning process.
//! Reads dominate writes, so lookups share a read lock. Removal from the
//! registry is the authoritative death signal for a process.

use crate::pid::{Pid, PID_SEPARATOR};
use crate::process::Process;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A process with the same id is already registered
pub(crate) struct DuplicateId;

/// Registry of live local processes keyed by pid id
pub struct Registry {
    lookup: RwLock<HashMap<String, Arc<dyn Process>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            lookup: RwLock::new(HashMap::with_capacity(1024)),
        }
    }

    /// Resolve the pid registered for `kind` and `id`, when present
    pub fn get_pid(&self, kind: &str, id: &str) -> Option<Pid> {
        let key = format!("{kind}{PID_SEPARATOR}{id}");
        self.lookup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map(|proc| proc.pid().clone())
    }

    /// Number of registered processes
    pub fn len(&self) -> usize {
        self.lookup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn get(&self, pid: &Pid) -> Option<Arc<dyn Process>> {
        self.lookup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pid.id)
            .map(Arc::clone)
    }

    /// Register a process; the incumbent wins on id collisions
    pub(crate) fn insert(&self, proc: Arc<dyn Process>) -> Result<(), DuplicateId> {
        let id = proc.pid().id.clone();
        let mut lookup = self.lookup.write().unwrap_or_else(PoisonError::into_inner);
        if lookup.contains_key(&id) {
            return Err(DuplicateId);
        }
        lookup.insert(id, proc);
        Ok(())
    }

    /// Remove a process; this is the authoritative death signal
    ///
    /// Custom [`Process`] implementations that tear themselves down (stream
    /// writers, response slots) call this as their final step.
    pub fn remove(&self, pid: &Pid) {
        self.lookup
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pid.id);
    }
}
