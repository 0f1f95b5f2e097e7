//! Messages and envelopes
//!
//! Messages are opaque to the engine: any `Send + Sync` value with a `Debug`
//! impl can be sent. They travel as `Arc<dyn Message>` so broadcast and
//! forwarding are reference-count bumps, and receivers inspect them by
//! downcasting.

use crate::pid::Pid;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// A value that can be carried by an envelope
///
/// Blanket-implemented for every `Any + Send + Sync + Debug` type, so user
/// code never implements this by hand.
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Borrow the message for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Convert into an `Any` arc for owned downcasting
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T> Message for T
where
    T: Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl dyn Message {
    /// Check whether the message is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast the message to a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Shared, type-erased message
pub type DynMessage = Arc<dyn Message>;

/// A message paired with its optional sender
#[derive(Debug, Clone)]
pub struct Envelope {
    pub msg: DynMessage,
    pub sender: Option<Pid>,
}

impl Envelope {
    pub fn new(msg: DynMessage, sender: Option<Pid>) -> Self {
        Self { msg, sender }
    }
}

// =============================================================================
// System messages
// =============================================================================

/// Delivered once after the receiver is produced, before `Started`
#[derive(Debug, Clone, Copy)]
pub struct Initialized;

/// Delivered once the process is about to begin draining its inbox
#[derive(Debug, Clone, Copy)]
pub struct Started;

/// Delivered when the process stops, including before a restart
#[derive(Debug, Clone, Copy)]
pub struct Stopped;

/// Panic payload that restarts the process without consuming a restart credit
///
/// Raise with `std::panic::panic_any` from inside a receiver when a transient
/// infrastructure fault should retry forever with back-off instead of
/// counting toward `max_restarts`.
#[derive(Debug, Clone)]
pub struct InternalFailure {
    /// Component that observed the fault
    pub from: String,
    /// Human-readable description
    pub reason: String,
}

impl InternalFailure {
    pub fn new(from: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            reason: reason.into(),
        }
    }
}

/// Private control message that asks a process to terminate
///
/// Delivered through the regular mailbox but filtered from receivers. The
/// `done` slot resolves the caller's [`crate::engine::StopHandle`] once
/// cleanup has finished.
pub(crate) struct PoisonPill {
    pub(crate) graceful: bool,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl PoisonPill {
    pub(crate) fn new(graceful: bool) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                graceful,
                done: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    /// Resolve the stop handle; idempotent
    pub(crate) fn resolve(&self) {
        let mut slot = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = slot.take() {
            let _ = tx.send(());
        }
    }
}

impl fmt::Debug for PoisonPill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoisonPill")
            .field("graceful", &self.graceful)
            .finish()
    }
}
