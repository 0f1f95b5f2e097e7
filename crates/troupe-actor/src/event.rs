//! Engine lifecycle events
//!
//! Every event is broadcast on the event stream and reaches subscribers as an
//! ordinary message. The stream also logs each event at a level matching its
//! severity before fanning it out.

use crate::message::DynMessage;
use crate::pid::Pid;
use tracing::{debug, error, warn};

/// Lifecycle and routing events observable on the event stream
#[derive(Debug, Clone)]
pub enum ActorEvent {
    /// A receiver was produced and handled `Initialized`
    ActorInitialized { pid: Pid },
    /// The process is ready to handle messages
    ActorStarted { pid: Pid },
    /// The process terminated and was removed from the registry
    ActorStopped { pid: Pid },
    /// The receiver faulted and a fresh incarnation was started
    ActorRestarted {
        pid: Pid,
        backtrace: String,
        reason: String,
        restarts: u32,
    },
    /// The receiver faulted more than `max_restarts` times
    ActorMaxRestartsExceeded { pid: Pid },
    /// A spawn raced an existing registration; the incumbent was kept
    ActorDuplicateId { pid: Pid },
    /// A message could not be delivered to a local process
    DeadLetter {
        target: Pid,
        message: DynMessage,
        sender: Option<Pid>,
    },
    /// A non-local send was attempted on an engine without a remote
    EngineRemoteMissing {
        target: Pid,
        sender: Option<Pid>,
        message: DynMessage,
    },
    /// A peer could not be dialed or its connection closed
    RemoteUnreachable { listen_addr: String },
}

impl ActorEvent {
    /// Log the event with a severity matching its impact
    pub(crate) fn log(&self) {
        match self {
            Self::ActorInitialized { pid } => debug!(%pid, "actor initialized"),
            Self::ActorStarted { pid } => debug!(%pid, "actor started"),
            Self::ActorStopped { pid } => debug!(%pid, "actor stopped"),
            Self::ActorRestarted {
                pid,
                reason,
                restarts,
                backtrace,
            } => {
                error!(%pid, %reason, restarts, %backtrace, "actor crashed and restarted")
            }
            Self::ActorMaxRestartsExceeded { pid } => {
                error!(%pid, "actor crashed too many times")
            }
            Self::ActorDuplicateId { pid } => error!(%pid, "actor id already taken"),
            Self::DeadLetter {
                target,
                message,
                sender,
            } => warn!(to = %target, msg = ?message, from = ?sender, "dead letter"),
            Self::EngineRemoteMissing { target, .. } => {
                error!(to = %target, "engine has no remote configured")
            }
            Self::RemoteUnreachable { listen_addr } => {
                warn!(listen_addr, "remote unreachable")
            }
        }
    }
}
