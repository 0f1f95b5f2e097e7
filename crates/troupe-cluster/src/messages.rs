//! Cluster messages
//!
//! Wire messages cross node boundaries and are registered with the remote
//! type registry at cluster construction. The crate-private messages drive
//! the local agent and provider only.

use crate::activation::ActivationConfig;
use crate::member::Member;
use serde::{Deserialize, Serialize};
use troupe_actor::Pid;
use troupe_remote::register_type;

// =============================================================================
// Wire messages
// =============================================================================

/// First contact between providers; the receiver replies with its `Members`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub member: Member,
}

/// Snapshot of a provider's known member set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Members {
    pub members: Vec<Member>,
}

/// A virtual actor became available somewhere in the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub pid: Pid,
}

/// A virtual actor is being removed cluster-wide
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deactivation {
    pub pid: Pid,
}

/// Ask a member to instantiate one of its registered kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub kind: String,
    pub id: String,
}

/// Outcome of an [`ActivationRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationResponse {
    pub pid: Option<Pid>,
    pub success: bool,
}

/// Full set of activations known to an agent, pushed to joining members
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorTopology {
    pub actors: Vec<Pid>,
}

/// Provider liveness ping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    pub from: Pid,
}

/// Register every cluster wire type; idempotent
pub(crate) fn register_wire_types() {
    register_type::<Handshake>();
    register_type::<Members>();
    register_type::<Activation>();
    register_type::<Deactivation>();
    register_type::<ActivationRequest>();
    register_type::<ActivationResponse>();
    register_type::<ActorTopology>();
    register_type::<Ping>();
}

// =============================================================================
// Local messages
// =============================================================================

/// Facade -> agent: run the activation state machine
#[derive(Debug)]
pub(crate) struct Activate {
    pub(crate) kind: String,
    pub(crate) config: ActivationConfig,
}

/// Facade -> agent: broadcast a deactivation
#[derive(Debug)]
pub(crate) struct Deactivate {
    pub(crate) pid: Pid,
}

/// Facade -> agent: snapshot the member set
#[derive(Debug)]
pub(crate) struct GetMembers;

/// Facade -> agent: snapshot the cluster-wide kind set
#[derive(Debug)]
pub(crate) struct GetKinds;

/// Facade -> agent: query the activated map
#[derive(Debug)]
pub(crate) enum GetActive {
    ById(String),
    ByKind(String),
}

/// Event subscriber -> provider: a peer transport became unreachable
#[derive(Debug)]
pub(crate) struct MemberLeave {
    pub(crate) listen_addr: String,
}

/// Provider self-tick driving the liveness pings
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemberPing;
