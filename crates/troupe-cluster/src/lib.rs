//! troupe-cluster: membership and virtual actors on top of engine + remote
//!
//! Each node runs two well-known actors: an agent (membership + activation
//! state machine, reachable at `<host>/cluster/<id>`) and a provider
//! (discovery + membership gossip, at `<host>/provider/<id>`). Kinds
//! registered before start can be activated on any member advertising them;
//! the resulting pid is broadcast so every agent can route to it.

pub mod constants;

mod activation;
mod agent;
mod cluster;
mod error;
mod event;
mod kind;
mod member;
mod messages;
mod provider;

pub use activation::{select_random_member, ActivationConfig, ActivationDetails, SelectMemberFn};
pub use cluster::{Cluster, ClusterConfig, Provider};
pub use error::{ClusterError, ClusterResult};
pub use event::{ActivationEvent, DeactivationEvent, MemberJoinEvent, MemberLeaveEvent};
pub use kind::KindConfig;
pub use member::{Member, MemberSet};
pub use messages::{
    Activation, ActivationRequest, ActivationResponse, ActorTopology, Deactivation, Handshake,
    Members, Ping,
};
pub use provider::{self_managed_provider, MemberAddr, SelfManagedConfig};
