//! Cluster events broadcast on the local event stream

use crate::member::Member;
use troupe_actor::Pid;

/// A new member joined the cluster
#[derive(Debug, Clone)]
pub struct MemberJoinEvent {
    pub member: Member,
}

/// A member left the cluster
#[derive(Debug, Clone)]
pub struct MemberLeaveEvent {
    pub member: Member,
}

/// A virtual actor was activated somewhere in the cluster
#[derive(Debug, Clone)]
pub struct ActivationEvent {
    pub pid: Pid,
}

/// A virtual actor was deactivated somewhere in the cluster
#[derive(Debug, Clone)]
pub struct DeactivationEvent {
    pub pid: Pid,
}
