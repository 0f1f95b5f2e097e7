//! The cluster agent
//!
//! One agent per node, reachable at `<host>/cluster/<member-id>`. It holds
//! the membership and activation state machines: which members exist, which
//! kinds they advertise, and where every virtual actor currently lives.
//! Replicas converge through `Activation`/`Deactivation` broadcasts and the
//! `ActorTopology` push to joiners.

use crate::activation::{ActivationConfig, ActivationDetails};
use crate::cluster::Cluster;
use crate::event::{ActivationEvent, DeactivationEvent, MemberJoinEvent, MemberLeaveEvent};
use crate::kind::Kind;
use crate::member::{Member, MemberSet};
use crate::messages::{
    Activate, Activation, ActivationRequest, ActivationResponse, ActorTopology, Deactivate,
    Deactivation, GetActive, GetKinds, GetMembers, Members,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, warn};
use troupe_actor::{producer, Context, Message, Opts, Pid, Producer, Receiver};

pub(crate) struct Agent {
    cluster: Cluster,
    members: MemberSet,
    /// Kinds activatable anywhere in the cluster
    kinds: HashSet<String>,
    /// Kinds this node can instantiate itself
    local_kinds: HashMap<String, Kind>,
    /// Every virtual actor known cluster-wide, keyed by the pid id part
    activated: HashMap<String, Pid>,
}

pub(crate) fn agent_producer(cluster: Cluster) -> Producer {
    let local_kinds: HashMap<String, Kind> = cluster
        .kinds_snapshot()
        .into_iter()
        .map(|kind| (kind.name.clone(), kind))
        .collect();
    producer(move || Agent {
        cluster: cluster.clone(),
        members: MemberSet::new(),
        kinds: local_kinds.keys().cloned().collect(),
        local_kinds: local_kinds.clone(),
        activated: HashMap::new(),
    })
}

#[async_trait]
impl Receiver for Agent {
    async fn receive(&mut self, ctx: &Context) {
        let msg = ctx.message();
        if let Some(topology) = msg.downcast_ref::<ActorTopology>() {
            self.handle_actor_topology(topology);
        } else if let Some(members) = msg.downcast_ref::<Members>() {
            self.handle_members(&members.members);
        } else if let Some(activation) = msg.downcast_ref::<Activation>() {
            self.handle_activation(activation);
        } else if let Some(activate) = msg.downcast_ref::<Activate>() {
            let pid = self.activate(&activate.kind, &activate.config).await;
            ctx.respond(pid);
        } else if let Some(deactivate) = msg.downcast_ref::<Deactivate>() {
            self.bcast(Deactivation {
                pid: deactivate.pid.clone(),
            });
        } else if let Some(deactivation) = msg.downcast_ref::<Deactivation>() {
            self.handle_deactivation(deactivation);
        } else if let Some(request) = msg.downcast_ref::<ActivationRequest>() {
            ctx.respond(self.handle_activation_request(request));
        } else if msg.is::<GetMembers>() {
            ctx.respond(self.members.slice());
        } else if msg.is::<GetKinds>() {
            ctx.respond(self.kinds.iter().cloned().collect::<Vec<String>>());
        } else if let Some(query) = msg.downcast_ref::<GetActive>() {
            self.handle_get_active(ctx, query);
        }
    }
}

impl Agent {
    /// Run one activation: pick the activator, have it spawn, then tell
    /// every member about the new pid
    async fn activate(&mut self, kind: &str, config: &ActivationConfig) -> Option<Pid> {
        // Virtual actor ids are unique cluster-wide.
        let id = format!("{kind}/{}", config.id());
        if self.activated.contains_key(&id) {
            warn!(%id, "activation failed: duplicate actor id in the cluster");
            return None;
        }
        let members = self.members.filter_by_kind(kind);
        if members.is_empty() {
            warn!(kind, "no member advertises this kind");
            return None;
        }
        let details = ActivationDetails {
            members,
            region: config.region().to_string(),
            kind: kind.to_string(),
        };
        let activator = match (config.selector())(&details) {
            Some(member) => member,
            None => {
                warn!(kind, "selector found no member to activate on");
                return None;
            }
        };

        let request = ActivationRequest {
            kind: kind.to_string(),
            id: config.id().to_string(),
        };
        let response = if activator.host == self.cluster.engine().address() {
            self.handle_activation_request(&request)
        } else {
            let result = self
                .cluster
                .engine()
                .request(
                    &activator.agent_pid(),
                    request,
                    self.cluster.request_timeout(),
                )
                .result()
                .await;
            match result {
                Ok(msg) => match msg.downcast_ref::<ActivationResponse>() {
                    Some(response) => response.clone(),
                    None => {
                        error!("expected an ActivationResponse from the activator");
                        return None;
                    }
                },
                Err(e) => {
                    error!(err = %e, activator = %activator.id, "activation request failed");
                    return None;
                }
            }
        };
        if !response.success {
            error!(kind, activator = %activator.id, "activation was unsuccessful");
            return None;
        }
        let pid = response.pid?;

        self.bcast(Activation { pid: pid.clone() });
        Some(pid)
    }

    /// Spawn a locally registered kind on behalf of the cluster
    fn handle_activation_request(&self, request: &ActivationRequest) -> ActivationResponse {
        match self.local_kinds.get(&request.kind) {
            Some(kind) => {
                let pid = self.cluster.engine().spawn_with(
                    kind.producer.clone(),
                    &kind.name,
                    Opts::default().with_id(&request.id),
                );
                ActivationResponse {
                    pid: Some(pid),
                    success: true,
                }
            }
            None => {
                error!(
                    kind = %request.kind,
                    "activation request for a kind this node did not register"
                );
                ActivationResponse {
                    pid: None,
                    success: false,
                }
            }
        }
    }

    fn handle_actor_topology(&mut self, topology: &ActorTopology) {
        for pid in &topology.actors {
            self.add_activated(pid.clone());
        }
    }

    fn handle_activation(&mut self, activation: &Activation) {
        self.add_activated(activation.pid.clone());
        self.cluster.engine().broadcast_event(ActivationEvent {
            pid: activation.pid.clone(),
        });
    }

    fn handle_deactivation(&mut self, deactivation: &Deactivation) {
        self.remove_activated(&deactivation.pid);
        // Poisons the underlying process when it lives here; elsewhere the
        // pid misses the local registry and dead-letters.
        let _ = self.cluster.engine().poison(&deactivation.pid);
        self.cluster.engine().broadcast_event(DeactivationEvent {
            pid: deactivation.pid.clone(),
        });
    }

    fn handle_members(&mut self, new: &[Member]) {
        let joined = MemberSet::from_members(new).except(&self.members.slice());
        let left = self.members.except(new);
        for member in joined {
            self.member_join(member);
        }
        for member in left {
            self.member_leave(member);
        }
    }

    fn member_join(&mut self, member: Member) {
        self.members.add(member.clone());
        for kind in &member.kinds {
            self.kinds.insert(kind.clone());
        }

        // Bring the joiner up to date with everything activated so far.
        if !self.activated.is_empty() {
            let topology = ActorTopology {
                actors: self.activated.values().cloned().collect(),
            };
            self.cluster.engine().send(&member.agent_pid(), topology);
        }

        self.cluster.engine().broadcast_event(MemberJoinEvent {
            member: member.clone(),
        });
        debug!(
            id = %member.id,
            host = %member.host,
            kinds = ?member.kinds,
            members = self.members.len(),
            "member joined"
        );
    }

    fn member_leave(&mut self, member: Member) {
        self.members.remove(&member);
        self.rebuild_kinds();

        // Everything hosted by the departed member is gone with it.
        let dropped: Vec<String> = self
            .activated
            .iter()
            .filter(|(_, pid)| pid.address == member.host)
            .map(|(id, _)| id.clone())
            .collect();
        for id in dropped {
            self.activated.remove(&id);
        }

        self.cluster.engine().broadcast_event(MemberLeaveEvent {
            member: member.clone(),
        });
        debug!(id = %member.id, host = %member.host, "member left");
    }

    fn handle_get_active(&self, ctx: &Context, query: &GetActive) {
        match query {
            GetActive::ById(id) => ctx.respond(self.activated.get(id).cloned()),
            GetActive::ByKind(kind) => {
                let pids: Vec<Pid> = self
                    .activated
                    .iter()
                    .filter(|(id, _)| id.split('/').next() == Some(kind.as_str()))
                    .map(|(_, pid)| pid.clone())
                    .collect();
                ctx.respond(pids);
            }
        }
    }

    /// Send `msg` to every member's agent, this node included
    fn bcast(&self, msg: impl Message + Clone) {
        for member in self.members.iter() {
            self.cluster.engine().send(&member.agent_pid(), msg.clone());
        }
    }

    /// First writer wins: a racing `Activation` for an id we already know
    /// is ignored silently
    fn add_activated(&mut self, pid: Pid) {
        if !self.activated.contains_key(&pid.id) {
            debug!(%pid, "new actor available on the cluster");
            self.activated.insert(pid.id.clone(), pid);
        }
    }

    fn remove_activated(&mut self, pid: &Pid) {
        if self.activated.remove(&pid.id).is_some() {
            debug!(%pid, "actor removed from the cluster");
        }
    }

    fn rebuild_kinds(&mut self) {
        self.kinds.clear();
        for member in self.members.iter() {
            for kind in &member.kinds {
                self.kinds.insert(kind.clone());
            }
        }
    }
}
