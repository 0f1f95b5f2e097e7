//! Self-managed discovery provider
//!
//! Providers feed the agent: one `Members` snapshot on start, and a fresh
//! one whenever the known peer set changes. This implementation discovers
//! peers without an external system: seed addresses are handshaked on
//! start, the receiving side replies with its snapshot, and every set
//! change is gossiped to the other providers so the mesh converges. A child
//! actor subscribed to the event stream turns `RemoteUnreachable` into
//! member eviction. Liveness comes from pinging every other provider each
//! `MEMBER_PING_INTERVAL_MS`; a dead peer fails the ping's stream writer,
//! which is exactly the `RemoteUnreachable` signal.
//!
//! External discovery systems (mDNS, Consul) remain collaborators that
//! implement the same message contract.

use crate::cluster::{Cluster, Provider};
use crate::constants::MEMBER_PING_INTERVAL_MS;
use crate::member::{Member, MemberSet};
use crate::messages::{Handshake, MemberLeave, MemberPing, Members, Ping};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use troupe_actor::{producer, ActorEvent, Context, Pid, Receiver, SendRepeater, Started, Stopped};

/// A reachable peer used to bootstrap discovery
#[derive(Debug, Clone)]
pub struct MemberAddr {
    pub listen_addr: String,
    pub id: String,
}

impl MemberAddr {
    pub fn new(listen_addr: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            id: id.into(),
        }
    }

    fn provider_pid(&self) -> Pid {
        Pid::new(self.listen_addr.clone(), format!("provider/{}", self.id))
    }
}

/// Configuration for the self-managed provider
#[derive(Debug, Clone, Default)]
pub struct SelfManagedConfig {
    bootstrap_members: Vec<MemberAddr>,
}

impl SelfManagedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a seed peer to handshake on start
    pub fn with_bootstrap_member(mut self, member: MemberAddr) -> Self {
        self.bootstrap_members.push(member);
        self
    }
}

/// Build the provider producer for [`ClusterConfig::with_provider`]
///
/// [`ClusterConfig::with_provider`]: crate::ClusterConfig::with_provider
pub fn self_managed_provider(config: SelfManagedConfig) -> Provider {
    std::sync::Arc::new(move |cluster: Cluster| {
        let config = config.clone();
        producer(move || SelfManaged {
            config: config.clone(),
            cluster: cluster.clone(),
            members: MemberSet::new(),
            pinger: None,
            event_sub: None,
        })
    })
}

struct SelfManaged {
    config: SelfManagedConfig,
    cluster: Cluster,
    members: MemberSet,
    pinger: Option<SendRepeater>,
    event_sub: Option<Pid>,
}

#[async_trait]
impl Receiver for SelfManaged {
    async fn receive(&mut self, ctx: &Context) {
        let msg = ctx.message();
        if msg.is::<Started>() {
            self.handle_started(ctx);
        } else if msg.is::<Stopped>() {
            if let Some(pinger) = self.pinger.take() {
                pinger.stop();
            }
            if let Some(event_sub) = self.event_sub.take() {
                ctx.engine().unsubscribe(&event_sub);
            }
        } else if let Some(handshake) = msg.downcast_ref::<Handshake>() {
            self.add_members(ctx, std::slice::from_ref(&handshake.member));
            ctx.respond(Members {
                members: self.members.slice(),
            });
        } else if let Some(members) = msg.downcast_ref::<Members>() {
            self.add_members(ctx, &members.members);
        } else if msg.is::<MemberPing>() {
            self.handle_member_ping(ctx);
        } else if let Some(leave) = msg.downcast_ref::<MemberLeave>() {
            self.handle_member_leave(ctx, &leave.listen_addr);
        } else if msg.is::<Ping>() {
            // Liveness traffic only; reaching us is the whole point.
        }
    }
}

impl SelfManaged {
    fn handle_started(&mut self, ctx: &Context) {
        self.members.add(self.cluster.member());
        self.send_members_to_agent(ctx);

        self.pinger = Some(ctx.engine().send_repeat(
            ctx.pid(),
            MemberPing,
            Duration::from_millis(MEMBER_PING_INTERVAL_MS),
        ));

        // Children see the event stream so the provider mailbox stays a
        // plain message target.
        let provider_pid = ctx.pid().clone();
        let event_sub = ctx.spawn_child_fn(
            move |c| {
                if let Some(ActorEvent::RemoteUnreachable { listen_addr }) =
                    c.message().downcast_ref::<ActorEvent>()
                {
                    c.engine().send(
                        &provider_pid,
                        MemberLeave {
                            listen_addr: listen_addr.clone(),
                        },
                    );
                }
            },
            "event",
        );
        ctx.engine().subscribe(&event_sub);
        self.event_sub = Some(event_sub);

        for seed in &self.config.bootstrap_members {
            ctx.engine().send_with_sender(
                &seed.provider_pid(),
                Handshake {
                    member: self.cluster.member(),
                },
                ctx.pid().clone(),
            );
        }
    }

    fn handle_member_ping(&self, ctx: &Context) {
        for member in self.members.iter() {
            if member.host != self.cluster.address() {
                ctx.send(
                    &member.provider_pid(),
                    Ping {
                        from: ctx.pid().clone(),
                    },
                );
            }
        }
    }

    fn handle_member_leave(&mut self, ctx: &Context, listen_addr: &str) {
        let Some(member) = self.members.get_by_host(listen_addr).cloned() else {
            return;
        };
        warn!(host = %member.host, id = %member.id, "member unreachable, evicting");
        self.members.remove(&member);
        self.publish_members(ctx);
    }

    /// Merge new members; on change, re-publish to agent and peers
    fn add_members(&mut self, ctx: &Context, members: &[Member]) {
        let mut changed = false;
        for member in members {
            if !self.members.contains(member) {
                self.members.add(member.clone());
                changed = true;
            }
        }
        if changed {
            self.publish_members(ctx);
        }
    }

    fn send_members_to_agent(&self, ctx: &Context) {
        let Some(agent) = self.cluster.pid() else {
            warn!("provider started before the agent");
            return;
        };
        ctx.engine().send(
            &agent,
            Members {
                members: self.members.slice(),
            },
        );
    }

    /// Push the current snapshot to the local agent and gossip it to every
    /// other provider so membership converges without central discovery
    fn publish_members(&self, ctx: &Context) {
        self.send_members_to_agent(ctx);
        let snapshot = Members {
            members: self.members.slice(),
        };
        for member in self.members.iter() {
            if member.host != self.cluster.address() {
                ctx.send(&member.provider_pid(), snapshot.clone());
            }
        }
        debug!(members = self.members.len(), "membership snapshot published");
    }
}
