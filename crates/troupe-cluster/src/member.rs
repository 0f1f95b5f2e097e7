//! Cluster members and member sets

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use troupe_actor::Pid;

/// A node participating in the cluster
///
/// The advertised `kinds` are the actor templates this member is willing to
/// instantiate on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub host: String,
    pub region: String,
    pub kinds: Vec<String>,
}

impl Member {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        region: impl Into<String>,
        kinds: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            region: region.into(),
            kinds,
        }
    }

    /// Pid of this member's cluster agent
    pub fn agent_pid(&self) -> Pid {
        Pid::new(self.host.clone(), format!("cluster/{}", self.id))
    }

    /// Pid of this member's discovery provider
    pub fn provider_pid(&self) -> Pid {
        Pid::new(self.host.clone(), format!("provider/{}", self.id))
    }

    /// Whether this member advertises `kind`
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }
}

/// Set of members keyed by member id
#[derive(Debug, Default)]
pub struct MemberSet {
    members: HashMap<String, Member>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_members(members: &[Member]) -> Self {
        let mut set = Self::new();
        for member in members {
            set.add(member.clone());
        }
        set
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn add(&mut self, member: Member) {
        self.members.insert(member.id.clone(), member);
    }

    pub fn contains(&self, member: &Member) -> bool {
        self.members.contains_key(&member.id)
    }

    pub fn remove(&mut self, member: &Member) {
        self.members.remove(&member.id);
    }

    /// Look a member up by its host address
    pub fn get_by_host(&self, host: &str) -> Option<&Member> {
        self.members.values().find(|member| member.host == host)
    }

    /// Snapshot of all members in unspecified order
    pub fn slice(&self) -> Vec<Member> {
        self.members.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Members of this set that are absent from `others`, for join/leave
    /// derivation
    pub fn except(&self, others: &[Member]) -> Vec<Member> {
        self.members
            .values()
            .filter(|member| !others.iter().any(|other| other.id == member.id))
            .cloned()
            .collect()
    }

    /// Members advertising `kind`
    pub fn filter_by_kind(&self, kind: &str) -> Vec<Member> {
        self.members
            .values()
            .filter(|member| member.has_kind(kind))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, host: &str, kinds: &[&str]) -> Member {
        Member::new(
            id,
            host,
            "default",
            kinds.iter().map(|k| k.to_string()).collect(),
        )
    }

    #[test]
    fn test_member_pids() {
        let m = member("42", "127.0.0.1:4000", &[]);
        assert_eq!(m.agent_pid().to_string(), "127.0.0.1:4000/cluster/42");
        assert_eq!(m.provider_pid().to_string(), "127.0.0.1:4000/provider/42");
    }

    #[test]
    fn test_except_derives_join_and_leave() {
        let known = MemberSet::from_members(&[
            member("a", "h1", &[]),
            member("b", "h2", &[]),
        ]);
        let fresh = vec![member("b", "h2", &[]), member("c", "h3", &[])];

        let joined = MemberSet::from_members(&fresh).except(&known.slice());
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].id, "c");

        let left = known.except(&fresh);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, "a");
    }

    #[test]
    fn test_filter_by_kind() {
        let set = MemberSet::from_members(&[
            member("a", "h1", &["player"]),
            member("b", "h2", &[]),
            member("c", "h3", &["player", "npc"]),
        ]);
        let mut hosting: Vec<String> = set
            .filter_by_kind("player")
            .into_iter()
            .map(|m| m.id)
            .collect();
        hosting.sort();
        assert_eq!(hosting, vec!["a", "c"]);
    }

    #[test]
    fn test_get_by_host() {
        let mut set = MemberSet::new();
        set.add(member("a", "h1", &[]));
        assert_eq!(set.get_by_host("h1").map(|m| m.id.as_str()), Some("a"));
        assert!(set.get_by_host("h9").is_none());
    }

    #[test]
    fn test_add_is_idempotent_by_id() {
        let mut set = MemberSet::new();
        set.add(member("a", "h1", &[]));
        set.add(member("a", "h1", &["player"]));
        assert_eq!(set.len(), 1);
        assert!(set.slice()[0].has_kind("player"));
    }
}
