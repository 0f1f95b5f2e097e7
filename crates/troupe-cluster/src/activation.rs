//! Activation configuration and member selection

use crate::constants::REGION_DEFAULT;
use crate::member::Member;
use rand::seq::SliceRandom;
use std::fmt;
use std::sync::Arc;

/// What the member selector gets to decide on
pub struct ActivationDetails {
    /// Members pre-filtered to those advertising the kind
    pub members: Vec<Member>,
    /// Region the actor should land in
    pub region: String,
    /// The kind being activated
    pub kind: String,
}

/// Picks the member that will host an activation
pub type SelectMemberFn = Arc<dyn Fn(&ActivationDetails) -> Option<Member> + Send + Sync>;

/// Default selector: uniform random over the eligible members
pub fn select_random_member(details: &ActivationDetails) -> Option<Member> {
    details.members.choose(&mut rand::thread_rng()).cloned()
}

/// Options for a single activation
#[derive(Clone)]
pub struct ActivationConfig {
    id: String,
    region: String,
    select_member: SelectMemberFn,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            id: rand::random::<u64>().to_string(),
            region: REGION_DEFAULT.to_string(),
            select_member: Arc::new(select_random_member),
        }
    }
}

impl ActivationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the id of the activated actor; random when not given
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the region the actor should be created in
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Replace the member selector consulted during activation
    pub fn with_select_member(mut self, select_member: SelectMemberFn) -> Self {
        self.select_member = select_member;
        self
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn region(&self) -> &str {
        &self.region
    }

    pub(crate) fn selector(&self) -> &SelectMemberFn {
        &self.select_member
    }
}

impl fmt::Debug for ActivationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationConfig")
            .field("id", &self.id)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_selector_picks_eligible_member() {
        let details = ActivationDetails {
            members: vec![
                Member::new("a", "h1", "default", vec!["player".into()]),
                Member::new("b", "h2", "default", vec!["player".into()]),
            ],
            region: "default".into(),
            kind: "player".into(),
        };
        let picked = select_random_member(&details).expect("non-empty member list");
        assert!(picked.id == "a" || picked.id == "b");
    }

    #[test]
    fn test_random_selector_empty_members() {
        let details = ActivationDetails {
            members: Vec::new(),
            region: "default".into(),
            kind: "player".into(),
        };
        assert!(select_random_member(&details).is_none());
    }
}
