//! Cluster limits and defaults

/// Default timeout for agent requests in milliseconds
///
/// Chosen so members across long-haul links still answer in time.
pub const REQUEST_TIMEOUT_MS_DEFAULT: u64 = 1000;

/// Interval between liveness pings to other providers in milliseconds
pub const MEMBER_PING_INTERVAL_MS: u64 = 2000;

/// Region assigned to members that do not configure one
pub const REGION_DEFAULT: &str = "default";

const _: () = {
    assert!(REQUEST_TIMEOUT_MS_DEFAULT > 0);
    assert!(MEMBER_PING_INTERVAL_MS > 0);
};
