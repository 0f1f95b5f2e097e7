//! Engine limits and defaults
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

/// Default starting capacity of a process inbox (ring slots)
pub const INBOX_CAPACITY_DEFAULT: usize = 1024;

/// Maximum number of envelopes a single drain pass hands to a process
pub const MESSAGE_BATCH_SIZE_MAX: usize = 1024 * 4;

/// Number of envelopes delivered between cooperative yields
pub const THROUGHPUT_DEFAULT: usize = 300;

/// Default maximum restarts before a faulting process is terminated
pub const RESTARTS_COUNT_MAX_DEFAULT: u32 = 3;

/// Default delay before a faulting process is restarted in milliseconds
pub const RESTART_DELAY_MS_DEFAULT: u64 = 500;

const _: () = {
    assert!(INBOX_CAPACITY_DEFAULT > 0);
    assert!(MESSAGE_BATCH_SIZE_MAX >= INBOX_CAPACITY_DEFAULT);
    assert!(THROUGHPUT_DEFAULT > 0);
};
