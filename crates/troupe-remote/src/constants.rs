//! Transport limits and defaults

/// Dial attempts before a peer is declared unreachable
pub const DIAL_ATTEMPTS_COUNT_MAX: u32 = 3;

/// Base delay between dial attempts in milliseconds; scales with the attempt
pub const DIAL_BACKOFF_MS_BASE: u64 = 500;

/// Idle timeout after which a peer connection is torn down (10 min)
pub const CONN_IDLE_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Default maximum frame size in bytes (4 MiB)
pub const FRAME_SIZE_BYTES_MAX_DEFAULT: usize = 4 * 1024 * 1024;

/// Starting inbox capacity of a stream writer
pub const STREAM_WRITER_INBOX_CAPACITY: usize = 1024;

/// Starting inbox capacity of the stream router
pub const STREAM_ROUTER_INBOX_CAPACITY: usize = 1024 * 1024;

const _: () = {
    assert!(DIAL_ATTEMPTS_COUNT_MAX > 0);
    assert!(FRAME_SIZE_BYTES_MAX_DEFAULT >= 64 * 1024);
};
