//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Remote Limits
// =============================================================================

/// Maximum length of a remote's name in bytes
pub const REMOTE_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Maximum number of registered remotes per comms vat
pub const REMOTES_COUNT_MAX: usize = 1000;

/// Maximum number of CList entries per remote
///
/// Entries are append-only for the life of a connection (export drops are
/// deliberately ignored), so this bounds the worst-case table growth.
pub const CLIST_ENTRIES_COUNT_MAX: usize = 1_000_000;

// =============================================================================
// Message Limits
// =============================================================================

/// Maximum size of a wire message body in bytes (1 MB)
pub const WIRE_MESSAGE_SIZE_BYTES_MAX: usize = 1024 * 1024;

/// Maximum number of slots referenced by one message payload
pub const MESSAGE_SLOTS_COUNT_MAX: usize = 1024;

/// Maximum length of a method name in bytes
pub const METHOD_NAME_LENGTH_BYTES_MAX: usize = 256;

// =============================================================================
// Identifier Limits
// =============================================================================

/// Maximum configurable identifier base
///
/// Leaves headroom so monotonic allocators seeded at the base cannot
/// plausibly wrap a u64 within a vat incarnation.
pub const IDENTIFIER_BASE_MAX: u64 = 1 << 48;

// Compile-time assertions for constant validity
const _: () = {
    assert!(REMOTE_NAME_LENGTH_BYTES_MAX >= 16);
    assert!(REMOTES_COUNT_MAX >= 1);
    assert!(WIRE_MESSAGE_SIZE_BYTES_MAX >= 64 * 1024);
    assert!(MESSAGE_SLOTS_COUNT_MAX >= 16);
    assert!(IDENTIFIER_BASE_MAX < u64::MAX / 2);
};
