/// Engine guardrails.
///
/// These constants bound cache growth and signal fan-out so a long-lived view
/// cannot accumulate unbounded state. `SyncConfig` defaults are taken from here.

/// Max rosters kept in the member-list cache before LRU eviction.
pub const MAX_CACHED_ROSTERS: usize = 64;

/// Max envelope ids remembered for signal de-duplication.
pub const MAX_SEEN_SIGNALS: usize = 1_024;

/// Buffered signals per transport before slow subscribers start lagging.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 100;

/// Simulated round-trip for operations on groups that exist only locally.
pub const LOCAL_OP_DELAY_MS: u64 = 150;

/// Upper bound on invitees per `invite_members` call.
pub const MAX_INVITEES_PER_CALL: usize = 50;

/// Local ids are kept inside the JS safe-integer range (2^53 - 1).
pub const LOCAL_ID_MASK: u64 = (1u64 << 53) - 1;
