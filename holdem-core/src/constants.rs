//! Tunable limits and defaults shared across the core.

use std::time::Duration;

/// Minimum number of active-and-connected players required to start a hand.
pub const MIN_PLAYERS: u8 = 2;
/// Maximum seats at a single table.
pub const MAX_SEATS: u8 = 9;

pub const DECK_SIZE: usize = 52;
pub const HOLE_CARDS: usize = 2;
pub const COMMUNITY_CARDS: usize = 5;

/// Default per-action time bank.
pub const DEFAULT_TIME_BANK: Duration = Duration::from_secs(30);
/// Grace period a disconnected player keeps their seat for button purposes.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);
/// Delay between a hand finishing and the next one being dealt.
pub const DEFAULT_INTER_HAND_DELAY: Duration = Duration::from_secs(3);

/// Default RNG rate limit: operations per minute per table.
pub const DEFAULT_RNG_RATE_LIMIT_PER_MINUTE: u32 = 1000;
/// Audit buffer flush threshold (records).
pub const DEFAULT_AUDIT_BATCH_SIZE: usize = 128;
/// Audit buffer flush interval.
pub const DEFAULT_AUDIT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Idempotency cache default entry TTL.
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Idempotency command coalescing window.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Audit record retention window before `cleanup` may delete them.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);
