//! Wall-clock deadlines.
//!
//! Deadlines are absolute Unix timestamps in milliseconds. `0` means the
//! entry never expires.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// Deadline value for entries that never expire.
pub const NO_EXPIRY: EpochMillis = 0;

/// Current wall-clock time in milliseconds.
#[inline]
pub fn now_millis() -> EpochMillis {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    dur.as_millis() as EpochMillis
}

/// The deadline `ttl_ms` milliseconds from now.
pub fn deadline_after(ttl_ms: u64) -> EpochMillis {
    now_millis().saturating_add(ttl_ms)
}

/// Whether `deadline` has been reached at time `now`.
#[inline]
pub fn is_expired(deadline: EpochMillis, now: EpochMillis) -> bool {
    deadline != NO_EXPIRY && deadline <= now
}
