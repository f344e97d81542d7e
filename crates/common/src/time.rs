//! Millisecond epoch clock helper.
//!
//! Every persisted timestamp in the outbox schema is a millisecond epoch
//! integer; this is the single place that unit gets decided, so callers
//! never have to reconcile seconds against milliseconds by hand.

use chrono::Utc;

/// Current time as milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Milliseconds since the Unix epoch for durations expressed as `Duration`.
pub fn duration_ms(duration: std::time::Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
