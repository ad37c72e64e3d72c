//! Timestamp Freshness Window

/// Maximum absolute skew, in seconds, the receiving service accepts.
pub const TIMESTAMP_WINDOW_SECS: u64 = 300;

/// Absolute distance in seconds between a signed timestamp and `now`.
pub const fn skew_seconds(timestamp: i64, now: i64) -> u64 {
    timestamp.abs_diff(now)
}

/// Whether a signed timestamp is still fresh at `now` (bound inclusive).
pub const fn within_window(timestamp: i64, now: i64) -> bool {
    skew_seconds(timestamp, now) <= TIMESTAMP_WINDOW_SECS
}
