//! Exchange clock helpers
//!
//! Engine code takes explicit `i64` Unix-nanosecond timestamps; only the
//! venue boundary reads the wall clock.

use chrono::{DateTime, Utc};

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    to_nanos(Utc::now())
}

/// Unix nanoseconds of a UTC instant, saturating outside the i64 range
/// (roughly years 1677..2262).
pub fn to_nanos(instant: DateTime<Utc>) -> i64 {
    instant
        .timestamp_nanos_opt()
        .unwrap_or(if instant.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

/// UTC instant of a Unix-nanosecond timestamp.
pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
