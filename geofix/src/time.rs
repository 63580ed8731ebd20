//! Time-related utility functions.
//!
//! The engine works on plain epoch milliseconds passed in by the caller.
//! These helpers produce and render those values.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render epoch milliseconds as an RFC 3339 UTC timestamp.
///
/// # Example
///
/// ```
/// use geofix::time::format_millis;
///
/// assert_eq!(format_millis(0), "1970-01-01T00:00:00.000Z");
/// ```
pub fn format_millis(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => format!("{}ms", millis),
    }
}
