//! Retry-After header parsing
//!
//! The header can be specified in two formats:
//! 1. Delay-seconds: an integer number of seconds (e.g. "120")
//! 2. HTTP-date: an absolute instant (e.g. "Wed, 21 Oct 2015 07:28:00 GMT")
//!
//! Dates in the past resolve to zero rather than an error.

use std::time::{Duration, SystemTime};

/// Wait used when a 429 arrives without a usable Retry-After header
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Parse a Retry-After value into whole seconds to wait.
///
/// Returns `None` when the value is neither an integer nor an HTTP date.
pub fn parse_retry_after(value: &str) -> Option<u64> {
    parse_retry_after_at(value, SystemTime::now())
}

/// Same as [`parse_retry_after`] with an explicit "now", for deterministic callers
pub fn parse_retry_after_at(value: &str, now: SystemTime) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<i64>() {
        return Some(seconds.max(0) as u64);
    }

    let date = httpdate::parse_http_date(value).ok()?;
    Some(
        date.duration_since(now)
            .map(|remaining| remaining.as_secs())
            .unwrap_or(0),
    )
}

/// Parse a Retry-After value into a wait duration
pub fn retry_after_duration(value: &str) -> Option<Duration> {
    parse_retry_after(value).map(Duration::from_secs)
}
