//! Rate-limit back-off policy for the remote service.
//!
//! The service throttles with status 403 or 429. The wait is taken from the
//! `retry-after` header when present, otherwise from the remaining/reset
//! header pair, otherwise a one-minute default. The decision is a pure
//! function over the response status and headers so it can be tested without
//! a transport.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds to wait before retrying, set directly by the service.
pub const HEADER_RETRY_AFTER: &str = "retry-after";
/// Requests left in the current window.
pub const HEADER_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
/// Unix time at which the current window resets.
pub const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";

const DEFAULT_BACKOFF: Duration = Duration::from_secs(60);

/// Computes the back-off for a response, if it is rate-limited at all.
///
/// `header` looks up a response header by (lowercase) name; `now_unix` is the
/// current Unix time in seconds.
pub fn backoff_for<F>(status: u16, header: F, now_unix: u64) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    if status != 403 && status != 429 {
        return None;
    }

    if let Some(retry_after) = header(HEADER_RETRY_AFTER) {
        if let Ok(secs) = retry_after.trim().parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
    }

    if header(HEADER_RATELIMIT_REMAINING).as_deref() == Some("0") {
        if let Some(reset) = header(HEADER_RATELIMIT_RESET) {
            if let Ok(reset) = reset.trim().parse::<u64>() {
                if reset > now_unix {
                    return Some(Duration::from_secs(reset - now_unix));
                }
            }
        }
    }

    Some(DEFAULT_BACKOFF)
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
