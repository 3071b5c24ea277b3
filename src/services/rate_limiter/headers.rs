//! Rate limit signals carried in response headers.

use std::collections::HashMap;

const REMAINING_HEADERS: [&str; 3] = [
    "x-ratelimit-remaining",
    "ratelimit-remaining",
    "x-rate-limit-remaining",
];

const RETRY_PRESENCE_HEADERS: [&str; 3] = ["retry-after", "ratelimit-reset", "x-ratelimit-reset-after"];

const LIMIT_HEADERS: [&str; 3] = ["x-ratelimit-limit", "ratelimit-limit", "x-rate-limit-limit"];

const RESET_HEADERS: [&str; 3] = ["x-ratelimit-reset", "ratelimit-reset", "retry-after"];

/// Reset values below this are seconds-from-now, anything larger is an epoch second
const RELATIVE_RESET_CUTOFF_SECS: i64 = 60 * 60;

/// Case-insensitive header lookup
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .map(|value| value.trim())
}

/// Whether a response looks like the upstream is limiting us.
///
/// 429 always counts. 403, 503 and 400 are treated as soft signals as well since
/// indexers often answer throttled clients with them.
pub fn is_rate_limited(status: u16, headers: &HashMap<String, String>) -> bool {
    if matches!(status, 429 | 403 | 503 | 400) {
        return true;
    }

    if REMAINING_HEADERS
        .iter()
        .any(|name| header(headers, name) == Some("0"))
    {
        return true;
    }

    RETRY_PRESENCE_HEADERS
        .iter()
        .any(|name| header(headers, name).is_some())
}

/// Explicit request quota advertised by the upstream, first parseable positive value wins
pub fn explicit_limit(headers: &HashMap<String, String>) -> Option<u32> {
    LIMIT_HEADERS.iter().find_map(|name| {
        header(headers, name)
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|limit| *limit > 0)
    })
}

/// Explicit window length in milliseconds derived from a reset header.
///
/// Only the first numeric reset header is considered. Values outside
/// `(min_ms, max_ms)` or epochs in the past are ignored.
pub fn explicit_window_ms(
    headers: &HashMap<String, String>,
    now_ms: i64,
    min_ms: i64,
    max_ms: i64,
) -> Option<i64> {
    let reset = RESET_HEADERS
        .iter()
        .find_map(|name| header(headers, name).and_then(|value| value.parse::<i64>().ok()))?;

    let window = if reset < RELATIVE_RESET_CUTOFF_SECS {
        reset.checked_mul(1000)?
    } else {
        let now_secs = now_ms.div_euclid(1000);
        (reset - now_secs).checked_mul(1000)?
    };

    (window > min_ms && window < max_ms).then_some(window)
}
