use std::time::Duration;

use chrono::{DateTime, Utc};

/// Parses a `Retry-After` header value as either delta-seconds or an
/// HTTP-date.
pub fn parse_retry_after(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let parsed = DateTime::parse_from_rfc2822(raw).ok()?;
    let now = Utc::now();
    let delta = parsed.with_timezone(&Utc) - now;
    let seconds = delta.num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

/// Exponential backoff starting at 1000ms, doubling, capped at 30000ms.
pub fn exponential_backoff(attempt: u32) -> Duration {
    Duration::from_millis(crawler_core::exponential_backoff_ms(attempt, 1000, 30_000))
}

/// 429 sleep is `max(retry_after, current_backoff)` and does not consume
/// retry budget.
pub fn too_many_requests_delay(retry_after: Option<Duration>, current_backoff: Duration) -> Duration {
    match retry_after {
        Some(delay) => delay.max(current_backoff),
        None => current_backoff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parse_retry_after_accepts_seconds() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("not-a-number-or-date"), None);
    }

    #[test]
    fn unit_exponential_backoff_doubles_and_caps() {
        assert_eq!(exponential_backoff(0), Duration::from_millis(1000));
        assert_eq!(exponential_backoff(1), Duration::from_millis(2000));
        assert_eq!(exponential_backoff(5), Duration::from_millis(30_000));
    }

    #[test]
    fn invariant_retry_ladder_429_uses_max_of_retry_after_and_backoff() {
        let backoff = exponential_backoff(2);
        assert_eq!(
            too_many_requests_delay(Some(Duration::from_secs(1)), backoff),
            backoff
        );
        assert_eq!(
            too_many_requests_delay(Some(Duration::from_secs(10)), backoff),
            Duration::from_secs(10)
        );
        assert_eq!(too_many_requests_delay(None, backoff), backoff);
    }
}
