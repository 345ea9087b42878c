/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// Clamps a per-host backoff delay to the `[0, cap_ms]` range used by the
/// federation/channel walkers when re-enqueueing an errored host.
pub fn clamped_backoff_ms(error_count: u32, step_ms: u64, cap_ms: u64) -> u64 {
    (error_count as u64).saturating_mul(step_ms).min(cap_ms)
}

/// Exponential backoff starting at `base_ms`, doubling per attempt, capped at `cap_ms`.
pub fn exponential_backoff_ms(attempt: u32, base_ms: u64, cap_ms: u64) -> u64 {
    let exponent = attempt.min(20);
    let scaled = base_ms.saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
    scaled.min(cap_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_clamped_backoff_respects_cap() {
        assert_eq!(clamped_backoff_ms(0, 5000, 30_000), 0);
        assert_eq!(clamped_backoff_ms(2, 5000, 30_000), 10_000);
        assert_eq!(clamped_backoff_ms(100, 5000, 30_000), 30_000);
    }

    #[test]
    fn unit_exponential_backoff_doubles_and_caps() {
        assert_eq!(exponential_backoff_ms(0, 1000, 30_000), 1000);
        assert_eq!(exponential_backoff_ms(1, 1000, 30_000), 2000);
        assert_eq!(exponential_backoff_ms(2, 1000, 30_000), 4000);
        assert_eq!(exponential_backoff_ms(10, 1000, 30_000), 30_000);
    }

    #[test]
    fn unit_current_unix_timestamp_ms_is_positive() {
        assert!(current_unix_timestamp_ms() > 0);
    }
}
