use std::time::Duration;

const MAX_BACKOFF_SHIFT: usize = 6;

/// Delay before retrying attempt `attempt` (0-indexed): `2^attempt` seconds,
/// with the shift clamped so a misconfigured attempt cap cannot overflow.
pub fn retry_delay(attempt: usize) -> Duration {
    let shift = attempt.min(MAX_BACKOFF_SHIFT) as u32;
    Duration::from_secs(1_u64 << shift)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::retry_delay;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(retry_delay(0), Duration::from_secs(1));
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(retry_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_shift_is_clamped() {
        assert_eq!(retry_delay(6), Duration::from_secs(64));
        assert_eq!(retry_delay(100), Duration::from_secs(64));
    }
}
