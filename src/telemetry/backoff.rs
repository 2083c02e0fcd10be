//! Exponential backoff with jitter for export retries.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based).
///
/// Doubles from `base` per attempt, capped at `max`, plus up to 10% jitter.
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    let capped = base.saturating_mul(factor).min(max);

    let jitter_range = capped.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    capped + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_growth() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(2000);

        assert_eq!(retry_delay(0, base, max), Duration::ZERO);

        let first = retry_delay(1, base, max);
        assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(110));

        let second = retry_delay(2, base, max);
        assert!(second >= Duration::from_millis(200));

        let capped = retry_delay(10, base, Duration::from_millis(1000));
        assert!(capped >= Duration::from_millis(1000) && capped < Duration::from_millis(1100));
    }
}
