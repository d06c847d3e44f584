//! Fixed-interval sampling gate for the detector.
//!
//! Detection runs at most once per interval regardless of how fast frames
//! arrive. The gate is stateless: the caller owns the last-sample instant and
//! resets it after a cycle completes. A stall is not caught up; the next check
//! simply sees a large elapsed time and allows one cycle.

use std::time::{Duration, Instant};

pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// True when at least `interval` has elapsed between `last_sample` and `now`.
pub fn should_sample(now: Instant, last_sample: Instant, interval: Duration) -> bool {
    now.saturating_duration_since(last_sample) >= interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_once_interval_has_elapsed() {
        let last = Instant::now();
        let interval = Duration::from_secs(10);
        assert!(should_sample(last + Duration::from_secs(10), last, interval));
        assert!(!should_sample(last + Duration::from_secs(9), last, interval));
        assert!(should_sample(last + Duration::from_secs(3600), last, interval));
    }

    #[test]
    fn clock_before_last_sample_counts_as_no_time() {
        let now = Instant::now();
        let last = now + Duration::from_secs(5);
        assert!(!should_sample(now, last, Duration::from_secs(1)));
        assert!(should_sample(now, last, Duration::ZERO));
    }
}
