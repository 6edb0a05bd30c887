//! Full-jitter exponential backoff for retry delays.

use std::time::Duration;

use crate::config::BackoffConfig;

/// Computes the retry delay for a given attempt count.
///
/// `delay_seconds = uniform(0, min(max_interval, base_delay * 2^n))` — full
/// jitter over `[0, cap]`, not decorrelated. Returning zero is legal.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    base_delay: Duration,
    max_interval: Duration,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_interval: Duration) -> Self {
        Self {
            base_delay,
            max_interval,
        }
    }

    /// `n = 1` is the delay applied after the first failure.
    pub fn cap_for_attempt(&self, n: u32) -> Duration {
        let multiplier = 2f64.powi(n as i32);
        let scaled = self.base_delay.as_secs_f64() * multiplier;
        let capped = scaled.min(self.max_interval.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Draw a full-jitter delay for attempt `n` using the supplied RNG.
    pub fn delay_for_attempt(&self, n: u32, rng: &mut fastrand::Rng) -> Duration {
        let cap = self.cap_for_attempt(n);
        let cap_secs = cap.as_secs_f64();
        if cap_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rng.f64() * cap_secs)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(60))
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_interval_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_grows_exponentially_until_max() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(100));

        assert_eq!(policy.cap_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.cap_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.cap_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.cap_for_attempt(10), Duration::from_secs(100));
    }

    #[test]
    fn default_matches_spec_defaults() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.cap_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.cap_for_attempt(20), Duration::from_secs(60));
    }

    #[test]
    fn jittered_delay_never_exceeds_cap() {
        let policy = BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(60));
        let mut rng = fastrand::Rng::with_seed(42);

        for attempt in 1..=8 {
            let cap = policy.cap_for_attempt(attempt);
            for _ in 0..50 {
                let delay = policy.delay_for_attempt(attempt, &mut rng);
                assert!(delay <= cap, "delay {delay:?} exceeded cap {cap:?}");
            }
        }
    }

    #[test]
    fn zero_cap_returns_zero_delay() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(60));
        let mut rng = fastrand::Rng::with_seed(1);
        assert_eq!(policy.delay_for_attempt(1, &mut rng), Duration::ZERO);
    }
}
