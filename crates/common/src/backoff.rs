//! Exponential backoff with jitter, used by the table-backed distributed
//! lock's acquire/CAS retry loop.

use std::time::Duration;

use rand::Rng;

/// Bounded exponential backoff: `base * 2^attempt`, capped at `max`, with
/// up to `jitter_factor` of uniform jitter subtracted.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    jitter_factor: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, max_attempts: u32) -> Self {
        Self { base, max, max_attempts, jitter_factor: 0.2 }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the given attempt (0-indexed). Returns `None` once
    /// `max_attempts` is exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exp = attempt.min(16);
        let scaled = self.base.saturating_mul(1u32.checked_shl(exp).unwrap_or(u32::MAX));
        let capped = scaled.min(self.max);
        let jitter = rand::thread_rng().gen_range(0.0..self.jitter_factor);
        let reduced = capped.mul_f64((1.0 - jitter).max(0.0));
        Some(reduced)
    }
}

impl Default for Backoff {
    /// 100ms -> 1s, capped at 10 attempts, matching the table lock's retry policy.
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(1), 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_then_caps() {
        let backoff = Backoff::default();
        let first = backoff.delay_for(0).expect("attempt 0 available");
        let later = backoff.delay_for(6).expect("attempt 6 available");
        assert!(first <= Duration::from_millis(100));
        assert!(later <= Duration::from_secs(1));
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let backoff = Backoff::default();
        assert!(backoff.delay_for(10).is_none());
    }
}
