//! # Backoff between reconnect iterations.
//!
//! [`BackoffPolicy`] computes how long the reconnect loop sleeps before iteration `n`.
//! It is parameterized by:
//! - [`BackoffPolicy::first`] the delay before the first iteration;
//! - [`BackoffPolicy::factor`] the multiplicative growth factor (`1.0` = fixed delay);
//! - [`BackoffPolicy::max`] the cap.
//!
//! The base delay for iteration `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base depends only on `n`, so jitter never compounds.
//!
//! The default is a fixed 2 s delay.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use amqpstream::{BackoffPolicy, JitterPolicy};
//!
//! assert_eq!(BackoffPolicy::default().next(7), Duration::from_secs(2));
//!
//! let backoff = BackoffPolicy::exponential(Duration::from_millis(500), Duration::from_secs(8), 2.0);
//! assert_eq!(backoff.next(0), Duration::from_millis(500));
//! assert_eq!(backoff.next(2), Duration::from_secs(2));
//! assert_eq!(backoff.next(10), Duration::from_secs(8));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay before the first reconnect iteration under the default policy.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first iteration.
    pub first: Duration,
    /// Maximum delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization applied to each delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Fixed 2 s delay, no jitter.
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl BackoffPolicy {
    /// Same delay before every iteration.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay growing by `factor` per iteration, capped at `max`.
    pub fn exponential(first: Duration, max: Duration, factor: f64) -> Self {
        Self {
            first,
            max,
            factor,
            jitter: JitterPolicy::None,
        }
    }

    /// Replaces the jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before iteration `attempt` (0-indexed).
    ///
    /// Non-finite or negative intermediate values fall back to `max`.
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if secs.is_finite() && secs >= 0.0 && secs <= self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fixed_two_seconds() {
        let policy = BackoffPolicy::default();
        for attempt in [0, 1, 5, 1000, u32::MAX] {
            assert_eq!(policy.next(attempt), Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_exponential_growth_and_cap() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1), 2.0);
        assert_eq!(policy.next(0), Duration::from_millis(100));
        assert_eq!(policy.next(1), Duration::from_millis(200));
        assert_eq!(policy.next(3), Duration::from_millis(800));
        assert_eq!(policy.next(4), Duration::from_secs(1));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_first_above_max_is_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(5), 2.0);
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_equal_jitter_stays_within_half_and_full_base() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(1000)).with_jitter(JitterPolicy::Equal);
        for attempt in 0..50 {
            let delay = policy.next(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_full_jitter_never_exceeds_base() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30), 2.0)
                .with_jitter(JitterPolicy::Full);
        for attempt in 0..12 {
            let base = Duration::from_millis(100 * 2u64.pow(attempt)).min(Duration::from_secs(30));
            assert!(policy.next(attempt) <= base);
        }
    }

    #[test]
    fn test_decorrelated_jitter_respects_floor_and_cap() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30), 2.0)
                .with_jitter(JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let delay = policy.next(8);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_secs(30));
        }
    }
}
