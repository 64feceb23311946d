//! # Reconnect policy.
//!
//! [`ReconnectPolicy`] decides how long the reconnect loop waits before each iteration
//! and whether it is allowed to start another one.
//!
//! ```text
//! ReconnectPolicy::default()            → fixed 2s, retry forever
//! ReconnectPolicy::default()
//!     .with_max_attempts(5)             → fixed 2s, give up after 5 failed iterations
//! ReconnectPolicy::new(BackoffPolicy::exponential(..))
//!                                       → growing delays, retry forever
//! ```
//!
//! Cancellation is not part of the policy: the caller passes a
//! `CancellationToken` to [`StreamClient::reconnect`](crate::StreamClient::reconnect).

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Retry policy of the reconnect state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before each iteration.
    pub backoff: BackoffPolicy,
    /// Maximum failed iterations before giving up (`0` = unlimited).
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Unlimited retries with the given backoff.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            max_attempts: 0,
        }
    }

    /// Gives up after `n` failed iterations (`0` = unlimited).
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Returns the attempt limit as an `Option`.
    ///
    /// - `None` → retry forever
    /// - `Some(n)` → at most `n` iterations
    #[inline]
    pub fn attempts_limit(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }

    /// Whether iteration `attempt` (1-based) may start.
    #[inline]
    pub fn allows(&self, attempt: u32) -> bool {
        self.attempts_limit().is_none_or(|limit| attempt <= limit)
    }

    /// Delay before iteration `attempt` (1-based).
    #[inline]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.backoff.next(attempt.saturating_sub(1))
    }
}
