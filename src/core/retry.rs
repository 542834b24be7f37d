//! Retry policy for transfers
//!
//! The policy is stateless and shared; the per-transfer attempt counter lives
//! in [`RetryState`], owned by the pipeline run.

use std::time::Duration;

use rand::Rng;

use crate::core::config::TransferConfig;
use crate::core::error::ErrorKind;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    cap: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            cap: cap.max(base),
            jitter: true,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        Self::new(config.max_attempts, config.backoff_base, config.backoff_cap)
    }

    /// Disable jitter so delays equal their ceiling
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether attempt number `attempt` (1-based) that failed with `kind` may be followed by another
    pub fn should_retry(&self, attempt: u32, kind: ErrorKind) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }

    /// Upper bound of the delay after attempt `attempt`: `base * 2^(attempt-1)`, capped
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let multiplier = 2_u32.saturating_pow(exponent);
        self.base.saturating_mul(multiplier).min(self.cap)
    }

    /// Delay to wait after attempt `attempt` before the next one.
    ///
    /// With jitter the delay is drawn uniformly from `[ceiling/2, ceiling]`,
    /// so below the cap a later attempt never waits less than an earlier one.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff_ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let ceiling_nanos = ceiling.as_nanos().min(u64::MAX as u128) as u64;
        let floor_nanos = ceiling_nanos / 2;
        Duration::from_nanos(rand::thread_rng().gen_range(floor_nanos..=ceiling_nanos))
    }
}

/// Attempt bookkeeping for one transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub total_backoff: Duration,
}

impl RetryState {
    /// Start the next attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn record_backoff(&mut self, delay: Duration) {
        self.total_backoff += delay;
    }
}
