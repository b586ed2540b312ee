//! Retry policy for rate-limited backend calls.
//!
//! The default strategy waits `base_delay × attempt` between attempts.
//! [`BackoffStrategy::Exponential`] doubles the delay instead, clamps it
//! to a ceiling and can apply full jitter.

use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Message fragments that identify a throttling failure when no status
/// code is available.
const RATE_LIMIT_MARKERS: &[&str] = &["429", "rate limit", "too many requests"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base_delay × attempt`.
    Linear,
    /// `base_delay × 2^(attempt-1)`, capped at `max_delay`.
    Exponential { max_delay: Duration, jitter: bool },
}

impl BackoffStrategy {
    /// Parse `linear` or `exponential`; exponential enables jitter.
    pub fn parse(s: &str, max_delay: Duration) -> Result<Self, CoreError> {
        match s.trim().to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential {
                max_delay,
                jitter: true,
            }),
            other => Err(CoreError::Validation(format!(
                "Invalid backoff strategy '{other}'. Must be one of: linear, exponential"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            strategy: BackoffStrategy::Linear,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential { max_delay, jitter } => {
                let factor = 2u32.saturating_pow(attempt - 1);
                let delay = self.base_delay.saturating_mul(factor).min(max_delay);
                if jitter {
                    full_jitter(delay)
                } else {
                    delay
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "Retry max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Uniform random delay in `[0, delay]`.
fn full_jitter(delay: Duration) -> Duration {
    let max_ms = delay.as_millis() as u64;
    if max_ms == 0 {
        return delay;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Whether an error message reads like HTTP 429 throttling.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
}
