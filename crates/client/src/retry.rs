//! Rate-limit retry wrapper and client-side token bucket.
//!
//! [`with_rate_limit_retry`] re-invokes a backend call while it fails with
//! a throttling error, sleeping the delay the [`RetryPolicy`] prescribes.
//! Any other error is returned after the first invocation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use vrfleet_core::backoff::RetryPolicy;
use vrfleet_core::error::CoreError;

use crate::error::ClientError;

/// Run `call` until it succeeds, fails with a non-throttling error, or
/// `policy.max_attempts` invocations have been made. After exhausting the
/// attempts the last rate-limit error is returned.
pub async fn with_rate_limit_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation, attempt, "Call succeeded after rate limiting");
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limited() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, retrying",
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_rate_limited() {
                    tracing::error!(operation, attempts = attempt, error = %e, "Rate limit retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Token bucket
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Bucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    /// Take one token at `now`, or return how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(missing / self.refill_per_sec))
        }
    }
}

/// Client-side token bucket acquired before every backend call.
///
/// Shared by all calls of one gateway; starts full.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::Validation(
                "Rate limiter capacity must be at least 1".to_string(),
            ));
        }
        if !(refill_per_sec.is_finite() && refill_per_sec > 0.0) {
            return Err(CoreError::Validation(
                "Rate limiter refill rate must be a positive number".to_string(),
            ));
        }
        Ok(Self {
            bucket: Mutex::new(Bucket {
                capacity: f64::from(capacity),
                refill_per_sec,
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        })
    }

    /// Limiter allowing `per_sec` calls per second with a burst of the same
    /// size.
    pub fn per_second(per_sec: u32) -> Result<Self, CoreError> {
        Self::new(per_sec, f64::from(per_sec))
    }

    /// Wait until a token is available and take it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                match bucket.try_take(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            tracing::trace!(wait_ms = wait.as_millis() as u64, "Waiting for rate limiter");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use assert_matches::assert_matches;
    use vrfleet_core::backoff::BackoffStrategy;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            strategy: BackoffStrategy::Linear,
        }
    }

    fn throttled() -> ClientError {
        ClientError::RateLimited("status 429".to_string())
    }

    #[tokio::test]
    async fn succeeds_after_n_rate_limits() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_rate_limit_retry(&fast_policy(5), "test", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= 3 {
                Err(throttled())
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 4);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_rate_limit_retry(&fast_policy(5), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::Api {
                status: 500,
                body: "boom".to_string(),
            })
        })
        .await;
        assert_matches!(result, Err(ClientError::Api { status: 500, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_rate_limit_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_rate_limit_retry(&fast_policy(3), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(throttled())
        })
        .await;
        assert_matches!(result, Err(ClientError::RateLimited(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn message_based_throttling_is_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_rate_limit_retry(&fast_policy(5), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ClientError::Api {
                    status: 503,
                    body: "Rate limit exceeded".to_string(),
                })
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bucket_drains_then_refills() {
        let start = Instant::now();
        let mut bucket = Bucket {
            capacity: 2.0,
            refill_per_sec: 4.0,
            tokens: 2.0,
            last_refill: start,
        };
        assert!(bucket.try_take(start).is_ok());
        assert!(bucket.try_take(start).is_ok());
        let wait = bucket.try_take(start).unwrap_err();
        assert_eq!(wait, Duration::from_millis(250));

        assert!(bucket.try_take(start + Duration::from_millis(250)).is_ok());
        // Refill never exceeds capacity.
        let later = start + Duration::from_secs(60);
        assert!(bucket.try_take(later).is_ok());
        assert!(bucket.try_take(later).is_ok());
        assert!(bucket.try_take(later).is_err());
    }

    #[test]
    fn limiter_rejects_bad_parameters() {
        assert_matches!(RateLimiter::new(0, 1.0), Err(CoreError::Validation(_)));
        assert_matches!(RateLimiter::new(1, 0.0), Err(CoreError::Validation(_)));
        assert_matches!(RateLimiter::new(1, f64::NAN), Err(CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn acquire_returns_immediately_when_tokens_remain() {
        let limiter = RateLimiter::per_second(3).unwrap();
        for _ in 0..3 {
            limiter.acquire().await;
        }
    }
}
