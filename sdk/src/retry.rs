//! Exponential backoff retry helper shared by storage backends and payment providers.

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::redact::redact_message;

/// Retry policy: exponential backoff with jitter, capped attempts and delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX));
        let raw = self.initial_delay.mul_f64(factor).min(self.max_delay);
        if self.jitter {
            let mut rng = rand::thread_rng();
            let scale = 0.75 + rng.gen_range(0.0..0.5);
            raw.mul_f64(scale)
        } else {
            raw
        }
    }
}

/// Retry an async, fallible operation under `policy`.
///
/// Operations signal retryability by returning `Err(true)` (retryable) or
/// `Err(false)` (permanent); retryable errors are retried up to `max_attempts`
/// times with backoff, permanent errors abort immediately. The error message
/// is redacted before being logged.
pub async fn retry_async<T, E, F, Fut>(op_name: &str, policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, (E, bool)>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err((err, retryable)) => {
                let redacted = redact_message(&err.to_string());
                if !retryable || attempt >= policy.max_attempts {
                    warn!(
                        component = "retry",
                        event = "attempts_exhausted",
                        operation = op_name,
                        attempt,
                        "{op_name} failed after {attempt} attempt(s): {redacted}"
                    );
                    return Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    component = "retry",
                    event = "retrying",
                    operation = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying {op_name} (attempt {attempt}/{}): {redacted}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let result: Result<u32, String> = retry_async("test_op", &policy, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(("transient".to_string(), true))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let result: Result<u32, String> = retry_async("test_op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(("permanent".to_string(), false)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_max_attempts_on_continuous_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            ..RetryPolicy::default()
        };
        let result: Result<u32, String> = retry_async("test_op", &policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(("always fails".to_string(), true)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
