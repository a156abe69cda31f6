//! Bounded retry for notification delivery
//!
//! Each attempt can be capped by its own timeout, independent of the delay
//! between attempts, so one hung connection cannot stall the caller beyond
//! `max_attempts * (attempt_timeout + delay)`.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::{DEFAULT_RETRY_COUNT, DEFAULT_RETRY_DELAY_SECS};
use crate::error::{Error, Result};

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay every time
    #[default]
    Fixed,
    /// `delay * attempt`
    Linear,
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: Backoff,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_COUNT,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            backoff: Backoff::Fixed,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made
    pub fn new(max_attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
            attempt_timeout: None,
        }
    }

    /// Cap every attempt at `timeout`
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Linear => self.delay.saturating_mul(attempt.max(1)),
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or attempts run out. Exhaustion is reported as [`Error::Delivery`].
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            let outcome = match self.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation(attempt)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::transport(format!(
                        "timed out after {}s",
                        limit.as_secs_f32()
                    ))),
                },
                None => operation(attempt).await,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        log::debug!(
                            "[governor:notify] {} succeeded on attempt {}",
                            label,
                            attempt
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    log::error!("[governor:notify] {} failed permanently: {}", label, e);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!(
                        "[governor:notify] {} attempt {}/{} failed: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        sleep(self.delay_for(attempt)).await;
                    }
                }
            }
        }

        log::error!(
            "[governor:notify] All {} attempts to send {} failed",
            self.max_attempts,
            label
        );
        Err(Error::delivery(self.max_attempts, last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Backoff::Fixed)
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert!(policy.attempt_timeout().is_none());
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(quick(0).max_attempts(), 1);
    }

    #[test]
    fn test_delay_for() {
        let fixed = RetryPolicy::new(3, Duration::from_secs(2), Backoff::Fixed);
        assert_eq!(fixed.delay_for(1), Duration::from_secs(2));
        assert_eq!(fixed.delay_for(3), Duration::from_secs(2));

        let linear = RetryPolicy::new(3, Duration::from_secs(2), Backoff::Linear);
        assert_eq!(linear.delay_for(1), Duration::from_secs(2));
        assert_eq!(linear.delay_for(2), Duration::from_secs(4));
        assert_eq!(linear.delay_for(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::transport("busy"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_delivery_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = quick(3)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::transport("connection refused")) }
            })
            .await;

        match result {
            Err(Error::Delivery { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("connection refused"));
            }
            other => panic!("expected delivery error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = quick(3)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::validation("bad address")) }
            })
            .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = quick(2).with_attempt_timeout(Duration::from_millis(10));
        let result: Result<()> = policy
            .run("test", |_| async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(Error::Delivery { attempts, message }) => {
                assert_eq!(attempts, 2);
                assert!(message.contains("timed out"));
            }
            other => panic!("expected delivery error, got {:?}", other),
        }
    }
}
