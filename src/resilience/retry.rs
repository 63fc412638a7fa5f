//! Generic retry wrapper with exponential backoff.
//!
//! Retries only errors on the transient allowlist
//! ([`SuperAgentError::is_retryable`]); business-logic errors propagate
//! immediately so configuration mistakes are never hidden behind delay.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::A2aConfig;
use crate::error::Result;

/// Retry policy: up to `max_retries` total attempts with delays of
/// `base_delay * backoff_factor^(attempt-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Maximum total attempts (1 = no retries).
    pub max_retries: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Exponential growth factor between attempts.
    pub backoff_factor: f64,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryManager {
    /// Create a manager from the A2A client configuration.
    pub fn from_config(config: &A2aConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            backoff_factor: config.backoff_factor,
        }
    }

    /// The delay applied after the given 1-indexed attempt fails.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Run `op`, retrying transient failures until it succeeds or
    /// `max_retries` attempts are exhausted, then return the last error.
    ///
    /// Each retry is logged with the attempt number, the delay, and the
    /// causing error.
    pub async fn with_retry<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SuperAgentError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_manager(max_retries: u32) -> RetryManager {
        RetryManager {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let manager = RetryManager {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_factor: 2.0,
        };
        assert_eq!(manager.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(manager.delay_for_attempt(2), Duration::from_millis(200));
        // 400ms caps at 350ms.
        assert_eq!(manager.delay_for_attempt(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn succeeds_after_n_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_manager(4)
            .with_retry("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(SuperAgentError::network("flaky"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn gives_up_after_exactly_max_retries_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_manager(3)
            .with_retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SuperAgentError::timeout("always")) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = fast_manager(5)
            .with_retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(SuperAgentError::SkillNotFound {
                        skill: "x".to_string(),
                        available: vec![],
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
