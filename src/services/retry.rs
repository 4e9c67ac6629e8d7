//! Exponential backoff for oracle calls.
//!
//! Only the oracle client retries; scans are never re-run.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::OracleConfig;

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl From<&OracleConfig> for RetryConfig {
    fn from(config: &OracleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            ..Self::default()
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
/// The last error is returned when attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        attempt = attempt,
                        operation = operation_name,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                let retryable = err.is_retryable();

                warn!(
                    attempt = attempt,
                    max_attempts = max_attempts,
                    operation = operation_name,
                    error = %err,
                    retryable = retryable,
                    "Operation failed"
                );

                if !retryable {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        attempts = attempt,
                        "Max retry attempts reached"
                    );
                    return Err(err);
                }

                let backoff = config.calculate_backoff(attempt);
                debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    operation = operation_name,
                    "Backing off before retry"
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
