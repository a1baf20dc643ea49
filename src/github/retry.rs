//! Retry logic with exponential backoff for tracker requests.

use crate::error::TrackerError;
use std::future::Future;
use std::time::Duration;

/// Maximum backoff between two attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry limits for tracker requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 = try once)
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further one
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Parse retry count from environment variable with clamping to maximum
    fn parse_retry_env(var_name: &str, default: u32, max: u32) -> u32 {
        std::env::var(var_name)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .map(|v| v.min(max))
            .unwrap_or(default)
    }

    /// Create config from `BUILD_NOTIFY_RETRY_GITHUB`, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            max_retries: Self::parse_retry_env("BUILD_NOTIFY_RETRY_GITHUB", 5, 20),
            ..Self::default()
        }
    }

    /// No retries, for tests and dry runs
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(MAX_BACKOFF)
    }
}

/// Retry an async operation with exponential backoff
///
/// Only errors for which [`TrackerError::is_retryable`] holds are retried;
/// others are returned immediately.
pub async fn retry_with_backoff<F, T, Fut>(
    mut operation: F,
    config: &RetryConfig,
    operation_name: &str,
) -> Result<T, TrackerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TrackerError>>,
{
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempts > 0 {
                    log::info!("{} succeeded after {} retry(ies)", operation_name, attempts);
                }
                return Ok(result);
            }
            Err(e) => {
                if !e.is_retryable() || attempts >= config.max_retries {
                    return Err(e);
                }

                attempts += 1;
                let wait = config.backoff(attempts);
                log::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:.1}s",
                    operation_name,
                    attempts,
                    config.max_retries + 1,
                    e,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn server_error() -> TrackerError {
        TrackerError::Status {
            operation: "test".to_string(),
            status: 502,
            body: String::new(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
        };
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(30), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let calls = Cell::new(0);
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        };
        let result = retry_with_backoff(
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err(server_error()) } else { Ok(n) } }
            },
            &config,
            "op",
        )
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff(
            || {
                calls.set(calls.get() + 1);
                async {
                    Err(TrackerError::Status {
                        operation: "op".to_string(),
                        status: 422,
                        body: String::new(),
                    })
                }
            },
            &RetryConfig::default(),
            "op",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
