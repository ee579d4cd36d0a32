use std::time::Duration;

use switchback_config::ProxyConfig;

use crate::error::FetchError;

/// Linear-backoff retry policy: after failed attempt `n` (0-based) the loop
/// sleeps `(n + 1) * backoff_unit` before trying again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_unit: config.retry_backoff(),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    #[must_use]
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        self.backoff_unit * (failed_attempt + 1)
    }

    /// Whether failed attempt `attempt` (0-based) should be followed by another.
    #[must_use]
    pub fn should_retry(&self, err: &FetchError, attempt: u32) -> bool {
        attempt < self.max_retries && err.is_retryable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> FetchError {
        FetchError::HttpStatus {
            status,
            snippet: String::new(),
        }
    }

    #[test]
    fn default_backoff_is_one_then_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
    }

    #[test]
    fn retries_5xx_until_budget_spent() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&http(503), 0));
        assert!(policy.should_retry(&http(513), 1));
        assert!(!policy.should_retry(&http(503), 2));
    }

    #[test]
    fn never_retries_4xx() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&http(404), 0));
        assert!(!policy.should_retry(&http(429), 0));
    }

    #[test]
    fn zero_retries_means_single_attempt() {
        let policy = RetryPolicy {
            max_retries: 0,
            backoff_unit: Duration::from_millis(5),
        };
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(&http(500), 0));
    }
}
