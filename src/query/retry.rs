use std::time::Duration;

use crate::config::AppConfig;
use crate::constants::MAX_RETRY_DELAY;
use crate::errors::ApiError;

/// Decides whether and when a failed query is attempted again.
/// `failure_count` counts failed attempts so far, starting at 1.
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, error: &ApiError, failure_count: u32) -> bool;
    fn delay_for_attempt(&self, failure_count: u32) -> Duration;
}

/// Doubling delays capped at 30 seconds. Validation failures and 4xx
/// statuses are never retried.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    max_retries: u32,
    backoff_base: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
            max_delay: MAX_RETRY_DELAY,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn should_retry(&self, error: &ApiError, failure_count: u32) -> bool {
        if !error.kind.is_transient() || error.is_client_error() {
            return false;
        }
        failure_count <= self.max_retries
    }

    fn delay_for_attempt(&self, failure_count: u32) -> Duration {
        let exponent = failure_count.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_backoff_delays() {
        let policy = ExponentialBackoff::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_budget() {
        let policy = ExponentialBackoff::default();
        let err = ApiError::network("boom", Some(503));
        assert!(policy.should_retry(&err, 1));
        assert!(policy.should_retry(&err, 3));
        assert!(!policy.should_retry(&err, 4));
    }

    #[test]
    fn test_never_retries_client_errors() {
        let policy = ExponentialBackoff::default();
        assert!(!policy.should_retry(&ApiError::invalid_address(), 1));
        assert!(!policy.should_retry(&ApiError::network("bad request", Some(400)), 1));
        assert!(!policy.should_retry(&ApiError::network("rate limited", Some(429)), 1));
        assert!(!policy.should_retry(&ApiError::invalid_price(), 1));
        assert!(!policy.should_retry(&ApiError::invalid_data(), 1));
        assert!(!policy.should_retry(&ApiError::cancelled(), 1));
        assert!(policy.should_retry(&ApiError::api("NOTOK", "", 200), 1));
        assert!(policy.should_retry(&ApiError::new(ErrorKind::UnknownError, "?", None), 1));
    }
}
