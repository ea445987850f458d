/// Backoff policy for generation calls.
///
/// Pure: `(attempt, error kind)` maps to either a wait duration or a stop,
/// with no clocks and no sleeping, so retry counts are testable without real
/// delays. The pipeline owns the actual sleeping.
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::GenerationError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base: Duration,
    factor: u32,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_generation_retries,
            base: config.retry_base,
            factor: config.retry_factor,
            max: config.retry_max,
        }
    }

    /// Decide what to do after a failed call. `attempt` is zero-based: the
    /// first failure is attempt 0. Returns `None` when the error is not
    /// retryable or the retry budget is spent.
    pub fn next_delay(&self, attempt: u32, error: &GenerationError) -> Option<Duration> {
        if attempt >= self.max_retries || !is_retryable(error) {
            return None;
        }
        let mult = (self.factor as u128).checked_pow(attempt).unwrap_or(u128::MAX);
        let delay_ms = self.base.as_millis().saturating_mul(mult);
        let capped_ms = delay_ms.min(self.max.as_millis()) as u64;
        Some(Duration::from_millis(capped_ms))
    }
}

/// Rate limits and timeouts tend to clear on their own; a refusal or an
/// undecodable payload will not.
pub fn is_retryable(error: &GenerationError) -> bool {
    matches!(
        error,
        GenerationError::RateLimited | GenerationError::Timeout
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(&PipelineConfig::default())
    }

    #[test]
    fn rate_limited_and_timeout_are_retryable() {
        assert!(is_retryable(&GenerationError::RateLimited));
        assert!(is_retryable(&GenerationError::Timeout));
        assert!(!is_retryable(&GenerationError::Unavailable("503".into())));
        assert!(!is_retryable(&GenerationError::InvalidResponse("empty".into())));
    }

    #[test]
    fn backoff_doubles_from_the_base() {
        let policy = policy();
        assert_eq!(
            policy.next_delay(0, &GenerationError::RateLimited),
            Some(Duration::from_millis(500))
        );
        assert_eq!(
            policy.next_delay(1, &GenerationError::Timeout),
            Some(Duration::from_millis(1_000))
        );
    }

    #[test]
    fn retry_budget_is_bounded() {
        let policy = policy();
        assert_eq!(policy.next_delay(2, &GenerationError::RateLimited), None);
        assert_eq!(policy.next_delay(99, &GenerationError::Timeout), None);
    }

    #[test]
    fn non_retryable_errors_stop_immediately() {
        let policy = policy();
        assert_eq!(
            policy.next_delay(0, &GenerationError::Unavailable("down".into())),
            None
        );
        assert_eq!(
            policy.next_delay(0, &GenerationError::InvalidResponse("garbled".into())),
            None
        );
    }

    #[test]
    fn delay_is_capped() {
        let config = PipelineConfig {
            max_generation_retries: 10,
            retry_max: Duration::from_secs(2),
            ..PipelineConfig::default()
        };
        let policy = RetryPolicy::new(&config);
        assert_eq!(
            policy.next_delay(8, &GenerationError::Timeout),
            Some(Duration::from_secs(2))
        );
    }
}
