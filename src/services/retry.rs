//! Retry policy for provider calls.

use std::time::Duration;

/// How often and how patiently to retry a failed embedding call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// Fail on the first error.
    None,
    /// Retry with exponentially increasing delays.
    Exponential {
        /// Retries after the first attempt.
        max_retries: u32,
        /// Delay before the first retry.
        initial_interval: Duration,
        /// Delays never exceed this.
        max_interval: Duration,
        /// Growth factor between consecutive delays.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::None
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy::None
    }

    pub fn exponential(max_retries: u32, initial_interval: Duration, max_interval: Duration) -> Self {
        if max_retries == 0 {
            return RetryPolicy::None;
        }
        RetryPolicy::Exponential {
            max_retries,
            initial_interval,
            max_interval,
            multiplier: 2.0,
        }
    }

    /// Whether another attempt may follow the failed retry number `retry`
    /// (0 for the failure of the first attempt).
    pub fn should_retry(&self, retry: u32) -> bool {
        match self {
            RetryPolicy::None => false,
            RetryPolicy::Exponential { max_retries, .. } => retry < *max_retries,
        }
    }

    /// Delay before retry number `retry`.
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                ..
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let secs = initial_interval.as_secs_f64() * multiplier.powi(exponent);
                if !secs.is_finite() || secs >= max_interval.as_secs_f64() {
                    *max_interval
                } else {
                    Duration::from_secs_f64(secs)
                }
            }
        }
    }

    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Exponential { max_retries, .. } => *max_retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(0));
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.max_retries(), 0);
        assert_eq!(
            RetryPolicy::exponential(0, Duration::from_secs(1), Duration::from_secs(1)),
            RetryPolicy::None
        );
    }

    #[test]
    fn test_exponential_delays() {
        let policy =
            RetryPolicy::exponential(3, Duration::from_millis(500), Duration::from_secs(10));
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::exponential(50, Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(policy.delay(3), Duration::from_secs(5));
        assert_eq!(policy.delay(40), Duration::from_secs(5));
    }
}
