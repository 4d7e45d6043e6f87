use crate::error::ApiError;
use std::time::Duration;
use tracing::warn;

/// Bounded retry policy for throttled streaming API calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_backoff: Duration,
    /// Hard ceiling on any single wait
    pub max_wait: Duration,
    /// A first suggested wait longer than this fails immediately
    pub fail_fast_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_wait: Duration::from_secs(300),
            fail_fast_wait: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Wait(Duration),
    FailFast(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// Exponential backoff for the given retry number (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Decide what to do after the `attempt`-th throttled response
    pub fn decide(&self, attempt: u32, retry_after: Option<Duration>) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }

        match retry_after {
            Some(wait) if attempt == 0 && wait > self.fail_fast_wait => RetryDecision::FailFast(wait),
            Some(wait) => RetryDecision::Wait(wait.min(self.max_wait)),
            None => RetryDecision::Wait(self.backoff(attempt).min(self.max_wait)),
        }
    }
}

/// Run `op`, retrying rate-limited responses according to `policy`.
/// Any other outcome is returned as-is.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut op: impl FnMut() -> Result<T, ApiError>,
) -> Result<T, ApiError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(ApiError::RateLimited { retry_after }) => {
                match policy.decide(attempt, retry_after) {
                    RetryDecision::Wait(wait) => {
                        warn!(
                            attempt = attempt + 1,
                            wait_ms = wait.as_millis() as u64,
                            "Rate limited by streaming API, backing off"
                        );
                        sleep(wait);
                        attempt += 1;
                    }
                    RetryDecision::FailFast(wait) => {
                        return Err(ApiError::RateLimitWaitTooLong(wait));
                    }
                    RetryDecision::GiveUp => return Err(ApiError::RateLimitExhausted(attempt)),
                }
            }
            other => return other,
        }
    }
}

/// Parse a `Retry-After` header expressed in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn throttled(retry_after: Option<u64>) -> ApiError {
        ApiError::RateLimited {
            retry_after: retry_after.map(Duration::from_secs),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(40), Duration::from_secs(30));
    }

    #[test]
    fn long_first_wait_fails_fast_but_later_waits_are_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0, Some(Duration::from_secs(180))),
            RetryDecision::FailFast(Duration::from_secs(180))
        );
        assert_eq!(
            policy.decide(1, Some(Duration::from_secs(900))),
            RetryDecision::Wait(Duration::from_secs(300))
        );
        assert_eq!(
            policy.decide(0, Some(Duration::from_secs(3))),
            RetryDecision::Wait(Duration::from_secs(3))
        );
    }

    #[test]
    fn retries_until_success_using_suggested_then_backoff_waits() {
        let policy = RetryPolicy::default();
        let waits = RefCell::new(Vec::new());
        let mut calls = 0;

        let result = with_retry(
            &policy,
            |d| waits.borrow_mut().push(d),
            || {
                calls += 1;
                match calls {
                    1 => Err(throttled(Some(5))),
                    2 => Err(throttled(None)),
                    _ => Ok("done"),
                }
            },
        );

        assert_eq!(result.unwrap(), "done");
        assert_eq!(
            *waits.borrow(),
            vec![Duration::from_secs(5), Duration::from_secs(2)]
        );
    }

    #[test]
    fn exhausting_retries_is_terminal() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..Default::default()
        };
        let mut sleeps = 0;
        let result: Result<(), ApiError> =
            with_retry(&policy, |_| sleeps += 1, || Err(throttled(None)));

        assert!(matches!(result, Err(ApiError::RateLimitExhausted(3))));
        assert_eq!(sleeps, 3);
    }

    #[test]
    fn fail_fast_does_not_sleep() {
        let policy = RetryPolicy::default();
        let mut slept = false;
        let result: Result<(), ApiError> =
            with_retry(&policy, |_| slept = true, || Err(throttled(Some(600))));

        assert!(matches!(result, Err(ApiError::RateLimitWaitTooLong(_))));
        assert!(!slept);
    }

    #[test]
    fn non_throttle_errors_pass_through() {
        let policy = RetryPolicy::default();
        let result: Result<(), ApiError> = with_retry(&policy, |_| {}, || Err(ApiError::Unauthorized));
        assert!(matches!(result, Err(ApiError::Unauthorized)));
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }
}
