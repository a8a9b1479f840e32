//! Bounded exponential backoff for collaborator calls.
//!
//! Per the commit-only-after-confirmation rule, a failed collaborator call
//! leaves no state behind, so retrying the whole operation is always safe.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the retry following attempt `attempt` (1-based):
    /// base, 2*base, 4*base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping between attempts.
/// Only errors `retryable` accepts are retried; the rest return
/// immediately.
pub fn run_with_backoff<T, E, F, R, S>(
    policy: &BackoffPolicy,
    mut op: F,
    retryable: R,
    mut sleep: S,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
    S: FnMut(Duration),
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !retryable(&err) {
                    return Err(err);
                }
                sleep(policy.delay_for(attempt));
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{run_with_backoff, BackoffPolicy};

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(3, Duration::from_millis(100))
    }

    #[test]
    fn delays_double_per_attempt() {
        let policy = policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn succeeds_without_sleeping_on_first_attempt() {
        let mut slept = Vec::new();
        let result: Result<u32, &str> = run_with_backoff(
            &policy(),
            || Ok(42),
            |_| true,
            |delay| slept.push(delay),
        );
        assert_eq!(result, Ok(42));
        assert!(slept.is_empty());
    }

    #[test]
    fn retries_retryable_errors_until_success() {
        let mut calls = 0;
        let mut slept = Vec::new();
        let result: Result<u32, &str> = run_with_backoff(
            &policy(),
            || {
                calls += 1;
                if calls < 3 {
                    Err("unavailable")
                } else {
                    Ok(7)
                }
            },
            |_| true,
            |delay| slept.push(delay),
        );
        assert_eq!(result, Ok(7));
        assert_eq!(calls, 3);
        assert_eq!(
            slept,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<u32, &str> = run_with_backoff(
            &policy(),
            || {
                calls += 1;
                Err("unavailable")
            },
            |_| true,
            |_| {},
        );
        assert_eq!(result, Err("unavailable"));
        assert_eq!(calls, 3);
    }

    #[test]
    fn non_retryable_errors_return_immediately() {
        let mut calls = 0;
        let result: Result<u32, &str> = run_with_backoff(
            &policy(),
            || {
                calls += 1;
                Err("rejected")
            },
            |err| *err != "rejected",
            |_| {},
        );
        assert_eq!(result, Err("rejected"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_attempt_policy_still_runs_once() {
        let mut calls = 0;
        let result: Result<u32, &str> = run_with_backoff(
            &BackoffPolicy::new(0, Duration::from_millis(1)),
            || {
                calls += 1;
                Err("unavailable")
            },
            |_| true,
            |_| {},
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
