use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancellation::{is_cancellation, CancellationToken, Cancelled};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Bounded retry with exponential backoff for transient I/O failures.
///
/// The policy is a plain value handed to the stages that need it. An
/// attempt is retried only when the failure is I/O-classed and the token
/// has not been cancelled; backoff sleeps observe cancellation.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: usize, base_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay,
        }
    }

    /// No retries; every failure propagates immediately.
    pub fn none() -> RetryPolicy {
        RetryPolicy::new(0, Duration::ZERO)
    }

    pub fn run<T>(
        &self,
        token: &CancellationToken,
        mut operation: impl FnMut() -> Result<T, anyhow::Error>,
    ) -> Result<T, anyhow::Error> {
        let mut attempt: usize = 0;
        loop {
            if token.is_cancelled() {
                return Err(anyhow::Error::new(Cancelled));
            }
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.attempts || !is_retryable(&error) {
                        return Err(error);
                    }
                    let delay = self.base_delay * 2u32.saturating_pow(attempt.min(20) as u32);
                    log::warn!(
                        "attempt {} failed: {:#}; retrying in {:?}",
                        attempt + 1,
                        error,
                        delay
                    );
                    sleep_cancellable(token, delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(2))
    }
}

fn is_retryable(error: &anyhow::Error) -> bool {
    !is_cancellation(error) && error.downcast_ref::<std::io::Error>().is_some()
}

fn sleep_cancellable(token: &CancellationToken, delay: Duration) {
    let until = Instant::now() + delay;
    while !token.is_cancelled() {
        let now = Instant::now();
        if now >= until {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(until - now));
    }
}

/// Wall-clock budget for the merge phase. `deadline()` pins the budget to
/// the moment the merge starts; the merge loops check the deadline
/// cooperatively.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutPolicy {
    limit: Option<Duration>,
}

impl TimeoutPolicy {
    pub fn new(limit: Duration) -> TimeoutPolicy {
        TimeoutPolicy { limit: Some(limit) }
    }

    pub fn none() -> TimeoutPolicy {
        TimeoutPolicy { limit: None }
    }

    pub fn deadline(&self) -> Deadline {
        Deadline {
            at: self.limit.map(|limit| Instant::now() + limit),
            limit: self.limit,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> TimeoutPolicy {
        TimeoutPolicy::new(Duration::from_secs(300))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Option<Instant>,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    pub fn check(&self) -> Result<(), anyhow::Error> {
        if self.expired() {
            Err(anyhow::Error::new(MergeTimeout {
                limit: self.limit.unwrap_or_default(),
            }))
        } else {
            Ok(())
        }
    }
}

/// The merge phase exceeded its wall-clock budget.
#[derive(Clone, Copy, Debug)]
pub struct MergeTimeout {
    pub limit: Duration,
}

impl fmt::Display for MergeTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge did not complete within {:?}", self.limit)
    }
}

impl std::error::Error for MergeTimeout {}

#[cfg(test)]
mod tests {
    use std::io;

    use anyhow::anyhow;

    use super::*;

    #[test]
    fn test_retry_recovers_from_transient_io_errors() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let token = CancellationToken::new();
        let mut failures_left = 2;
        let result: Result<u32, anyhow::Error> = policy.run(&token, || {
            if failures_left > 0 {
                failures_left -= 1;
                Err(anyhow::Error::new(io::Error::new(
                    io::ErrorKind::Other,
                    "transient",
                )))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
    }

    #[test]
    fn test_retry_exhaustion_propagates() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let token = CancellationToken::new();
        let mut calls = 0;
        let result: Result<(), anyhow::Error> = policy.run(&token, || {
            calls += 1;
            Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::Other,
                "still broken",
            )))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_io_errors_fail_immediately() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let token = CancellationToken::new();
        let mut calls = 0;
        let result: Result<(), anyhow::Error> = policy.run(&token, || {
            calls += 1;
            Err(anyhow!("not transient"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_cancelled_token_stops_before_first_attempt() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<(), anyhow::Error> = policy.run(&token, || Ok(()));
        assert!(is_cancellation(&result.unwrap_err()));
    }

    #[test]
    fn test_deadline_expiry() {
        let deadline = TimeoutPolicy::new(Duration::ZERO).deadline();
        assert!(deadline.expired());
        let error = deadline.check().unwrap_err();
        assert!(error.is::<MergeTimeout>());
    }

    #[test]
    fn test_unlimited_deadline_never_expires() {
        let deadline = TimeoutPolicy::none().deadline();
        assert!(!deadline.expired());
        assert!(deadline.check().is_ok());
    }
}
