// ABOUTME: Bounded retry policy shared by every polling call site.
// ABOUTME: Runs an attempt up to N times with a fixed sleep between failures.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// How often, how long, and how patiently to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Per-request timeout within one attempt.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_attempts() -> u32 {
    3
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            interval: default_interval(),
            timeout: default_timeout(),
        }
    }
}

/// What happened across all attempts.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Value of the first successful attempt, if any.
    pub value: Option<T>,
    /// Errors of every failed attempt, in order.
    pub failures: Vec<E>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn succeeded(&self) -> bool {
        self.value.is_some()
    }

    pub fn attempts(&self) -> u32 {
        self.failures.len() as u32 + u32::from(self.value.is_some())
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration, timeout: Duration) -> Self {
        Self {
            attempts,
            interval,
            timeout,
        }
    }

    /// Attempts actually made; a policy of zero still tries once.
    pub fn effective_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Upper bound on wall time spent inside `run`, assuming each attempt
    /// honours `timeout`.
    pub fn max_wait(&self) -> Duration {
        let n = self.effective_attempts();
        self.timeout * n + self.interval * (n - 1)
    }

    /// Run `attempt` until it succeeds or the attempt budget is spent.
    ///
    /// `attempt` receives the 1-based attempt number. There is no sleep
    /// after the final attempt.
    pub async fn run<T, E, F, Fut>(&self, mut attempt: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let total = self.effective_attempts();
        let mut failures = Vec::new();

        for n in 1..=total {
            match attempt(n).await {
                Ok(value) => {
                    return RetryOutcome {
                        value: Some(value),
                        failures,
                    };
                }
                Err(e) => {
                    failures.push(e);
                    if n < total && !self.interval.is_zero() {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        RetryOutcome {
            value: None,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<u32, ()> = fast(5)
            .run(|n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if n == 2 { Ok(n) } else { Err(()) } }
            })
            .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.value, Some(2));
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_exact_budget() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<(), u32> = fast(3)
            .run(|n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(n) }
            })
            .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.failures, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let outcome: RetryOutcome<(), ()> = fast(0).run(|_| async { Err(()) }).await;
        assert_eq!(outcome.attempts(), 1);
    }

    #[test]
    fn max_wait_bounds_total_time() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(policy.max_wait(), Duration::from_secs(35));
    }
}
