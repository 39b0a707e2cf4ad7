//! Bounded retry with exponential backoff.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How often and how patiently to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_retries: u32,
    /// Wait before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the wait after each retry
    pub backoff_factor: f64,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait between attempt `retry + 1` and `retry + 2`: `base_delay * backoff_factor^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.powi(retry.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if secs.is_finite() && secs >= 0.0 {
            Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
        } else {
            Duration::MAX
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            backoff_factor: 2.0,
        }
    }
}

/// A value together with the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempt_count: u32,
}

/// Why a retried operation finally gave up.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    Exhausted { last_cause: E, attempt_count: u32 },
    /// A non-retryable error ended the loop early
    Permanent { cause: E, attempt_count: u32 },
}

impl<E> RetryError<E> {
    pub fn attempt_count(&self) -> u32 {
        match self {
            Self::Exhausted { attempt_count, .. } | Self::Permanent { attempt_count, .. } => *attempt_count,
        }
    }

    pub fn cause(&self) -> &E {
        match self {
            Self::Exhausted { last_cause, .. } => last_cause,
            Self::Permanent { cause, .. } => cause,
        }
    }

    pub fn into_cause(self) -> E {
        match self {
            Self::Exhausted { last_cause, .. } => last_cause,
            Self::Permanent { cause, .. } => cause,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { last_cause, attempt_count } => {
                write!(f, "gave up after {} attempts: {}", attempt_count, last_cause)
            }
            Self::Permanent { cause, attempt_count } => {
                write!(f, "permanent failure on attempt {}: {}", attempt_count, cause)
            }
        }
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause())
    }
}

/// Runs a fallible async operation under a [`RetryPolicy`].
///
/// Backoff sleeps are `tokio::time::sleep`, so a waiting item never holds up
/// other workers.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// `operation` receives the 1-based attempt number. `is_retryable` decides
    /// which errors earn another attempt.
    pub async fn run<T, E, F, Fut, P>(&self, operation: F, is_retryable: P) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        self.run_with_hook(operation, is_retryable, |_, _, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_retry(failed_attempt, delay, error)`
    /// before each backoff sleep.
    pub async fn run_with_hook<T, E, F, Fut, P, H>(
        &self,
        mut operation: F,
        is_retryable: P,
        mut on_retry: H,
    ) -> Result<Attempted<T>, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        H: FnMut(u32, Duration, &E),
    {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return Ok(Attempted {
                        value,
                        attempt_count: attempt,
                    });
                }
                Err(err) if !is_retryable(&err) => {
                    return Err(RetryError::Permanent {
                        cause: err,
                        attempt_count: attempt,
                    });
                }
                Err(err) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        last_cause: err,
                        attempt_count: attempt,
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt - 1);
                    debug!("Attempt {}/{} failed, retrying in {:?}", attempt, max_attempts, delay);
                    on_retry(attempt, delay, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Failure {
        Transient,
        Permanent,
    }

    fn executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
        })
    }

    fn retryable(err: &Failure) -> bool {
        *err == Failure::Transient
    }

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.max_attempts(), 6);
    }

    #[tokio::test]
    async fn succeeds_after_k_failures() {
        for k in 0..=3 {
            let calls = AtomicU32::new(0);
            let result = executor(3)
                .run(
                    |_| {
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        async move { if n < k { Err(Failure::Transient) } else { Ok("done") } }
                    },
                    retryable,
                )
                .await
                .unwrap();

            assert_eq!(result.value, "done");
            assert_eq!(result.attempt_count, k + 1);
        }
    }

    #[tokio::test]
    async fn exhausts_after_max_retries_plus_one() {
        let calls = AtomicU32::new(0);
        let err = executor(2)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Failure::Transient) }
                },
                retryable,
            )
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(err.attempt_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_skip_the_budget() {
        let calls = AtomicU32::new(0);
        let err = executor(5)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(Failure::Permanent) }
                },
                retryable,
            )
            .await
            .unwrap_err();

        assert_eq!(err, RetryError::Permanent { cause: Failure::Permanent, attempt_count: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hook_sees_each_retry() {
        let mut seen = Vec::new();
        let _ = executor(2)
            .run_with_hook(
                |attempt| async move { Err::<(), _>((attempt, Failure::Transient)) },
                |(_, f)| *f == Failure::Transient,
                |attempt, delay, _| seen.push((attempt, delay)),
            )
            .await;

        assert_eq!(
            seen,
            vec![(1, Duration::from_millis(1)), (2, Duration::from_millis(2))]
        );
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let err = executor(0)
            .run(|_| async { Err::<(), _>(Failure::Transient) }, retryable)
            .await
            .unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempt_count(), 1);
    }
}
