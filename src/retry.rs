//! Retry policy: backoff computation, retryability classification and the
//! control loop connectors run their requests in.
//!
//! [`compute_backoff`] and [`is_retryable`] are pure; the random source used
//! for jitter is supplied by the caller so that tests can seed it.
//! [`Retrier`] ties both together with cancellation.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::connectors::ProviderError;
use crate::error::{Error, Result};

/// Fraction of the base delay added or removed at random
pub const JITTER: f64 = 0.2;

/// Exponent cap; `min_backoff * 2^32` already saturates any sane maximum.
const MAX_EXPONENT: u32 = 32;

/// Status codes retried by default: 429, 500, 502, 503 and 504
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    pub min_backoff: Duration,
    /// Upper bound on the delay before jitter is applied
    pub max_backoff: Duration,
    /// Failure signals (HTTP status codes) worth retrying
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            retryable_statuses: BTreeSet::from(DEFAULT_RETRY_STATUSES),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            retryable_statuses: BTreeSet::new(),
            ..Default::default()
        }
    }
}

/// The delay to wait before retrying after the failed attempt `attempt`
/// (0-indexed).
///
/// The base delay is `min(max_backoff, min_backoff * 2^attempt)`; the result
/// is the base plus or minus up to [`JITTER`] of itself, never negative.
pub fn compute_backoff<R: Rng + ?Sized>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> Duration {
    let exponent = attempt.min(MAX_EXPONENT) as i32;
    let max = policy.max_backoff.as_secs_f64();

    let base = (policy.min_backoff.as_secs_f64() * 2f64.powi(exponent)).min(max);
    let jitter = base * JITTER * rng.gen_range(-1.0..=1.0);

    Duration::try_from_secs_f64((base + jitter).max(0.0)).unwrap_or(policy.max_backoff)
}

/// Whether a failure with the given signal should be retried under `policy`.
pub fn is_retryable(status: u16, policy: &RetryPolicy) -> bool {
    policy.retryable_statuses.contains(&status)
}

/// Runs an operation until it succeeds, fails permanently, runs out of
/// retries or is cancelled.
pub struct Retrier {
    policy: RetryPolicy,
    rng: StdRng,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Retrier {
        Retrier {
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    /// A retrier whose jitter is reproducible
    pub fn with_seed(policy: RetryPolicy, seed: u64) -> Retrier {
        Retrier {
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Calls `op` with the attempt number until it succeeds.
    ///
    /// A failure whose status is not retryable is returned as
    /// [`Error::Provider`]. A retryable failure on the last permitted attempt
    /// becomes [`Error::RetryBudgetExhausted`]. Cancellation is checked before
    /// each attempt and raced against both the attempt and the backoff sleep.
    pub async fn run<T, F, Fut>(&mut self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::CancellationRequested);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::CancellationRequested),
                outcome = op(attempt) => outcome,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retryable = err
                .status()
                .is_some_and(|status| is_retryable(status, &self.policy));

            if !retryable {
                return Err(Error::Provider(err));
            }

            if attempt >= self.policy.max_retries {
                tracing::warn!(attempts = attempt + 1, error = %err, "retry budget exhausted");

                return Err(Error::RetryBudgetExhausted {
                    attempts: attempt + 1,
                    last: err,
                });
            }

            let delay = compute_backoff(attempt, &self.policy, &mut self.rng);

            tracing::debug!(attempt, ?delay, error = %err, "retrying after failure");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::CancellationRequested),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..Default::default()
        }
    }

    #[test]
    fn backoff_is_bounded() {
        let policy = RetryPolicy::default();
        let ceiling = policy.max_backoff.mul_f64(1.0 + JITTER);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);

            for attempt in [0, 1, 2, 5, 10, 31, 32, 64, u32::MAX] {
                let delay = compute_backoff(attempt, &policy, &mut rng);

                assert!(delay <= ceiling, "attempt {attempt}: {delay:?}");
            }
        }
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for (attempt, base_ms) in [(0, 100.0), (1, 200.0), (2, 400.0), (3, 800.0), (8, 5000.0)] {
            let delay = compute_backoff(attempt, &policy, &mut rng).as_secs_f64() * 1000.0;

            assert!(delay >= base_ms * (1.0 - JITTER) - 1e-6, "{attempt}: {delay}");
            assert!(delay <= base_ms * (1.0 + JITTER) + 1e-6, "{attempt}: {delay}");
        }
    }

    #[test]
    fn backoff_with_zero_minimum_is_zero() {
        let policy = RetryPolicy {
            min_backoff: Duration::ZERO,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);

        for attempt in [0, 40, u32::MAX] {
            assert_eq!(compute_backoff(attempt, &policy, &mut rng), Duration::ZERO);
        }
    }

    #[test]
    fn backoff_is_reproducible_with_a_seed() {
        let policy = RetryPolicy::default();

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..6)
                .map(|attempt| compute_backoff(attempt, &policy, &mut rng))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn classification() {
        let policy = RetryPolicy::default();

        assert!(is_retryable(429, &policy));
        assert!(is_retryable(503, &policy));
        assert!(!is_retryable(400, &policy));
        assert!(!is_retryable(401, &policy));

        let never = RetryPolicy::none();
        assert!(!is_retryable(429, &never));
        assert!(!is_retryable(503, &never));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let mut retrier = Retrier::with_seed(fast_policy(3), 0);

        let result = retrier
            .run(&CancellationToken::new(), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(ProviderError::from_status(503, "overloaded"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let mut retrier = Retrier::with_seed(fast_policy(3), 0);

        let result: Result<()> = retrier
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::from_status(401, "bad key")) }
            })
            .await;

        match result {
            Err(Error::Provider(err)) => assert!(matches!(err.kind(), ErrorKind::Authentication)),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_without_a_status_are_not_retried() {
        let calls = AtomicU32::new(0);
        let mut retrier = Retrier::with_seed(fast_policy(3), 0);

        let result: Result<()> = retrier
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::from_kind(ErrorKind::Connection)) }
            })
            .await;

        assert!(matches!(result, Err(Error::Provider(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_is_terminal() {
        let calls = AtomicU32::new(0);
        let mut retrier = Retrier::with_seed(fast_policy(2), 0);

        let result: Result<()> = retrier
            .run(&CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::from_status(429, "slow down")) }
            })
            .await;

        match result {
            Err(Error::RetryBudgetExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last.status(), Some(429));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_before_the_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let calls = AtomicU32::new(0);
        let mut retrier = Retrier::new(fast_policy(3));

        let result: Result<()> = retrier
            .run(&cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(Error::CancellationRequested)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_while_backing_off() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_retries: 10,
            min_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
            ..Default::default()
        };
        let mut retrier = Retrier::with_seed(policy, 0);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let result: Result<()> = retrier
            .run(&cancel, |_| async {
                Err(ProviderError::from_status(503, "overloaded"))
            })
            .await;

        canceller.await.unwrap();
        assert!(matches!(result, Err(Error::CancellationRequested)));
    }

    #[tokio::test]
    async fn cancelled_during_an_attempt() {
        let cancel = CancellationToken::new();
        let mut retrier = Retrier::with_seed(fast_policy(0), 0);

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let result: Result<()> = retrier
            .run(&cancel, |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        canceller.await.unwrap();
        assert!(matches!(result, Err(Error::CancellationRequested)));
    }
}
