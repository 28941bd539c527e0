use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

/// Backoff curve for transient transactional conflicts: exponential with
/// jitter, bounded by a retry count rather than elapsed time.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries:          u32,
    pub initial_interval:     Duration,
    pub max_interval:         Duration,
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries:          3,
            initial_interval:     Duration::from_millis(100),
            max_interval:         Duration::from_secs(2),
            randomization_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    fn to_backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `op`, retrying failures `is_transient` accepts with jittered
/// exponential delays until `policy.max_retries` retries are spent; the
/// last error then surfaces. Errors the predicate refuses surface at once.
pub async fn with_retry<T, E, Fut, Op, Pred>(
    policy: &RetryPolicy,
    is_transient: Pred,
    op: Op,
) -> Result<T, E>
where
    Op: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Pred: Fn(&E) -> bool,
{
    let retries_spent = AtomicU32::new(0);
    backoff::future::retry(policy.to_backoff(), || async {
        op().await.map_err(|error| {
            if is_transient(&error)
                && retries_spent.fetch_add(1, Ordering::Relaxed)
                    < policy.max_retries
            {
                trace!("transient failure, will retry");
                backoff::Error::transient(error)
            } else {
                backoff::Error::permanent(error)
            }
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            ..RetryPolicy::default()
        }
    }

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(
            &fast_policy(),
            |error| *error == TestError::Transient,
            || async {
                if calls.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            },
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &fast_policy(),
            |error| *error == TestError::Transient,
            || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(TestError::Transient)
            },
        )
        .await;
        assert_eq!(result, Err(TestError::Transient));
        // initial attempt plus max_retries retries
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn test_fatal_errors_surface_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(
            &fast_policy(),
            |error| *error == TestError::Transient,
            || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(TestError::Fatal)
            },
        )
        .await;
        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
