//! Exponential backoff with jitter for provider adapter retries.
//!
//! Generalized from the teacher's `gateway/heartbeat.rs` backoff formula
//! (`base * 2^errors`, capped) to the spec's `250ms base + jitter`, bounded
//! retry count, and retry-eligibility gated on the error classification in
//! `crate::error::ProviderError::is_retryable`.

use crate::config::ProviderPolicy;
use crate::error::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff delay before retry attempt `attempt` (0-indexed): `base * 2^attempt`
/// plus up to 50% jitter.
pub fn backoff_duration(base_ms: u64, attempt: u32) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let jitter_fraction = rand::rng().random_range(0.0..0.5);
    let jittered = exp as f64 * (1.0 + jitter_fraction);
    Duration::from_millis(jittered as u64)
}

/// Run `op`, retrying on retryable `ProviderError`s per `policy`, with a
/// timeout applied to each attempt.
pub async fn with_retry<T, F, Fut>(policy: &ProviderPolicy, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let timeout = Duration::from_secs(policy.timeout_seconds);
    let mut attempt = 0u32;

    loop {
        let result = tokio::time::timeout(timeout, op()).await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(ProviderError::Timeout(timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = backoff_duration(policy.backoff_base_ms, attempt);
                tracing::warn!(attempt, ?delay, "retrying provider call after error: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn backoff_grows_exponentially_with_base() {
        let d0 = backoff_duration(250, 0).as_millis();
        let d1 = backoff_duration(250, 1).as_millis();
        // d0 in [250, 375), d1 in [500, 750) -- non-overlapping ranges.
        assert!(d0 < 375);
        assert!(d1 >= 500);
    }

    #[tokio::test]
    async fn retries_only_on_retryable_errors() {
        let policy = ProviderPolicy {
            timeout_seconds: 1,
            max_retries: 2,
            backoff_base_ms: 1,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), ProviderError> = with_retry(&policy, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Input("bad request".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "4xx must not be retried");
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_max() {
        let policy = ProviderPolicy {
            timeout_seconds: 1,
            max_retries: 2,
            backoff_base_ms: 1,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: Result<(), ProviderError> = with_retry(&policy, || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::Unavailable("connection refused".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "initial attempt + 2 retries");
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let policy = ProviderPolicy {
            timeout_seconds: 1,
            max_retries: 2,
            backoff_base_ms: 1,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result = with_retry(&policy, || {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ProviderError::Unavailable("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }
}
