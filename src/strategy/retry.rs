//! Bounded retry with exponential backoff for a single tier

use std::future::Future;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RetryPolicy;
use crate::error::{FetchError, Result};

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts run out. `op` receives the zero-based attempt number.
///
/// Only [`FetchError::is_retryable`] errors are retried. Backoff sleeps race
/// `cancel`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(FetchError::Aborted);
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let delay = policy.delay_for(attempt);
                debug!(
                    "Attempt {}/{attempts} failed ({e}), retrying in {}ms",
                    attempt + 1,
                    delay.as_millis()
                );
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(FetchError::Aborted),
                    () = sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_retry_with_growing_delay() {
        let starts = Mutex::new(Vec::new());
        let result: Result<()> = with_retry(&policy(), &CancellationToken::new(), |_| {
            starts.lock().unwrap().push(Instant::now());
            async { Err(FetchError::network("HTTP 500")) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Network(_))));
        let starts = starts.into_inner().unwrap();
        assert_eq!(starts.len(), 3);
        let first_gap = starts[1] - starts[0];
        let second_gap = starts[2] - starts[1];
        assert!(first_gap >= Duration::from_millis(500));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_and_timeout_are_attempted_once() {
        for err in [
            FetchError::blocked("403", Some(403)),
            FetchError::timeout("slow"),
            FetchError::security("loop"),
        ] {
            let mut calls = 0;
            let result: Result<()> = with_retry(&policy(), &CancellationToken::new(), |_| {
                calls += 1;
                let err = err.clone();
                async move { Err(err) }
            })
            .await;
            assert_eq!(result.unwrap_err(), err);
            assert_eq!(calls, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let result = with_retry(&policy(), &CancellationToken::new(), |attempt| async move {
            if attempt == 0 {
                Err(FetchError::network("reset"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut calls = 0;
        let result: Result<()> = with_retry(&policy(), &cancel, |_| {
            calls += 1;
            trigger.cancel();
            async { Err(FetchError::network("reset")) }
        })
        .await;
        assert_eq!(result, Err(FetchError::Aborted));
        assert_eq!(calls, 1);
    }
}
