use crate::error::BunnyError;
use std::future::Future;
use std::time::Duration;

/// Runs `op` up to `attempts` times with a fixed `delay` between tries,
/// returning the first success or the last error. The generic shape behind
/// both the solver's SQL-execution retry (3 attempts, 60s) and the task
/// API's submission retry (4 attempts, 5s) — one combinator, two constants,
/// rather than two bespoke copies of the same loop.
pub async fn with_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, BunnyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BunnyError>>,
{
    let mut last_err = None;
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, attempts, %err, "operation failed, will retry");
                last_err = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, BunnyError> = with_retry(3, Duration::from_millis(1), move || {
            let calls = calls2.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result: Result<i32, BunnyError> = with_retry(3, Duration::from_millis(1), move || {
            let calls = calls2.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(BunnyError::SqlExecution("transient".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let result: Result<i32, BunnyError> =
            with_retry(2, Duration::from_millis(1), || async {
                Err(BunnyError::SqlExecution("still broken".into()))
            })
            .await;
        assert!(result.is_err());
    }
}
