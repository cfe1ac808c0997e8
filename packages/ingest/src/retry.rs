//! Retry with exponential backoff.
//!
//! Policy is driven entirely by [`ErrorKind`]: only `Transient` failures are
//! retried. A server-provided retry-after hint overrides the computed delay
//! when it is larger.

use std::future::Future;
use std::time::Duration;

use vidlore_shared::{ErrorKind, Result, RetryConfig};

/// Run `op`, retrying transient failures with capped exponential backoff.
///
/// After `max_retries` additional attempts the last error is returned
/// unchanged.
pub async fn with_backoff<T, F, Fut>(config: &RetryConfig, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if err.kind() != ErrorKind::Transient || attempt >= config.max_retries {
                    return Err(err);
                }
                let backoff = (config.base_delay_secs * 2f64.powi(attempt as i32))
                    .min(config.max_delay_secs);
                // The server's hint wins when it asks for more patience.
                let delay = match err.retry_after_secs() {
                    Some(hint) => backoff.max(hint as f64),
                    None => backoff,
                };
                tracing::warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_secs = delay,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vidlore_shared::VidloreError;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay_secs: 0.001,
            max_delay_secs: 0.01,
        }
    }

    fn transient() -> VidloreError {
        VidloreError::Completion {
            message: "overloaded".into(),
            status: Some(503),
            retry_after_secs: None,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.expect("succeeds"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;
        assert!(result.is_err());
        // Initial attempt + three retries.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(VidloreError::validation("bad input"))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hard_block_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(VidloreError::SourceBlocked {
                    message: "ip banned".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
