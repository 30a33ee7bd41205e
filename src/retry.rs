//! Opt-in exponential backoff for service calls
//!
//! Services never retry on their own. Callers that want retries wrap the
//! call themselves:
//!
//! ```no_run
//! # async fn example(client: &gmail_client::GmailClient) -> gmail_client::Result<()> {
//! use gmail_client::retry::with_backoff;
//!
//! let policy = &client.config().backoff;
//! let labels = with_backoff(policy, "list_labels", || client.labels().list()).await?;
//! # Ok(())
//! # }
//! ```

use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::BackoffConfig;
use crate::error::{GmailError, Result};

/// Run `operation`, retrying transient failures per `policy`.
///
/// A rate-limit error waits the server's Retry-After instead of the computed
/// interval. Operations listed in `exempt_operations` run exactly once.
pub async fn with_backoff<T, F, Fut>(policy: &BackoffConfig, operation: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if policy.is_exempt(operation) {
        return f().await;
    }

    let schedule = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(policy.initial_delay_ms))
        .with_max_interval(Duration::from_millis(policy.max_delay_ms))
        .with_multiplier(policy.multiplier)
        .with_randomization_factor(if policy.jitter { 0.5 } else { 0.0 })
        .with_max_elapsed_time(None)
        .build();

    let max_retries = policy.max_retries;
    let mut attempts = 0u32;

    backoff::future::retry(schedule, || {
        attempts += 1;
        let attempt = attempts;
        let call = f();
        async move {
            call.await.map_err(|error| classify(error, operation, attempt, max_retries))
        }
    })
    .await
}

fn classify(error: GmailError, operation: &str, attempt: u32, max_retries: u32) -> backoff::Error<GmailError> {
    if !error.is_transient() || attempt > max_retries {
        return backoff::Error::permanent(error);
    }

    let retry_after = error.retry_after().map(Duration::from_secs);
    warn!(
        operation,
        attempt,
        max_attempts = max_retries + 1,
        error_kind = error.kind_name(),
        error = %error,
        "Transient failure, retrying"
    );
    backoff::Error::Transient {
        err: error,
        retry_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> BackoffConfig {
        BackoffConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            jitter: false,
            ..BackoffConfig::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_backoff(&fast_policy(), "list_messages", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GmailError::Network("connection reset".to_string()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_backoff(&fast_policy(), "get_message", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GmailError::not_found("message", "m1"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_backoff(&fast_policy(), "list_labels", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GmailError::Network("down".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(GmailError::Network(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exempt_operation_runs_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_backoff(&fast_policy(), "send_message", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GmailError::Network("timeout".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
