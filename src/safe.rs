//! Catch-log-fallback wrapper behind every `safe_*` operation
//!
//! Not-found errors are expected and only logged at debug level; every other
//! failure is logged as a structured warning before the fallback is returned.

use std::future::Future;
use tracing::{debug, warn};

use crate::error::{GmailError, Result};

/// Maximum characters of error context included in a warning
const CONTEXT_LIMIT: usize = 200;

pub async fn safe_call<T, F>(operation: &str, fallback: T, call: F) -> T
where
    F: Future<Output = Result<T>>,
{
    match call.await {
        Ok(value) => value,
        Err(error) => {
            report(operation, &error);
            fallback
        }
    }
}

/// Like [`safe_call`], building the fallback only when it is needed
pub async fn safe_call_with<T, F, D>(operation: &str, fallback: D, call: F) -> T
where
    F: Future<Output = Result<T>>,
    D: FnOnce() -> T,
{
    match call.await {
        Ok(value) => value,
        Err(error) => {
            report(operation, &error);
            fallback()
        }
    }
}

/// Log a swallowed error the way the safe surface does
pub fn report(operation: &str, error: &GmailError) {
    if error.is_not_found() {
        debug!(operation = operation, error = %error, "Resource not found, returning fallback");
        return;
    }

    let context = error
        .record()
        .map(|record| truncate(&serde_json::Value::Object(record.context.clone()).to_string()))
        .unwrap_or_default();

    warn!(
        operation = operation,
        error_kind = error.kind_name(),
        error = %error,
        context = %context,
        "Gmail operation failed, returning fallback"
    );
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= CONTEXT_LIMIT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(CONTEXT_LIMIT).collect();
    truncated.push_str("...");
    truncated
}
