//! Lazy, pull-based message iteration
//!
//! Pages are requested only when the consumer has drained the previous one,
//! and nothing is prefetched. Dropping the stream stops all further requests.

use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::hydration::fetch_or_minimal;
use crate::models::Email;
use crate::resources::{messages, ListParams, MessageFormat};
use crate::safe;
use crate::transport::{dispatch, Connector};

pub type EmailStream = Pin<Box<dyn Stream<Item = Result<Email>> + Send>>;

/// Restartable description of a message walk. Every call to
/// [`stream`](Self::stream) starts a fresh cursor.
#[derive(Clone)]
pub struct MessageStream {
    connector: Option<Arc<dyn Connector>>,
    params: ListParams,
    full_details: bool,
    format: MessageFormat,
    safe_operation: Option<String>,
}

impl MessageStream {
    pub fn new(
        connector: Arc<dyn Connector>,
        mut params: ListParams,
        page_size: u32,
        full_details: bool,
    ) -> Self {
        params.max_results = Some(page_size.max(1));
        Self {
            connector: Some(connector),
            params,
            full_details,
            format: MessageFormat::Full,
            safe_operation: None,
        }
    }

    /// A stream that yields nothing
    pub fn empty() -> Self {
        Self {
            connector: None,
            params: ListParams::default(),
            full_details: false,
            format: MessageFormat::Full,
            safe_operation: None,
        }
    }

    pub fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    /// End the stream quietly on failure (logged under `operation`) instead of yielding the error
    pub fn into_safe(mut self, operation: &str) -> Self {
        self.safe_operation = Some(operation.to_string());
        self
    }

    pub fn stream(&self) -> EmailStream {
        let Some(connector) = self.connector.clone() else {
            return Box::pin(futures::stream::empty());
        };
        let params = self.params.clone();
        let full_details = self.full_details;
        let format = self.format;
        let safe_operation = self.safe_operation.clone();

        Box::pin(stream! {
            let mut page_token = params.page_token.clone();
            let mut page_number = 0usize;

            loop {
                page_number += 1;
                let request = messages::list(&ListParams {
                    page_token: page_token.take(),
                    ..params.clone()
                });

                let page = match dispatch(connector.as_ref(), request, &messages::collection()).await {
                    Ok(page) => page,
                    Err(error) => {
                        match &safe_operation {
                            Some(operation) => safe::report(operation, &error),
                            None => {
                                yield Err(error);
                            }
                        }
                        break;
                    }
                };

                page_token = page
                    .get("nextPageToken")
                    .and_then(Value::as_str)
                    .filter(|token| !token.is_empty())
                    .map(str::to_string);

                let references = page
                    .get("messages")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                debug!(page = page_number, items = references.len(), "Streaming message page");

                for reference in references {
                    let minimal = match Email::from_reference(&reference) {
                        Ok(minimal) => minimal,
                        Err(error) => {
                            match &safe_operation {
                                Some(operation) => safe::report(operation, &error),
                                None => {
                                    yield Err(error);
                                }
                            }
                            continue;
                        }
                    };

                    if full_details {
                        yield Ok(fetch_or_minimal(connector.as_ref(), minimal, format).await);
                    } else {
                        yield Ok(minimal);
                    }
                }

                if page_token.is_none() {
                    break;
                }
            }
        })
    }
}
