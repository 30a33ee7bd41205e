//! Cursor-driven page fetcher
//!
//! A [`Paginator`] owns one request shape and walks it page by page using
//! `nextPageToken`. Raw items accumulate across pages; the item parser turns
//! them into entities, so one engine serves messages, labels, or anything else
//! listed under a JSON key.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ResourceRef, Result};
use crate::safe;
use crate::transport::{dispatch, ApiRequest, Connector};

pub type ItemParser<T> = Arc<dyn Fn(&Value) -> Result<T> + Send + Sync>;

pub struct Paginator<T> {
    connector: Arc<dyn Connector>,
    request: ApiRequest,
    target: ResourceRef,
    item_key: String,
    page_size: usize,
    parser: ItemParser<T>,
    items: Vec<Value>,
    next_page_token: Option<String>,
    exhausted: bool,
    /// When set, fetch failures are logged under this operation name and end the walk
    safe_operation: Option<String>,
}

impl<T> Paginator<T> {
    pub fn new<P>(
        connector: Arc<dyn Connector>,
        request: ApiRequest,
        target: ResourceRef,
        item_key: &str,
        page_size: u32,
        parser: P,
    ) -> Self
    where
        P: Fn(&Value) -> Result<T> + Send + Sync + 'static,
    {
        let next_page_token = request.query_value("pageToken").map(str::to_string);
        Self {
            connector,
            request,
            target,
            item_key: item_key.to_string(),
            page_size: page_size.max(1) as usize,
            parser: Arc::new(parser),
            items: Vec::new(),
            next_page_token,
            exhausted: false,
            safe_operation: None,
        }
    }

    /// Swallow fetch failures: log them, then behave as if the cursor ran out
    pub fn into_safe(mut self, operation: &str) -> Self {
        self.safe_operation = Some(operation.to_string());
        self
    }

    /// A paginator that never fetches and holds nothing
    pub fn into_exhausted(mut self) -> Self {
        self.items.clear();
        self.next_page_token = None;
        self.exhausted = true;
        self
    }

    /// Fetch the next page and return its parsed items.
    ///
    /// Returns an empty list without any request once the cursor is exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<T>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let mut request = self.request.clone();
        match &self.next_page_token {
            Some(token) => request.set_query("pageToken", token),
            None => request.remove_query("pageToken"),
        }

        let response = match dispatch(self.connector.as_ref(), request, &self.target).await {
            Ok(response) => response,
            Err(error) => match &self.safe_operation {
                Some(operation) => {
                    safe::report(operation, &error);
                    self.exhausted = true;
                    self.next_page_token = None;
                    return Ok(Vec::new());
                }
                None => return Err(error),
            },
        };

        let fetched = match response.get(&self.item_key) {
            Some(Value::Array(items)) => {
                self.items.extend(items.iter().cloned());
                items.len()
            }
            Some(other) => {
                warn!(
                    item_key = %self.item_key,
                    "Ignoring page whose item field is not a list: {}",
                    other
                );
                0
            }
            // An empty page omits the key entirely
            None => 0,
        };

        self.next_page_token = response
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        self.exhausted = self.next_page_token.is_none();

        debug!(
            item_key = %self.item_key,
            fetched,
            accumulated = self.items.len(),
            has_more = !self.exhausted,
            "Fetched page"
        );

        let take = fetched.min(self.page_size);
        let start = self.items.len() - take;
        self.items[start..]
            .iter()
            .map(|item| (self.parser)(item))
            .collect()
    }

    /// Drain the cursor and return everything accumulated so far
    pub async fn all_pages(&mut self) -> Result<Vec<T>> {
        while !self.exhausted {
            self.next_page().await?;
        }
        self.items()
    }

    pub fn has_more_pages(&self) -> bool {
        !self.exhausted
    }

    pub fn page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }

    /// Parsed view of every item accumulated so far
    pub fn items(&self) -> Result<Vec<T>> {
        self.items.iter().map(|item| (self.parser)(item)).collect()
    }

    pub fn raw_items(&self) -> &[Value] {
        &self.items
    }

    /// Re-wrap the accumulated raw items as `{item_key: [...]}` and hand them
    /// to a collection-level parser
    pub fn transform_using<U, F>(&self, parser: F) -> Result<U>
    where
        F: FnOnce(&Value) -> Result<U>,
    {
        let mut wrapped = json!({});
        wrapped[self.item_key.as_str()] = Value::Array(self.items.clone());
        parser(&wrapped)
    }
}
