//! Detail fetches for pages of bare message references
//!
//! A list call only returns `{id, threadId}` pairs. When callers want full
//! messages, each one needs its own `messages.get`. Those fetches run in
//! bounded concurrent batches, and a failed fetch degrades that one item to
//! its minimal form instead of failing the page.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::PerformanceConfig;
use crate::error::Result;
use crate::models::Email;
use crate::resources::{messages, MessageFormat};
use crate::transport::{dispatch, Connector};

#[derive(Debug, Clone)]
pub struct HydrationSettings {
    /// Concurrent batches when true, strictly sequential fetches when false
    pub enabled: bool,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub batch_delay: Duration,
    pub format: MessageFormat,
}

impl HydrationSettings {
    pub fn from_config(performance: &PerformanceConfig) -> Self {
        Self {
            enabled: performance.enable_batching,
            batch_size: performance.batch_size.max(1),
            max_concurrent: performance.max_concurrent_requests.max(1),
            batch_delay: performance.batch_delay(),
            format: MessageFormat::Full,
        }
    }
}

impl Default for HydrationSettings {
    fn default() -> Self {
        Self::from_config(&PerformanceConfig::default())
    }
}

/// Fetch and parse one message
pub async fn fetch_message(
    connector: &dyn Connector,
    id: &str,
    format: MessageFormat,
) -> Result<Email> {
    let value = dispatch(connector, messages::get(id, format), &messages::target(id)).await?;
    Email::from_api_response(&value)
}

/// Fetch details for `minimal`, handing it back unchanged if the fetch fails
pub(crate) async fn fetch_or_minimal(
    connector: &dyn Connector,
    minimal: Email,
    format: MessageFormat,
) -> Email {
    match fetch_message(connector, &minimal.id, format).await {
        Ok(email) => email,
        Err(error) => {
            warn!(
                message_id = %minimal.id,
                error_kind = error.kind_name(),
                error = %error,
                "Failed to fetch message details, using minimal data"
            );
            minimal
        }
    }
}

pub struct BatchHydrator {
    connector: Arc<dyn Connector>,
    settings: HydrationSettings,
}

impl BatchHydrator {
    pub fn new(connector: Arc<dyn Connector>, settings: HydrationSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    pub fn settings(&self) -> &HydrationSettings {
        &self.settings
    }

    /// Hydrate a page of minimal emails, preserving page order.
    ///
    /// Without `full_details` the page is returned as-is and nothing is fetched.
    pub async fn hydrate(&self, page: Vec<Email>, full_details: bool) -> Vec<Email> {
        if !full_details || page.is_empty() {
            return page;
        }

        if !self.settings.enabled {
            return self.hydrate_sequential(page).await;
        }

        let connector = self.connector.as_ref();
        let format = self.settings.format;
        let batch_size = self.settings.batch_size.max(1);
        let mut hydrated = Vec::with_capacity(page.len());

        for (index, batch) in page.chunks(batch_size).enumerate() {
            if index > 0 && !self.settings.batch_delay.is_zero() {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            debug!(batch = index + 1, size = batch.len(), "Hydrating message batch");

            // buffered keeps results in input order
            let results: Vec<Email> = stream::iter(batch.iter().cloned())
                .map(|minimal| fetch_or_minimal(connector, minimal, format))
                .buffered(self.settings.max_concurrent.max(1))
                .collect()
                .await;
            hydrated.extend(results);
        }

        hydrated
    }

    async fn hydrate_sequential(&self, page: Vec<Email>) -> Vec<Email> {
        let mut hydrated = Vec::with_capacity(page.len());
        for minimal in page {
            hydrated.push(fetch_or_minimal(self.connector.as_ref(), minimal, self.settings.format).await);
        }
        hydrated
    }
}
