use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::compose::EmailDraft;
use crate::config::Config;
use crate::error::Result;
use crate::hydration::{fetch_message, BatchHydrator, HydrationSettings};
use crate::models::label::{INBOX, STARRED, UNREAD};
use crate::models::Email;
use crate::pagination::Paginator;
use crate::resources::{messages, ListParams, MessageFormat};
use crate::safe::{safe_call, safe_call_with};
use crate::streaming::MessageStream;
use crate::transport::{dispatch, Connector};

/// Options shared by every message listing flavor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub query: Option<String>,
    pub label_ids: Vec<String>,
    /// Page size; falls back to the configured default and is capped at the configured max
    pub max_results: Option<u32>,
    pub include_spam_trash: bool,
    /// Fetch every message's details instead of returning `{id, threadId}` only
    pub full_details: bool,
    pub page_token: Option<String>,
}

impl ListOptions {
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn label(mut self, label_id: impl Into<String>) -> Self {
        self.label_ids.push(label_id.into());
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn full_details(mut self) -> Self {
        self.full_details = true;
        self
    }

    pub fn page_token(mut self, token: impl Into<String>) -> Self {
        self.page_token = Some(token.into());
        self
    }
}

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Email>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: Option<u64>,
}

impl MessagePage {
    pub fn has_more(&self) -> bool {
        self.next_page_token.is_some()
    }
}

pub struct MessageService {
    connector: Arc<dyn Connector>,
    config: Arc<Config>,
    hydrator: BatchHydrator,
}

impl MessageService {
    pub fn new(connector: Arc<dyn Connector>, config: Arc<Config>) -> Self {
        let hydrator = BatchHydrator::new(
            connector.clone(),
            HydrationSettings::from_config(&config.performance),
        );
        Self {
            connector,
            config,
            hydrator,
        }
    }

    fn list_params(&self, options: &ListOptions) -> ListParams {
        ListParams {
            query: options.query.clone(),
            label_ids: options.label_ids.clone(),
            max_results: Some(self.config.pagination.page_size(options.max_results)),
            page_token: options.page_token.clone(),
            include_spam_trash: options.include_spam_trash,
        }
    }

    pub async fn list(&self, options: &ListOptions) -> Result<Vec<Email>> {
        Ok(self.list_page(options).await?.messages)
    }

    /// One page of messages plus its cursor
    pub async fn list_page(&self, options: &ListOptions) -> Result<MessagePage> {
        let params = self.list_params(options);
        let response = dispatch(
            self.connector.as_ref(),
            messages::list(&params),
            &messages::collection(),
        )
        .await?;

        let references = parse_references(&response)?;
        debug!(
            count = references.len(),
            full_details = options.full_details,
            "Listed messages"
        );

        Ok(MessagePage {
            messages: self.hydrator.hydrate(references, options.full_details).await,
            next_page_token: response
                .get("nextPageToken")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            result_size_estimate: response.get("resultSizeEstimate").and_then(Value::as_u64),
        })
    }

    /// Cursor over minimal messages; pass pages through [`hydrate`](Self::hydrate) for details
    pub fn paginate(&self, options: &ListOptions) -> Paginator<Email> {
        let params = self.list_params(options);
        let page_size = params.max_results.unwrap_or(self.config.pagination.default_page_size);
        Paginator::new(
            self.connector.clone(),
            messages::list(&params),
            messages::collection(),
            "messages",
            page_size,
            Email::from_reference,
        )
    }

    /// Lazy walk over every matching message, one page in memory at a time
    pub fn lazy(&self, options: &ListOptions) -> MessageStream {
        let params = self.list_params(options);
        let page_size = params.max_results.unwrap_or(self.config.pagination.default_page_size);
        MessageStream::new(self.connector.clone(), params, page_size, options.full_details)
    }

    /// Fetch details for minimal emails using the configured batching
    pub async fn hydrate(&self, emails: Vec<Email>) -> Vec<Email> {
        self.hydrator.hydrate(emails, true).await
    }

    pub async fn get(&self, id: &str) -> Result<Email> {
        self.get_with_format(id, MessageFormat::Full).await
    }

    pub async fn get_with_format(&self, id: &str, format: MessageFormat) -> Result<Email> {
        fetch_message(self.connector.as_ref(), id, format).await
    }

    /// Send a composed message. Recipients are validated before any request is made.
    pub async fn send(&self, draft: &EmailDraft) -> Result<Email> {
        let raw = draft.encode()?;
        let response = dispatch(
            self.connector.as_ref(),
            messages::send(&raw, draft.thread_id.as_deref()),
            &messages::collection(),
        )
        .await?;

        let sent = Email::from_api_response(&response)?;
        info!(message_id = %sent.id, "Sent message");
        Ok(sent)
    }

    /// Add and remove labels in one request; returns the message as the API now sees it
    pub async fn modify_labels(
        &self,
        id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<Email> {
        let response = dispatch(
            self.connector.as_ref(),
            messages::modify(id, add_label_ids, remove_label_ids),
            &messages::target(id),
        )
        .await?;
        Email::from_api_response(&response)
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<Email> {
        self.modify_labels(id, &[], &[UNREAD.to_string()]).await
    }

    pub async fn mark_as_unread(&self, id: &str) -> Result<Email> {
        self.modify_labels(id, &[UNREAD.to_string()], &[]).await
    }

    pub async fn star(&self, id: &str) -> Result<Email> {
        self.modify_labels(id, &[STARRED.to_string()], &[]).await
    }

    pub async fn unstar(&self, id: &str) -> Result<Email> {
        self.modify_labels(id, &[], &[STARRED.to_string()]).await
    }

    /// Remove from the inbox without deleting
    pub async fn archive(&self, id: &str) -> Result<Email> {
        self.modify_labels(id, &[], &[INBOX.to_string()]).await
    }

    pub async fn trash(&self, id: &str) -> Result<Email> {
        let response = dispatch(self.connector.as_ref(), messages::trash(id), &messages::target(id)).await?;
        Email::from_api_response(&response)
    }

    pub async fn untrash(&self, id: &str) -> Result<Email> {
        let response =
            dispatch(self.connector.as_ref(), messages::untrash(id), &messages::target(id)).await?;
        Email::from_api_response(&response)
    }

    /// Permanently delete a message
    pub async fn delete(&self, id: &str) -> Result<()> {
        dispatch(self.connector.as_ref(), messages::delete(id), &messages::target(id)).await?;
        info!(message_id = %id, "Deleted message");
        Ok(())
    }

    pub async fn safe_list(&self, options: &ListOptions) -> Vec<Email> {
        safe_call("list_messages", Vec::new(), self.list(options)).await
    }

    pub async fn safe_list_page(&self, options: &ListOptions) -> MessagePage {
        safe_call_with("list_messages", MessagePage::default, self.list_page(options)).await
    }

    pub async fn safe_get(&self, id: &str) -> Option<Email> {
        safe_call("get_message", None, async { self.get(id).await.map(Some) }).await
    }

    /// Paginator whose fetch failures are logged and end the walk
    pub fn safe_paginate(&self, options: &ListOptions) -> Paginator<Email> {
        self.paginate(options).into_safe("paginate_messages")
    }

    /// Lazy walk that ends quietly on failure
    pub fn safe_lazy(&self, options: &ListOptions) -> MessageStream {
        self.lazy(options).into_safe("lazy_messages")
    }
}

/// Minimal emails for a list response; an empty page omits `messages`
fn parse_references(response: &Value) -> Result<Vec<Email>> {
    response
        .get("messages")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(Email::from_reference).collect())
        .unwrap_or_else(|| Ok(Vec::new()))
}
