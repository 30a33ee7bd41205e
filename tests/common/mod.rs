//! Common test utilities and fixtures
#![allow(dead_code)]

use gmail_client::error::Result;
use gmail_client::models::Token;
use gmail_client::transport::{ApiRequest, ApiResponse, Connector};
use gmail_client::{Config, GmailClient};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;

mock! {
    pub Api {}

    #[async_trait::async_trait]
    impl Connector for Api {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
        async fn authenticate(&self, token: Token);
    }
}

/// Client over a mocked connector with default configuration
pub fn client_with(api: MockApi) -> GmailClient {
    GmailClient::new(Arc::new(api), Config::default())
}

/// `{id, threadId}` pair as returned by messages.list
pub fn reference(id: &str) -> Value {
    json!({"id": id, "threadId": format!("thread_{}", id)})
}

/// A messages.list page
pub fn list_page(ids: &[&str], next_page_token: Option<&str>) -> Value {
    let mut page = json!({
        "messages": ids.iter().map(|id| reference(id)).collect::<Vec<_>>(),
        "resultSizeEstimate": ids.len(),
    });
    if let Some(token) = next_page_token {
        page["nextPageToken"] = json!(token);
    }
    page
}

/// Full message resource with a text/plain body
pub fn full_message(id: &str, from: &str, subject: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("thread_{}", id),
        "labelIds": ["INBOX", "UNREAD"],
        "snippet": format!("Snippet for {}", id),
        "internalDate": "1700000000000",
        "sizeEstimate": 2048,
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                {"name": "From", "value": from},
                {"name": "To", "value": "me@example.com"},
                {"name": "Subject", "value": subject}
            ],
            "body": {"data": "SGVsbG8gd29ybGQ"}
        }
    })
}

/// True for a messages.get request for `id`
pub fn is_get(request: &ApiRequest, id: &str) -> bool {
    request.path == format!("/users/me/messages/{}", id)
}

pub fn is_list(request: &ApiRequest) -> bool {
    request.path == "/users/me/messages"
}

pub fn ok(body: Value) -> Result<ApiResponse> {
    Ok(ApiResponse::new(200, body))
}

pub fn status(code: u16) -> Result<ApiResponse> {
    Ok(ApiResponse::new(code, json!({"error": {"code": code, "message": "mock failure"}})))
}
