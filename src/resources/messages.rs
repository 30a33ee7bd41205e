use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ResourceRef;
use super::path_segment;
use crate::transport::ApiRequest;

const MESSAGES_PATH: &str = "/users/me/messages";

/// Projection requested from `messages.get`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Minimal,
    Metadata,
    #[default]
    Full,
    Raw,
}

impl MessageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFormat::Minimal => "minimal",
            MessageFormat::Metadata => "metadata",
            MessageFormat::Full => "full",
            MessageFormat::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Gmail search syntax, e.g. `is:unread after:2024/01/01`
    pub query: Option<String>,
    pub label_ids: Vec<String>,
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub include_spam_trash: bool,
}

pub fn target(id: &str) -> ResourceRef {
    ResourceRef::new("message", id)
}

pub fn collection() -> ResourceRef {
    ResourceRef::collection("message")
}

pub fn list(params: &ListParams) -> ApiRequest {
    let mut request = ApiRequest::get(MESSAGES_PATH);

    if let Some(query) = params.query.as_deref().filter(|q| !q.is_empty()) {
        request.add_query("q", query);
    }
    for label_id in &params.label_ids {
        request.add_query("labelIds", label_id);
    }
    if let Some(max_results) = params.max_results {
        request.add_query("maxResults", max_results);
    }
    if let Some(token) = &params.page_token {
        request.add_query("pageToken", token);
    }
    if params.include_spam_trash {
        request.add_query("includeSpamTrash", true);
    }
    request
}

pub fn get(id: &str, format: MessageFormat) -> ApiRequest {
    ApiRequest::get(format!("{}/{}", MESSAGES_PATH, path_segment(id)))
        .with_query("format", format.as_str())
}

/// `raw` is the base64url-encoded RFC 822 envelope
pub fn send(raw: &str, thread_id: Option<&str>) -> ApiRequest {
    let mut body = json!({ "raw": raw });
    if let Some(thread_id) = thread_id {
        body["threadId"] = json!(thread_id);
    }
    ApiRequest::post(format!("{}/send", MESSAGES_PATH), body)
}

/// One combined label change; empty add/remove lists are left out of the body
pub fn modify(id: &str, add_label_ids: &[String], remove_label_ids: &[String]) -> ApiRequest {
    let mut body = Map::new();
    if !add_label_ids.is_empty() {
        body.insert("addLabelIds".to_string(), json!(add_label_ids));
    }
    if !remove_label_ids.is_empty() {
        body.insert("removeLabelIds".to_string(), json!(remove_label_ids));
    }
    ApiRequest::post(
        format!("{}/{}/modify", MESSAGES_PATH, path_segment(id)),
        Value::Object(body),
    )
}

pub fn trash(id: &str) -> ApiRequest {
    ApiRequest::post(format!("{}/{}/trash", MESSAGES_PATH, path_segment(id)), json!({}))
}

pub fn untrash(id: &str) -> ApiRequest {
    ApiRequest::post(format!("{}/{}/untrash", MESSAGES_PATH, path_segment(id)), json!({}))
}

/// Permanent deletion, bypassing trash
pub fn delete(id: &str) -> ApiRequest {
    ApiRequest::delete(format!("{}/{}", MESSAGES_PATH, path_segment(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;

    #[test]
    fn test_list_request() {
        let request = list(&ListParams {
            query: Some("is:unread".to_string()),
            label_ids: vec!["INBOX".to_string(), "IMPORTANT".to_string()],
            max_results: Some(50),
            page_token: Some("tok".to_string()),
            include_spam_trash: false,
        });

        assert_eq!(request.method, Method::Get);
        assert_eq!(request.path, "/users/me/messages");
        assert_eq!(request.query_value("q"), Some("is:unread"));
        assert_eq!(request.query_value("maxResults"), Some("50"));
        assert_eq!(request.query_value("pageToken"), Some("tok"));
        assert_eq!(request.query_value("includeSpamTrash"), None);
        assert_eq!(request.query.iter().filter(|(k, _)| k == "labelIds").count(), 2);
    }

    #[test]
    fn test_empty_query_is_omitted() {
        let request = list(&ListParams {
            query: Some(String::new()),
            ..Default::default()
        });
        assert!(request.query.is_empty());
    }

    #[test]
    fn test_get_request_format() {
        let request = get("abc", MessageFormat::Metadata);
        assert_eq!(request.path, "/users/me/messages/abc");
        assert_eq!(request.query_value("format"), Some("metadata"));
    }

    #[test]
    fn test_modify_omits_empty_lists() {
        let request = modify("abc", &[], &["UNREAD".to_string()]);
        assert_eq!(request.path, "/users/me/messages/abc/modify");
        assert_eq!(request.body, Some(json!({"removeLabelIds": ["UNREAD"]})));

        let request = modify("abc", &["STARRED".to_string()], &["INBOX".to_string()]);
        assert_eq!(
            request.body,
            Some(json!({"addLabelIds": ["STARRED"], "removeLabelIds": ["INBOX"]}))
        );
    }

    #[test]
    fn test_send_with_thread() {
        let request = send("cmF3", Some("thread-1"));
        assert_eq!(request.path, "/users/me/messages/send");
        assert_eq!(request.body, Some(json!({"raw": "cmF3", "threadId": "thread-1"})));
    }

    #[test]
    fn test_delete_and_trash() {
        assert_eq!(delete("abc").method, Method::Delete);
        assert_eq!(trash("abc").path, "/users/me/messages/abc/trash");
        assert_eq!(untrash("abc").path, "/users/me/messages/abc/untrash");
    }

    #[test]
    fn test_message_id_is_one_path_segment() {
        let request = get("a/b?c#d", MessageFormat::Full);
        assert_eq!(request.path, "/users/me/messages/a%2Fb%3Fc%23d");
        assert_eq!(request.query, vec![("format".to_string(), "full".to_string())]);

        assert_eq!(modify("../send", &[], &[]).path, "/users/me/messages/..%2Fsend/modify");
        assert_eq!(trash("x/y").path, "/users/me/messages/x%2Fy/trash");
        assert_eq!(untrash("x?y").path, "/users/me/messages/x%3Fy/untrash");
        assert_eq!(delete("x#y").path, "/users/me/messages/x%23y");
    }
}
