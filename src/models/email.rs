//! Message entity
//!
//! A single type serves both lifecycle variants. A minimal email carries only
//! `id` and `thread_id`; a full one is hydrated from a detail fetch.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::contact::Contact;
use super::label::{DRAFT, IMPORTANT, INBOX, SENT, STARRED, UNREAD};
use crate::error::{GmailError, Result};

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Email {
    pub id: String,
    pub thread_id: String,
    /// Unique, in the order the API listed them
    pub label_ids: Vec<String>,
    pub snippet: Option<String>,
    /// Raw MIME payload tree as returned by the API
    pub payload: Option<Value>,
    pub size_estimate: Option<u64>,
    /// Epoch milliseconds; the authoritative ordering key
    pub internal_date: Option<i64>,
    /// Lower-cased header names; the first occurrence wins
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub subject: Option<String>,
    pub from: Option<Contact>,
    pub to: Vec<Contact>,
    pub cc: Vec<Contact>,
    pub bcc: Vec<Contact>,
}

impl Email {
    pub fn minimal(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            ..Default::default()
        }
    }

    /// Minimal projection of a list entry (`{"id", "threadId"}`)
    pub fn from_reference(value: &Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| GmailError::InvalidResponse("Message reference has no id".to_string()))?;
        let thread_id = value.get("threadId").and_then(Value::as_str).unwrap_or(id);
        Ok(Self::minimal(id, thread_id))
    }

    /// Full entity from a `messages.get` response
    pub fn from_api_response(value: &Value) -> Result<Self> {
        let mut email = Self::from_reference(value)?;

        if let Some(ids) = value.get("labelIds").and_then(Value::as_array) {
            for id in ids.iter().filter_map(Value::as_str) {
                if !email.label_ids.iter().any(|existing| existing == id) {
                    email.label_ids.push(id.to_string());
                }
            }
        }

        email.snippet = value
            .get("snippet")
            .and_then(Value::as_str)
            .map(str::to_string);
        email.size_estimate = value.get("sizeEstimate").and_then(Value::as_u64);
        email.internal_date = value.get("internalDate").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        });

        if let Some(payload) = value.get("payload") {
            email.headers = collect_headers(payload);
            email.body = extract_body(payload);
            email.payload = Some(payload.clone());
        }

        email.subject = email.headers.get("subject").cloned();
        email.from = email.headers.get("from").and_then(|v| Contact::parse(v));
        email.to = contacts(&email.headers, "to");
        email.cc = contacts(&email.headers, "cc");
        email.bcc = contacts(&email.headers, "bcc");

        Ok(email)
    }

    /// True when nothing beyond id/thread id has been hydrated
    pub fn is_minimal(&self) -> bool {
        self.payload.is_none()
            && self.snippet.is_none()
            && self.label_ids.is_empty()
            && self.internal_date.is_none()
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.internal_date.and_then(DateTime::from_timestamp_millis)
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.label_ids.iter().any(|id| id == label_id)
    }

    pub fn is_unread(&self) -> bool {
        self.has_label(UNREAD)
    }

    pub fn is_starred(&self) -> bool {
        self.has_label(STARRED)
    }

    pub fn is_important(&self) -> bool {
        self.has_label(IMPORTANT)
    }

    pub fn is_in_inbox(&self) -> bool {
        self.has_label(INBOX)
    }

    pub fn is_draft(&self) -> bool {
        self.has_label(DRAFT)
    }

    pub fn is_sent(&self) -> bool {
        self.has_label(SENT)
    }
}

fn contacts(headers: &BTreeMap<String, String>, name: &str) -> Vec<Contact> {
    headers
        .get(name)
        .map(|v| Contact::parse_list(v))
        .unwrap_or_default()
}

fn collect_headers(payload: &Value) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    let entries = payload.get("headers").and_then(Value::as_array);

    for header in entries.into_iter().flatten() {
        let (Some(name), Some(value)) = (
            header.get("name").and_then(Value::as_str),
            header.get("value").and_then(Value::as_str),
        ) else {
            continue;
        };
        headers
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| value.to_string());
    }
    headers
}

fn mime_type(part: &Value) -> &str {
    part.get("mimeType").and_then(Value::as_str).unwrap_or("")
}

fn part_data(part: &Value) -> Option<String> {
    part.get("body")
        .and_then(|b| b.get("data"))
        .and_then(Value::as_str)
        .and_then(decode_body_data)
}

/// Depth-first search for the first part of the given MIME type
fn find_part(part: &Value, wanted: &str) -> Option<String> {
    if mime_type(part).starts_with(wanted) {
        if let Some(text) = part_data(part) {
            return Some(text);
        }
    }
    part.get("parts")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|child| find_part(child, wanted))
}

/// Prefer text/plain, fall back to text/html, then to whatever the root carries
fn extract_body(payload: &Value) -> Option<String> {
    find_part(payload, "text/plain")
        .or_else(|| find_part(payload, "text/html"))
        .or_else(|| part_data(payload))
}

/// Gmail sends URL-safe base64, but padding varies between messages
pub(crate) fn decode_body_data(data: &str) -> Option<String> {
    let engines: [&base64::engine::GeneralPurpose; 4] =
        [&URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    engines
        .iter()
        .filter_map(|engine| engine.decode(data).ok())
        .find_map(|bytes| String::from_utf8(bytes).ok())
}
