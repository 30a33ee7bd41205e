use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GmailError, Result};

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// OAuth2 credentials. Persisting them is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            scopes: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Parse a token-issuer response
    /// (`access_token`, `refresh_token?`, `token_type?`, `expires_in?`, `scope?`)
    pub fn from_token_response(response: &Value) -> Result<Self> {
        Self::from_token_response_at(response, Utc::now())
    }

    pub fn from_token_response_at(response: &Value, issued_at: DateTime<Utc>) -> Result<Self> {
        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GmailError::InvalidResponse("Token response has no access_token".to_string())
            })?;

        let expires_in = response.get("expires_in").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        });

        let scopes = response.get("scope").and_then(Value::as_str).map(|scope| {
            scope
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        });

        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token: response
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            token_type: response
                .get("token_type")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(default_token_type),
            expires_at: expires_in.map(|secs| issued_at + Duration::seconds(secs)),
            scopes,
        })
    }

    /// Tokens without an expiry never expire
    pub fn has_expired(&self) -> bool {
        self.has_expired_at(Utc::now())
    }

    pub fn has_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Value for the `Authorization` header, e.g. `Bearer ya29...`
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}
