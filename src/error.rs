use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::retry_after::{parse_retry_after, DEFAULT_RETRY_AFTER_SECS};
use crate::transport::ApiResponse;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Service name stamped on every error record
pub const SERVICE_NAME: &str = "gmail";

/// Gmail reasons that report quota exhaustion with a 403 status
const QUOTA_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Why an authentication error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailure {
    MissingToken,
    InvalidToken,
    TokenExpired,
    RefreshFailed,
    Unauthorized,
}

impl AuthFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::InvalidToken => "invalid_token",
            AuthFailure::TokenExpired => "token_expired",
            AuthFailure::RefreshFailed => "refresh_failed",
            AuthFailure::Unauthorized => "unauthorized",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload carried by every API-originated error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// Semantic token or HTTP status, e.g. `NOT_FOUND`, `invalid_grant`, `429`
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub context: Map<String, Value>,
    pub service: String,
}

impl ErrorRecord {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            detail: None,
            context: Map::new(),
            service: SERVICE_NAME.to_string(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Build a record from a raw error body.
    ///
    /// Understands both the Google API envelope
    /// (`{"error": {"code", "message", "status", "errors": [{"reason", ...}]}}`)
    /// and the OAuth shape (`{"error": "invalid_grant", "error_description": ...}`).
    /// The raw body is always retained under `context.response`.
    pub fn from_payload(status: u16, payload: &Value) -> Self {
        let error = payload.get("error");

        let (code, message, detail, reason) = match error {
            Some(Value::Object(obj)) => {
                let first = obj
                    .get("errors")
                    .and_then(Value::as_array)
                    .and_then(|errors| errors.first());
                let reason = first
                    .and_then(|e| e.get("reason"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let code = obj
                    .get("status")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| reason.clone());
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let detail = first
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .filter(|m| Some(*m) != message.as_deref())
                    .map(str::to_string);
                (code, message, detail, reason)
            }
            Some(Value::String(code)) => {
                let description = payload
                    .get("error_description")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                (Some(code.clone()), description, None, Some(code.clone()))
            }
            _ => (None, payload.as_str().map(str::to_string), None, None),
        };

        let mut record = ErrorRecord::new(
            code.unwrap_or_else(|| status.to_string()),
            message.unwrap_or_else(|| default_message(status).to_string()),
        )
        .with_context("status", Value::from(status))
        .with_context("response", payload.clone());

        record.detail = detail;
        if let Some(reason) = reason {
            record.context.insert("reason".to_string(), Value::String(reason));
        }
        record
    }

    /// Machine-readable reason reported by the API, if any
    pub fn reason(&self) -> Option<&str> {
        self.context.get("reason").and_then(Value::as_str)
    }
}

fn default_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Invalid or expired credentials",
        403 => "Forbidden",
        404 => "Resource not found",
        429 => "Too many requests",
        500..=599 => "Server error",
        _ => "Unexpected response",
    }
}

/// The resource a request addressed, used to label not-found errors
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceRef {
    pub resource_type: String,
    pub resource_id: Option<String>,
}

impl ResourceRef {
    pub fn new(resource_type: &str, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            resource_id: Some(resource_id.into()),
        }
    }

    pub fn collection(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            resource_id: None,
        }
    }
}

/// Error taxonomy for the Gmail client
#[derive(Error, Debug)]
pub enum GmailError {
    /// Credentials are missing, invalid, expired or could not be refreshed
    #[error("Authentication failed ({kind}): {}", record.message)]
    Authentication { kind: AuthFailure, record: ErrorRecord },

    /// Resource not found (404)
    #[error("{resource_type} not found: {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
        record: ErrorRecord,
    },

    /// Rate limit exceeded - caller should wait `retry_after` seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited {
        retry_after: u64,
        quota: Option<u64>,
        quota_period: Option<String>,
        record: ErrorRecord,
    },

    /// Request rejected as malformed, either by the API (400) or pre-flight
    #[error("Validation failed: {}", record.message)]
    Validation {
        errors: BTreeMap<String, String>,
        record: ErrorRecord,
    },

    /// Any other non-success response
    #[error("Gmail API error (HTTP {status}): {}", record.message)]
    Api {
        status: u16,
        payload: Value,
        record: ErrorRecord,
    },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Circuit breaker is open (rejecting requests)
    #[error("Circuit breaker open: {message}. Will retry after {retry_after_secs} seconds")]
    CircuitBreakerOpen {
        message: String,
        retry_after_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClass {
    Validation,
    Authentication,
    NotFound,
    RateLimited,
}

/// Status code to error kind. Anything absent maps to `GmailError::Api`.
const STATUS_TABLE: &[(u16, ErrorClass)] = &[
    (400, ErrorClass::Validation),
    (401, ErrorClass::Authentication),
    (404, ErrorClass::NotFound),
    (429, ErrorClass::RateLimited),
];

fn classify(status: u16, record: &ErrorRecord) -> Option<ErrorClass> {
    if let Some((_, class)) = STATUS_TABLE.iter().find(|(code, _)| *code == status) {
        return Some(*class);
    }
    if status == 403 && record.reason().is_some_and(|r| QUOTA_REASONS.contains(&r)) {
        return Some(ErrorClass::RateLimited);
    }
    None
}

/// Collect field -> message pairs from a Google error envelope
fn validation_errors(payload: &Value, record: &ErrorRecord) -> BTreeMap<String, String> {
    let mut errors = BTreeMap::new();

    let entries = payload
        .get("error")
        .and_then(|e| e.get("errors"))
        .and_then(Value::as_array);

    for entry in entries.into_iter().flatten() {
        let field = entry
            .get("location")
            .and_then(Value::as_str)
            .unwrap_or("request");
        let message = entry
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(&record.message);
        errors.insert(field.to_string(), message.to_string());
    }

    if errors.is_empty() {
        errors.insert("request".to_string(), record.message.clone());
    }
    errors
}

impl GmailError {
    /// Map a non-success response onto the error taxonomy
    pub fn from_response(response: &ApiResponse, target: &ResourceRef) -> Self {
        let status = response.status();
        let payload = response.json().clone();
        let record = ErrorRecord::from_payload(status, &payload);

        match classify(status, &record) {
            Some(ErrorClass::Validation) => GmailError::Validation {
                errors: validation_errors(&payload, &record),
                record,
            },
            Some(ErrorClass::Authentication) => GmailError::Authentication {
                kind: AuthFailure::InvalidToken,
                record,
            },
            Some(ErrorClass::NotFound) => GmailError::NotFound {
                resource_type: target.resource_type.clone(),
                resource_id: target
                    .resource_id
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                record,
            },
            Some(ErrorClass::RateLimited) => {
                let retry_after = response
                    .header("retry-after")
                    .and_then(parse_retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                let quota = response
                    .header("x-ratelimit-limit")
                    .and_then(|v| v.trim().parse().ok());
                let quota_period = response.header("x-ratelimit-period").map(str::to_string);
                GmailError::RateLimited {
                    retry_after,
                    quota,
                    quota_period,
                    record: record.with_context("retry_after", Value::from(retry_after)),
                }
            }
            None => GmailError::Api {
                status,
                payload,
                record,
            },
        }
    }

    fn authentication(kind: AuthFailure, message: impl Into<String>) -> Self {
        GmailError::Authentication {
            kind,
            record: ErrorRecord::new(kind.as_str(), message),
        }
    }

    pub fn missing_token() -> Self {
        Self::authentication(AuthFailure::MissingToken, "No access token has been configured")
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::authentication(AuthFailure::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::authentication(AuthFailure::TokenExpired, "Access token has expired")
    }

    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::authentication(AuthFailure::RefreshFailed, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::authentication(AuthFailure::Unauthorized, message)
    }

    pub fn not_found(resource_type: &str, resource_id: impl Into<String>) -> Self {
        let resource_id = resource_id.into();
        GmailError::NotFound {
            record: ErrorRecord::new(
                "not_found",
                format!("{} '{}' was not found", resource_type, resource_id),
            ),
            resource_type: resource_type.to_string(),
            resource_id,
        }
    }

    /// Single-field validation failure raised before any request is sent
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), message.clone());
        GmailError::Validation {
            errors,
            record: ErrorRecord::new("validation_failed", message),
        }
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        GmailError::RateLimited {
            retry_after,
            quota: None,
            quota_period: None,
            record: ErrorRecord::new("rate_limited", default_message(429)),
        }
    }

    /// Short kind name used in structured logs
    pub fn kind_name(&self) -> &'static str {
        match self {
            GmailError::Authentication { .. } => "authentication",
            GmailError::NotFound { .. } => "not_found",
            GmailError::RateLimited { .. } => "rate_limited",
            GmailError::Validation { .. } => "validation",
            GmailError::Api { .. } => "api",
            GmailError::Network(_) => "network",
            GmailError::InvalidResponse(_) => "invalid_response",
            GmailError::Config(_) => "config",
            GmailError::Serialization(_) => "serialization",
            GmailError::Io(_) => "io",
            GmailError::CircuitBreakerOpen { .. } => "circuit_breaker_open",
        }
    }

    /// The structured record, for errors that originate from the API
    pub fn record(&self) -> Option<&ErrorRecord> {
        match self {
            GmailError::Authentication { record, .. }
            | GmailError::NotFound { record, .. }
            | GmailError::RateLimited { record, .. }
            | GmailError::Validation { record, .. }
            | GmailError::Api { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GmailError::NotFound { .. })
    }

    pub fn auth_failure(&self) -> Option<AuthFailure> {
        match self {
            GmailError::Authentication { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Seconds the API asked us to wait, if this is a rate-limit error
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GmailError::RateLimited { retry_after, .. } => Some(*retry_after),
            GmailError::CircuitBreakerOpen {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GmailError::RateLimited { .. }
                | GmailError::Api {
                    status: 500..=599,
                    ..
                }
                | GmailError::Network(_)
                | GmailError::CircuitBreakerOpen { .. }
        )
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: Value) -> ApiResponse {
        ApiResponse::new(status, body)
    }

    #[test]
    fn test_status_400_maps_to_validation_with_fields() {
        let body = json!({
            "error": {
                "code": 400,
                "message": "Invalid label name",
                "status": "INVALID_ARGUMENT",
                "errors": [{"reason": "invalidArgument", "location": "name", "message": "Invalid label name"}]
            }
        });
        let err = GmailError::from_response(&response(400, body), &ResourceRef::collection("label"));

        match err {
            GmailError::Validation { errors, record } => {
                assert_eq!(errors.get("name").map(String::as_str), Some("Invalid label name"));
                assert_eq!(record.code, "INVALID_ARGUMENT");
                assert_eq!(record.reason(), Some("invalidArgument"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_status_401_maps_to_invalid_token() {
        let err = GmailError::from_response(&response(401, json!({})), &ResourceRef::default());
        assert_eq!(err.auth_failure(), Some(AuthFailure::InvalidToken));
        assert_eq!(err.kind_name(), "authentication");
    }

    #[test]
    fn test_status_404_carries_resource() {
        let err = GmailError::from_response(
            &response(404, json!({"error": {"code": 404, "message": "Requested entity was not found."}})),
            &ResourceRef::new("message", "msg-9"),
        );

        match err {
            GmailError::NotFound {
                resource_type,
                resource_id,
                record,
            } => {
                assert_eq!(resource_type, "message");
                assert_eq!(resource_id, "msg-9");
                assert_eq!(record.message, "Requested entity was not found.");
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_status_429_reads_retry_after() {
        let resp = response(429, json!({})).with_header("Retry-After", "60");
        let err = GmailError::from_response(&resp, &ResourceRef::default());
        assert_eq!(err.retry_after(), Some(60));
    }

    #[test]
    fn test_status_429_without_header_uses_default() {
        let err = GmailError::from_response(&response(429, json!({})), &ResourceRef::default());
        assert_eq!(err.retry_after(), Some(DEFAULT_RETRY_AFTER_SECS));
    }

    #[test]
    fn test_status_403_quota_reason_is_rate_limited() {
        let body = json!({
            "error": {"code": 403, "message": "User-rate limit exceeded",
                      "errors": [{"reason": "userRateLimitExceeded"}]}
        });
        let err = GmailError::from_response(&response(403, body), &ResourceRef::default());
        assert!(matches!(err, GmailError::RateLimited { .. }));
    }

    #[test]
    fn test_other_status_wraps_payload() {
        let body = json!({"error": {"code": 503, "message": "Backend Error"}});
        let err = GmailError::from_response(&response(503, body.clone()), &ResourceRef::default());

        match &err {
            GmailError::Api { status, payload, .. } => {
                assert_eq!(*status, 503);
                assert_eq!(payload, &body);
            }
            other => panic!("expected api error, got {:?}", other),
        }
        assert!(err.is_transient());
        assert_eq!(err.record().unwrap().context["response"], body);
    }

    #[test]
    fn test_oauth_error_shape() {
        let record = ErrorRecord::from_payload(
            400,
            &json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."}),
        );
        assert_eq!(record.code, "invalid_grant");
        assert_eq!(record.message, "Token has been expired or revoked.");
        assert_eq!(record.service, SERVICE_NAME);
    }

    #[test]
    fn test_transient_errors() {
        assert!(GmailError::rate_limited(5).is_transient());
        assert!(GmailError::Network("Connection timeout".to_string()).is_transient());
        assert!(!GmailError::rate_limited(5).is_permanent());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(GmailError::not_found("message", "msg123").is_permanent());
        assert!(GmailError::validation("to", "Invalid recipient").is_permanent());
        assert!(GmailError::token_expired().is_permanent());
    }

    #[test]
    fn test_error_display() {
        let display = format!("{}", GmailError::rate_limited(10));
        assert!(display.contains("Rate limit exceeded"));
        assert!(display.contains("10 seconds"));

        let display = format!("{}", GmailError::invalid_token("Invalid token"));
        assert!(display.contains("Authentication failed"));
        assert!(display.contains("invalid_token"));
    }
}
