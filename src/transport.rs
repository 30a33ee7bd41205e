//! Request-sender contract and the production HTTP connector
//!
//! Everything above this module talks to the API through [`Connector::send`],
//! which takes a method/path/query/body descriptor and returns status,
//! headers and a decoded JSON body. Requests resolve against the Gmail API
//! base URL, except token-issuer requests which resolve against the OAuth
//! token endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::{GmailError, ResourceRef, Result};
use crate::models::Token;

/// Gmail REST API base URL
pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

/// Google OAuth2 token issuer
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth2 consent page
pub const AUTHORIZATION_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    fn as_hyper(&self) -> hyper::Method {
        match self {
            Method::Get => hyper::Method::GET,
            Method::Post => hyper::Method::POST,
            Method::Put => hyper::Method::PUT,
            Method::Patch => hyper::Method::PATCH,
            Method::Delete => hyper::Method::DELETE,
        }
    }
}

/// Which fixed base URL a request resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Api,
    TokenIssuer,
}

/// Transport-neutral request descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub endpoint: Endpoint,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            endpoint: Endpoint::Api,
            path: path.into(),
            query: Vec::new(),
            body,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path, Some(body))
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path, None)
    }

    /// POST to the token issuer; the body is sent form-encoded
    pub fn token(body: Value) -> Self {
        Self {
            endpoint: Endpoint::TokenIssuer,
            ..Self::new(Method::Post, "", Some(body))
        }
    }

    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.set_query(key, value);
        self
    }

    /// Append a query pair (repeated keys are allowed, e.g. `labelIds`)
    pub fn add_query(&mut self, key: &str, value: impl ToString) {
        self.query.push((key.to_string(), value.to_string()));
    }

    /// Replace every pair for `key` with a single value
    pub fn set_query(&mut self, key: &str, value: impl ToString) {
        self.remove_query(key);
        self.add_query(key, value);
    }

    pub fn remove_query(&mut self, key: &str) {
        self.query.retain(|(k, _)| k != key);
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Decoded response: status, lower-cased headers and a JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: u16,
    headers: HashMap<String, Vec<String>>,
    body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).first().map(String::as_str)
    }

    pub fn header_values(&self, name: &str) -> &[String] {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn json(&self) -> &Value {
        &self.body
    }

    pub fn into_json(self) -> Value {
        self.body
    }
}

/// The request-sender every resource and service is built on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Send one request and return the raw response, whatever its status.
    /// Only transport failures (connection, timeout) are errors here.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// Apply credentials to every subsequent API request
    async fn authenticate(&self, token: Token);
}

/// Send a request and map any non-2xx response onto the error taxonomy
pub async fn dispatch(
    connector: &dyn Connector,
    request: ApiRequest,
    target: &ResourceRef,
) -> Result<Value> {
    let method = request.method;
    let path = request.path.clone();
    debug!(method = method.as_str(), path = %path, "Sending Gmail API request");

    let response = connector.send(request).await?;
    if response.is_success() {
        return Ok(response.into_json());
    }

    let error = GmailError::from_response(&response, target);
    debug!(
        method = method.as_str(),
        path = %path,
        status = response.status(),
        error_kind = error.kind_name(),
        "Gmail API request failed"
    );
    Err(error)
}

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Production connector over hyper with rustls
pub struct HyperConnector {
    client: HttpsClient,
    api_base: String,
    token_url: String,
    timeout: Duration,
    credentials: RwLock<Option<Token>>,
}

impl HyperConnector {
    /// Connector for the real Gmail and OAuth endpoints
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoints(API_BASE_URL, TOKEN_URL, timeout)
    }

    /// Connector against custom base URLs (test servers, proxies)
    pub fn with_endpoints(api_base: &str, token_url: &str, timeout: Duration) -> Result<Self> {
        for base in [api_base, token_url] {
            Url::parse(base)
                .map_err(|e| GmailError::Config(format!("Invalid base URL '{}': {}", base, e)))?;
        }

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Client::builder(TokioExecutor::new()).build(https),
            api_base: api_base.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            timeout,
            credentials: RwLock::new(None),
        })
    }

    fn build_url(&self, request: &ApiRequest) -> Result<Url> {
        let raw = match request.endpoint {
            Endpoint::Api => format!("{}{}", self.api_base, request.path),
            Endpoint::TokenIssuer => format!("{}{}", self.token_url, request.path),
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| GmailError::Config(format!("Invalid request URL '{}': {}", raw, e)))?;

        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

/// Encode the body: JSON for the API, form fields for the token issuer
fn encode_body(request: &ApiRequest) -> Result<(Option<&'static str>, Bytes)> {
    let Some(body) = &request.body else {
        return Ok((None, Bytes::new()));
    };

    match request.endpoint {
        Endpoint::Api => Ok((
            Some("application/json"),
            Bytes::from(serde_json::to_vec(body)?),
        )),
        Endpoint::TokenIssuer => {
            let mut form = url::form_urlencoded::Serializer::new(String::new());
            if let Some(fields) = body.as_object() {
                for (key, value) in fields {
                    match value {
                        Value::Null => {}
                        Value::String(text) => {
                            form.append_pair(key, text);
                        }
                        other => {
                            form.append_pair(key, &other.to_string());
                        }
                    }
                }
            }
            Ok((
                Some("application/x-www-form-urlencoded"),
                Bytes::from(form.finish()),
            ))
        }
    }
}

/// Empty bodies decode to null; non-JSON bodies are kept as a string
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Connector for HyperConnector {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.build_url(&request)?;
        let (content_type, body) = encode_body(&request)?;

        let mut builder = hyper::Request::builder()
            .method(request.method.as_hyper())
            .uri(url.as_str())
            .header(header::ACCEPT, "application/json");

        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        if request.endpoint == Endpoint::Api {
            if let Some(token) = self.credentials.read().await.as_ref() {
                builder = builder.header(header::AUTHORIZATION, token.authorization_header());
            }
        }

        let http_request = builder
            .body(Full::new(body))
            .map_err(|e| GmailError::Network(format!("Failed to build request: {}", e)))?;

        let exchange = async {
            let response = self
                .client
                .request(http_request)
                .await
                .map_err(|e| GmailError::Network(format!("Connection error: {}", e)))?;

            let status = response.status().as_u16();
            let mut headers: HashMap<String, Vec<String>> = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers
                        .entry(name.as_str().to_string())
                        .or_default()
                        .push(value.to_string());
                }
            }

            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| GmailError::Network(format!("Failed to read response body: {}", e)))?
                .to_bytes();

            Ok::<_, GmailError>(ApiResponse {
                status,
                headers,
                body: decode_body(&bytes),
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    method = request.method.as_str(),
                    path = %request.path,
                    "Gmail API call timed out after {:?}",
                    self.timeout
                );
                Err(GmailError::Network(format!(
                    "API call timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    async fn authenticate(&self, token: Token) {
        *self.credentials.write().await = Some(token);
    }
}
