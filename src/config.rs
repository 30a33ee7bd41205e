use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GmailError, Result};

/// Scopes requested when the caller does not name any
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Double a capped unread count instead of reporting the cap
    #[serde(default = "default_true")]
    pub enable_smart_counting: bool,
    /// Cap applied to count queries before estimation kicks in
    #[serde(default = "default_count_estimation_threshold")]
    pub count_estimation_threshold: u32,
    /// Label list cache lifetime; 0 disables caching
    #[serde(default = "default_cache_ttl_secs")]
    pub default_cache_ttl_secs: u64,
    /// Concurrent detail fetches during batch hydration
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enable_batching: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between hydration batches
    #[serde(default)]
    pub batch_delay_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enable_smart_counting: true,
            count_estimation_threshold: default_count_estimation_threshold(),
            default_cache_ttl_secs: default_cache_ttl_secs(),
            max_concurrent_requests: default_max_concurrent(),
            api_timeout_secs: default_api_timeout_secs(),
            enable_batching: true,
            batch_size: default_batch_size(),
            batch_delay_ms: 0,
        }
    }
}

impl PerformanceConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.default_cache_ttl_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PaginationConfig {
    /// Resolve a requested page size against the configured default and ceiling
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
            .max(1)
    }
}

/// Published quota thresholds. Informational only; nothing throttles on them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_second")]
    pub per_second: u32,
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_per_day")]
    pub per_day: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            per_minute: default_per_minute(),
            per_day: default_per_day(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub jitter: bool,
    /// Operations that are never retried (non-idempotent writes)
    #[serde(default = "default_exempt_operations")]
    pub exempt_operations: Vec<String>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
            jitter: true,
            exempt_operations: default_exempt_operations(),
        }
    }
}

impl BackoffConfig {
    pub fn is_exempt(&self, operation: &str) -> bool {
        self.exempt_operations.iter().any(|op| op == operation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

impl OAuthConfig {
    /// Load OAuth client settings from the environment.
    ///
    /// Reads `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET` and optionally
    /// `GMAIL_REDIRECT_URI` (defaults to `http://localhost:8080`).
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID").map_err(|_| {
            GmailError::Config("GMAIL_CLIENT_ID environment variable not set".to_string())
        })?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET").map_err(|_| {
            GmailError::Config("GMAIL_CLIENT_SECRET environment variable not set".to_string())
        })?;
        let redirect_uri =
            std::env::var("GMAIL_REDIRECT_URI").unwrap_or_else(|_| default_redirect_uri());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes: default_scopes(),
        })
    }

    /// Fill empty fields from the environment, leaving configured values alone
    pub fn merge_env(&mut self) {
        if self.client_id.is_empty() {
            if let Ok(id) = std::env::var("GMAIL_CLIENT_ID") {
                self.client_id = id;
            }
        }
        if self.client_secret.is_empty() {
            if let Ok(secret) = std::env::var("GMAIL_CLIENT_SECRET") {
                self.client_secret = secret;
            }
        }
        if let Ok(uri) = std::env::var("GMAIL_REDIRECT_URI") {
            if self.redirect_uri == default_redirect_uri() {
                self.redirect_uri = uri;
            }
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_count_estimation_threshold() -> u32 {
    50
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    3
}

fn default_api_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    10
}

fn default_page_size() -> u32 {
    25
}

fn default_max_page_size() -> u32 {
    500
}

fn default_per_second() -> u32 {
    10
}

fn default_per_minute() -> u32 {
    250
}

fn default_per_day() -> u64 {
    1_000_000
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_exempt_operations() -> Vec<String> {
    vec!["send_message".to_string(), "delete_message".to_string()]
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    60
}

fn default_redirect_uri() -> String {
    "http://localhost:8080".to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::Config(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::Config(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let perf = &self.performance;

        // Gmail allows 250 quota units/sec per user; a detail fetch costs 5
        if perf.max_concurrent_requests == 0 || perf.max_concurrent_requests > 50 {
            return Err(GmailError::Config(
                "performance.max_concurrent_requests must be between 1 and 50".to_string(),
            ));
        }
        if perf.batch_size == 0 {
            return Err(GmailError::Config(
                "performance.batch_size must be greater than 0".to_string(),
            ));
        }
        if perf.api_timeout_secs == 0 {
            return Err(GmailError::Config(
                "performance.api_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if perf.count_estimation_threshold == 0 {
            return Err(GmailError::Config(
                "performance.count_estimation_threshold must be greater than 0".to_string(),
            ));
        }

        if self.pagination.max_page_size == 0 || self.pagination.max_page_size > 500 {
            return Err(GmailError::Config(
                "pagination.max_page_size must be between 1 and 500".to_string(),
            ));
        }
        if self.pagination.default_page_size == 0
            || self.pagination.default_page_size > self.pagination.max_page_size
        {
            return Err(GmailError::Config(format!(
                "pagination.default_page_size must be between 1 and {}",
                self.pagination.max_page_size
            )));
        }

        if self.backoff.multiplier < 1.0 {
            return Err(GmailError::Config(
                "backoff.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.backoff.initial_delay_ms > self.backoff.max_delay_ms {
            return Err(GmailError::Config(
                "backoff.initial_delay_ms cannot exceed backoff.max_delay_ms".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(GmailError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.circuit_breaker.reset_timeout_secs == 0 {
            return Err(GmailError::Config(
                "circuit_breaker.reset_timeout_secs must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub async fn create_example(path: &Path) -> Result<()> {
        Self::default().save(path).await
    }
}
