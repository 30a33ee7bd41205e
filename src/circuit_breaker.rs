//! Circuit breaker around the request sender
//!
//! Consecutive transient failures (rate limits, 5xx, network errors) open the
//! circuit, after which requests are rejected locally until the reset timeout
//! elapses. One probe request is then let through (half-open); its outcome
//! closes or re-opens the circuit.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_client::circuit_breaker::GuardedConnector;
//! use gmail_client::config::CircuitBreakerConfig;
//! use gmail_client::transport::HyperConnector;
//!
//! # fn example() -> gmail_client::Result<()> {
//! let inner = Arc::new(HyperConnector::new(std::time::Duration::from_secs(30))?);
//! let guarded = GuardedConnector::new(inner, CircuitBreakerConfig::default());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{GmailError, ResourceRef, Result};
use crate::models::Token;
use crate::transport::{ApiRequest, ApiResponse, Connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through
    Closed,
    /// Requests are rejected until the reset timeout elapses
    Open,
    /// One probe request is allowed through
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl BreakerState {
    fn admit(&mut self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        match (self.state, self.opened_at) {
            (CircuitState::Closed, _) | (CircuitState::HalfOpen, _) => Ok(()),
            (CircuitState::Open, None) => {
                warn!("Circuit marked open without an opening time, closing it");
                self.close();
                Ok(())
            }
            (CircuitState::Open, Some(opened_at)) => {
                let timeout = Duration::from_secs(self.config.reset_timeout_secs);
                let elapsed = opened_at.elapsed();
                if elapsed >= timeout {
                    debug!(elapsed = ?elapsed, "Circuit half-open, probing the API");
                    self.state = CircuitState::HalfOpen;
                    return Ok(());
                }
                Err(GmailError::CircuitBreakerOpen {
                    message: format!(
                        "Circuit breaker is open after {} consecutive failures",
                        self.consecutive_failures
                    ),
                    retry_after_secs: (timeout - elapsed).as_secs().max(1),
                })
            }
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    fn on_success(&mut self) {
        if !self.config.enabled {
            return;
        }
        if self.state != CircuitState::Closed {
            debug!("Probe request succeeded, closing circuit");
        }
        self.close();
    }

    fn on_failure(&mut self, error: &GmailError) {
        if !self.config.enabled || !trips_breaker(error) {
            return;
        }

        self.consecutive_failures += 1;
        match self.state {
            CircuitState::Closed => {
                debug!(
                    failures = self.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker recorded failure"
                );
                if self.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        failures = self.consecutive_failures,
                        reset_timeout_secs = self.config.reset_timeout_secs,
                        "Opening circuit breaker"
                    );
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("Probe request failed, re-opening circuit");
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }
}

/// Only transient failures count; a 404 or a bad request says nothing about API health
fn trips_breaker(error: &GmailError) -> bool {
    matches!(
        error,
        GmailError::RateLimited { .. }
            | GmailError::Api {
                status: 500..=599,
                ..
            }
            | GmailError::Network(_)
    )
}

#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                config,
            })),
        }
    }

    /// Reject with `CircuitBreakerOpen` while the circuit is open
    pub async fn check_request(&self) -> Result<()> {
        self.state.lock().await.admit()
    }

    pub async fn record_success(&self) {
        self.state.lock().await.on_success();
    }

    pub async fn record_failure(&self, error: &GmailError) {
        self.state.lock().await.on_failure(error);
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }

    pub async fn reset(&self) {
        self.state.lock().await.close();
        debug!("Circuit breaker manually reset");
    }
}

/// Connector decorator that routes every request through a [`CircuitBreaker`]
pub struct GuardedConnector {
    inner: Arc<dyn Connector>,
    breaker: CircuitBreaker,
}

impl GuardedConnector {
    pub fn new(inner: Arc<dyn Connector>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl Connector for GuardedConnector {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.breaker.check_request().await?;

        match self.inner.send(request).await {
            Ok(response) if response.is_success() => {
                self.breaker.record_success().await;
                Ok(response)
            }
            Ok(response) => {
                // Non-2xx responses are still handed back untouched; they only
                // feed the breaker through their classified error.
                let error = GmailError::from_response(&response, &ResourceRef::default());
                if trips_breaker(&error) {
                    self.breaker.record_failure(&error).await;
                } else {
                    self.breaker.record_success().await;
                }
                Ok(response)
            }
            Err(error) => {
                self.breaker.record_failure(&error).await;
                Err(error)
            }
        }
    }

    async fn authenticate(&self, token: Token) {
        self.inner.authenticate(token).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockConnector;
    use serde_json::json;

    fn config(threshold: u32, reset_timeout_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            reset_timeout_secs,
        }
    }

    fn server_error() -> GmailError {
        GmailError::Api {
            status: 500,
            payload: json!({}),
            record: crate::error::ErrorRecord::new("500", "Internal server error"),
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(config(3, 60));
        for _ in 0..3 {
            breaker.record_failure(&server_error()).await;
        }

        assert_eq!(breaker.state().await, CircuitState::Open);
        let rejected = breaker.check_request().await.unwrap_err();
        assert!(matches!(rejected, GmailError::CircuitBreakerOpen { .. }));
        assert!(rejected.retry_after().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(config(3, 60));
        breaker.record_failure(&server_error()).await;
        breaker.record_failure(&server_error()).await;
        assert_eq!(breaker.consecutive_failures().await, 2);

        breaker.record_success().await;
        assert_eq!(breaker.consecutive_failures().await, 0);
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_after_timeout_then_closes() {
        let breaker = CircuitBreaker::new(config(1, 0));
        breaker.record_failure(&server_error()).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        assert!(breaker.check_request().await.is_ok());
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(config(1, 0));
        breaker.record_failure(&server_error()).await;
        breaker.check_request().await.ok();

        breaker
            .record_failure(&GmailError::Network("reset by peer".to_string()))
            .await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_permanent_errors_do_not_count() {
        let breaker = CircuitBreaker::new(config(2, 60));
        breaker.record_failure(&GmailError::invalid_token("bad")).await;
        breaker.record_failure(&GmailError::not_found("message", "x")).await;
        breaker.record_failure(&GmailError::validation("to", "bad")).await;

        assert_eq!(breaker.consecutive_failures().await, 0);
        assert_eq!(breaker.state().await, CircuitState::Closed);

        breaker.record_failure(&GmailError::rate_limited(5)).await;
        assert_eq!(breaker.consecutive_failures().await, 1);
    }

    #[tokio::test]
    async fn test_disabled_breaker_never_opens() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            enabled: false,
            ..config(1, 60)
        });
        for _ in 0..10 {
            breaker.record_failure(&server_error()).await;
        }
        assert!(breaker.check_request().await.is_ok());
    }

    #[tokio::test]
    async fn test_reset() {
        let breaker = CircuitBreaker::new(config(1, 60));
        breaker.record_failure(&server_error()).await;
        breaker.reset().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        assert!(breaker.check_request().await.is_ok());
    }

    #[tokio::test]
    async fn test_guarded_connector_short_circuits() {
        let mut inner = MockConnector::new();
        inner
            .expect_send()
            .times(2)
            .returning(|_| Ok(ApiResponse::new(503, json!({}))));

        let guarded = GuardedConnector::new(Arc::new(inner), config(2, 60));

        for _ in 0..2 {
            let response = guarded.send(ApiRequest::get("/users/me/labels")).await.unwrap();
            assert_eq!(response.status(), 503);
        }

        // Third call never reaches the inner connector
        let result = guarded.send(ApiRequest::get("/users/me/labels")).await;
        assert!(matches!(result, Err(GmailError::CircuitBreakerOpen { .. })));
    }

    #[tokio::test]
    async fn test_guarded_connector_ignores_client_errors() {
        let mut inner = MockConnector::new();
        inner
            .expect_send()
            .times(3)
            .returning(|_| Ok(ApiResponse::new(404, json!({}))));

        let guarded = GuardedConnector::new(Arc::new(inner), config(2, 60));
        for _ in 0..3 {
            guarded.send(ApiRequest::get("/users/me/messages/x")).await.unwrap();
        }
        assert_eq!(guarded.breaker().state().await, CircuitState::Closed);
    }
}
