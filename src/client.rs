//! Composition root tying the connector, configuration and services together

use std::sync::Arc;
use tracing::debug;

use crate::circuit_breaker::GuardedConnector;
use crate::config::Config;
use crate::error::Result;
use crate::models::Token;
use crate::services::{
    AuthService, LabelService, MessageService, StatisticsOptions, StatisticsService,
};
use crate::transport::{Connector, HyperConnector};

/// Gmail client owning one connector shared by all services.
///
/// Construct it explicitly; there is no global instance.
pub struct GmailClient {
    connector: Arc<dyn Connector>,
    config: Arc<Config>,
    messages: MessageService,
    labels: LabelService,
    auth: AuthService,
    statistics: StatisticsService,
}

impl GmailClient {
    /// Build a client over any connector (mocks included)
    pub fn new(connector: Arc<dyn Connector>, config: Config) -> Self {
        let config = Arc::new(config);

        Self {
            messages: MessageService::new(connector.clone(), config.clone()),
            labels: LabelService::new(connector.clone(), config.performance.cache_ttl()),
            auth: AuthService::new(connector.clone(), config.oauth.clone()),
            statistics: StatisticsService::new(
                connector.clone(),
                StatisticsOptions::from_config(&config.performance),
            ),
            connector,
            config,
        }
    }

    /// Build a client over HTTPS, behind a circuit breaker when enabled
    pub fn connect(config: Config) -> Result<Self> {
        config.validate()?;

        let http: Arc<dyn Connector> = Arc::new(HyperConnector::new(config.performance.api_timeout())?);
        let connector: Arc<dyn Connector> = if config.circuit_breaker.enabled {
            debug!(
                threshold = config.circuit_breaker.failure_threshold,
                reset_secs = config.circuit_breaker.reset_timeout_secs,
                "Circuit breaker enabled"
            );
            Arc::new(GuardedConnector::new(http, config.circuit_breaker.clone()))
        } else {
            http
        };

        Ok(Self::new(connector, config))
    }

    /// Connect and apply previously stored credentials
    pub async fn with_token(config: Config, token: &Token) -> Result<Self> {
        let client = Self::connect(config)?;
        client.auth.apply_token(token).await;
        Ok(client)
    }

    pub fn messages(&self) -> &MessageService {
        &self.messages
    }

    pub fn labels(&self) -> &LabelService {
        &self.labels
    }

    pub fn auth(&self) -> &AuthService {
        &self.auth
    }

    pub fn statistics(&self) -> &StatisticsService {
        &self.statistics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        self.connector.clone()
    }
}
