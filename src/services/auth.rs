use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{OAuthConfig, DEFAULT_SCOPES};
use crate::error::{GmailError, ResourceRef, Result};
use crate::models::Token;
use crate::resources::oauth;
use crate::transport::{dispatch, Connector};

/// OAuth2 authorization-code flow. Tokens obtained here are applied to the
/// connector immediately; storing them between runs is the caller's job.
pub struct AuthService {
    connector: Arc<dyn Connector>,
    oauth: OAuthConfig,
}

impl AuthService {
    pub fn new(connector: Arc<dyn Connector>, oauth: OAuthConfig) -> Self {
        Self { connector, oauth }
    }

    pub fn oauth_config(&self) -> &OAuthConfig {
        &self.oauth
    }

    /// Consent page URL. Uses the configured scopes (or the Gmail defaults)
    /// when `scopes` is empty.
    pub fn authorization_url(&self, scopes: &[String], state: Option<&str>) -> Result<String> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(GmailError::Config(
                "OAuth client_id is not configured (set oauth.client_id or GMAIL_CLIENT_ID)"
                    .to_string(),
            ));
        }

        let scopes: Vec<String> = if !scopes.is_empty() {
            scopes.to_vec()
        } else if !self.oauth.scopes.is_empty() {
            self.oauth.scopes.clone()
        } else {
            DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
        };

        oauth::authorization_url(&self.oauth, &scopes, state)
    }

    /// Trade an authorization code for tokens and start using them
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let response = dispatch(
            self.connector.as_ref(),
            oauth::exchange_code(&self.oauth, code),
            &ResourceRef::collection("token"),
        )
        .await?;

        let token = Token::from_token_response(&response)?;
        self.connector.authenticate(token.clone()).await;
        info!(
            expires_at = ?token.expires_at,
            has_refresh_token = token.refresh_token.is_some(),
            "Exchanged authorization code for access token"
        );
        Ok(token)
    }

    /// Obtain a fresh access token. The issuer usually omits the refresh
    /// token on refresh, in which case the existing one is kept.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GmailError::refresh_failed("No refresh token available"))?;

        let response = dispatch(
            self.connector.as_ref(),
            oauth::refresh(&self.oauth, refresh_token),
            &ResourceRef::collection("token"),
        )
        .await
        .map_err(|error| {
            // Transport failures stay retryable
            if matches!(error, GmailError::Network(_)) {
                return error;
            }
            warn!(error = %error, "Token refresh rejected");
            let message = error
                .record()
                .map(|record| record.message.clone())
                .unwrap_or_else(|| error.to_string());
            GmailError::refresh_failed(message)
        })?;

        let mut refreshed = Token::from_token_response(&response)?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.to_string());
        }

        self.connector.authenticate(refreshed.clone()).await;
        info!(expires_at = ?refreshed.expires_at, "Refreshed access token");
        Ok(refreshed)
    }

    /// Use credentials the host persisted earlier
    pub async fn apply_token(&self, token: &Token) {
        self.connector.authenticate(token.clone()).await;
    }

    /// Apply `token`, refreshing it first if it has expired
    pub async fn ensure_valid(&self, token: &Token) -> Result<Token> {
        if !token.has_expired() {
            debug!("Access token still valid");
            self.apply_token(token).await;
            return Ok(token.clone());
        }

        if !token.can_refresh() {
            return Err(GmailError::token_expired());
        }

        debug!("Access token expired, refreshing");
        self.refresh_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthFailure;
    use crate::transport::{ApiResponse, Endpoint, MockConnector};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn oauth() -> OAuthConfig {
        OAuthConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            ..OAuthConfig::default()
        }
    }

    #[test]
    fn test_authorization_url_requires_client_id() {
        let service = AuthService::new(Arc::new(MockConnector::new()), OAuthConfig::default());
        let err = service.authorization_url(&[], None).unwrap_err();
        assert!(matches!(err, GmailError::Config(_)));
    }

    #[test]
    fn test_authorization_url_default_scopes() {
        let service = AuthService::new(Arc::new(MockConnector::new()), oauth());
        let url = service.authorization_url(&[], None).unwrap();
        assert!(url.contains("gmail.readonly"));
        assert!(url.contains("client_id=client"));
    }

    #[tokio::test]
    async fn test_exchange_code_applies_token() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .withf(|r| r.endpoint == Endpoint::TokenIssuer)
            .times(1)
            .returning(|_| {
                Ok(ApiResponse::new(
                    200,
                    json!({"access_token": "new", "refresh_token": "r1", "expires_in": 3600, "token_type": "Bearer"}),
                ))
            });
        connector
            .expect_authenticate()
            .withf(|t| t.access_token == "new")
            .times(1)
            .return_const(());

        let service = AuthService::new(Arc::new(connector), oauth());
        let token = service.exchange_code("4/code").await.unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_existing_refresh_token() {
        let mut connector = MockConnector::new();
        connector
            .expect_send()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(200, json!({"access_token": "fresh", "expires_in": 3600}))));
        connector.expect_authenticate().times(1).return_const(());

        let service = AuthService::new(Arc::new(connector), oauth());
        let old = Token::new("stale").with_refresh_token("keep-me");
        let refreshed = service.refresh_token(&old).await.unwrap();

        assert_eq!(refreshed.access_token, "fresh");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn test_refresh_rejection_maps_to_refresh_failed() {
        let mut connector = MockConnector::new();
        connector.expect_send().times(1).returning(|_| {
            Ok(ApiResponse::new(
                400,
                json!({"error": "invalid_grant", "error_description": "Token has been expired or revoked."}),
            ))
        });

        let service = AuthService::new(Arc::new(connector), oauth());
        let err = service
            .refresh_token(&Token::new("stale").with_refresh_token("revoked"))
            .await
            .unwrap_err();

        assert_eq!(err.auth_failure(), Some(AuthFailure::RefreshFailed));
        assert!(err.to_string().contains("expired or revoked"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let service = AuthService::new(Arc::new(MockConnector::new()), oauth());
        let err = service.refresh_token(&Token::new("a")).await.unwrap_err();
        assert_eq!(err.auth_failure(), Some(AuthFailure::RefreshFailed));
    }

    #[tokio::test]
    async fn test_ensure_valid_with_expired_unrefreshable_token() {
        let service = AuthService::new(Arc::new(MockConnector::new()), oauth());
        let token = Token::new("a").with_expiry(Utc::now() - Duration::minutes(1));
        let err = service.ensure_valid(&token).await.unwrap_err();
        assert_eq!(err.auth_failure(), Some(AuthFailure::TokenExpired));
    }

    #[tokio::test]
    async fn test_ensure_valid_applies_live_token() {
        let mut connector = MockConnector::new();
        connector.expect_authenticate().times(1).return_const(());

        let service = AuthService::new(Arc::new(connector), oauth());
        let token = Token::new("live").with_expiry(Utc::now() + Duration::hours(1));
        assert_eq!(service.ensure_valid(&token).await.unwrap(), token);
    }
}
