//! OAuth2 authorization-code flow requests (Google's token issuer)

use serde_json::json;
use url::Url;

use crate::config::OAuthConfig;
use crate::error::{GmailError, Result};
use crate::transport::{ApiRequest, AUTHORIZATION_URL};

/// Consent page URL. Requests offline access so a refresh token is issued.
pub fn authorization_url(oauth: &OAuthConfig, scopes: &[String], state: Option<&str>) -> Result<String> {
    let mut url = Url::parse(AUTHORIZATION_URL)
        .map_err(|e| GmailError::Config(format!("Invalid authorization URL: {}", e)))?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("client_id", &oauth.client_id)
            .append_pair("redirect_uri", &oauth.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    Ok(url.into())
}

pub fn exchange_code(oauth: &OAuthConfig, code: &str) -> ApiRequest {
    ApiRequest::token(json!({
        "grant_type": "authorization_code",
        "code": code,
        "client_id": oauth.client_id,
        "client_secret": oauth.client_secret,
        "redirect_uri": oauth.redirect_uri,
    }))
}

pub fn refresh(oauth: &OAuthConfig, refresh_token: &str) -> ApiRequest {
    ApiRequest::token(json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
        "client_id": oauth.client_id,
        "client_secret": oauth.client_secret,
    }))
}
