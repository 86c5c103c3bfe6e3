//! OAuth2 authorization-code flow for skald integrations.
//!
//! Provides the HTTP side of [`skald_plugin::TokenManager`]:
//! - [`HttpTokenEndpoint`] posts `authorization_code` and `refresh_token`
//!   grants to a provider's token URL;
//! - [`TokenStore`] / [`ProviderTokenCache`] persist tokens between runs;
//! - [`OAuth2ClientConfig::authorize_url`] builds the consent URL.
//!
//! # Security
//!
//! - Tokens stored with 0600 file permissions.
//! - `client_secret` is never serialized or debug-printed.
//! - Rotated refresh tokens are persisted as soon as they arrive.

pub mod token_store;
pub mod types;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use skald_plugin::{PluginError, TokenEndpoint, TokenGrant};

pub use token_store::{ProviderTokenCache, TokenStore};
pub use types::{OAuth2ClientConfig, StoredTokens};

/// Token endpoint reached over HTTP with form-encoded grants.
pub struct HttpTokenEndpoint {
    config: OAuth2ClientConfig,
    client: reqwest::Client,
}

impl HttpTokenEndpoint {
    pub fn new(config: OAuth2ClientConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: OAuth2ClientConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &OAuth2ClientConfig {
        &self.config
    }

    async fn post_grant(
        &self,
        grant: &str,
        form: &[(&str, &str)],
    ) -> Result<TokenGrant, PluginError> {
        self.config.require_credentials()?;

        let response = self
            .client
            .post(&self.config.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| PluginError::AdapterUnavailable(format!("{grant} request failed: {e}")))?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            PluginError::TokenInvalid(format!("failed to parse {grant} response ({status}): {e}"))
        })?;

        debug!(provider = %self.config.name, grant, status = %status, "token endpoint replied");
        parse_grant(status, &body)
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PluginError> {
        self.post_grant(
            "authorization_code",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.config.redirect_uri),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ],
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PluginError> {
        self.post_grant(
            "refresh_token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ],
        )
        .await
    }
}

/// Interpret a token endpoint response.
///
/// Non-success statuses and bodies without `access_token` are
/// [`PluginError::TokenInvalid`]; the provider's `error_description` (or
/// `error`) is carried in the message.
pub fn parse_grant(status: StatusCode, body: &Value) -> Result<TokenGrant, PluginError> {
    if !status.is_success() {
        let error = body
            .get("error_description")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(PluginError::TokenInvalid(format!("token endpoint returned {status}: {error}")));
    }

    let access_token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| PluginError::TokenInvalid("no access_token in response".into()))?;

    Ok(TokenGrant {
        access_token: access_token.to_string(),
        refresh_token: body
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(String::from),
        expires_in: body.get("expires_in").and_then(Value::as_i64),
    })
}
