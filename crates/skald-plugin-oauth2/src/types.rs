//! Types for the OAuth2 authorization-code flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skald_plugin::{PluginError, TokenState};

/// Client registration with one OAuth2 provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2ClientConfig {
    /// Provider name (used as key for token storage).
    pub name: String,

    pub client_id: String,

    /// Read from plugin options; never serialized back out.
    #[serde(default, skip_serializing)]
    pub client_secret: String,

    /// Authorization endpoint URL.
    pub auth_url: String,

    /// Token endpoint URL.
    pub token_url: String,

    /// OAuth2 scopes to request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Redirect URI for the authorization code flow.
    pub redirect_uri: String,
}

impl std::fmt::Debug for OAuth2ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ClientConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl OAuth2ClientConfig {
    /// Fail with [`PluginError::ConfigurationMissing`] when credentials are blank.
    pub fn require_credentials(&self) -> Result<(), PluginError> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(PluginError::ConfigurationMissing(format!(
                "{}: client_id and client_secret",
                self.name
            )));
        }
        Ok(())
    }

    /// URL the user opens to grant access.
    pub fn authorize_url(&self, state: Option<&str>) -> Result<url::Url, PluginError> {
        let mut url = url::Url::parse(&self.auth_url)
            .map_err(|e| PluginError::InvalidManifest(format!("invalid auth URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.redirect_uri);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }
}

/// Stored OAuth2 tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    /// Access token.
    pub access_token: String,

    /// Refresh token (if available).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Expiration timestamp (Unix seconds).
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// Provider name this token belongs to.
    pub provider: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredTokens {
    /// Snapshot of a [`TokenState`]; `None` when there is no access token.
    pub fn from_state(provider: &str, state: &TokenState) -> Option<Self> {
        Some(Self {
            access_token: state.access_token.clone()?,
            refresh_token: state.refresh_token.clone(),
            token_type: default_token_type(),
            expires_at: state.expires_at.map(|at| at.timestamp()),
            provider: provider.to_string(),
        })
    }

    pub fn into_state(self) -> TokenState {
        TokenState {
            access_token: Some(self.access_token),
            refresh_token: self.refresh_token,
            expires_at: self
                .expires_at
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }
    }

    /// Whether the access token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now.timestamp() >= expires_at)
    }
}
