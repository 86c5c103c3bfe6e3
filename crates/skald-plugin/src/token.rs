//! OAuth-style access/refresh token lifecycle.
//!
//! [`TokenManager`] owns one integration's [`TokenState`] and serializes
//! every transition behind a `tokio::sync::Mutex`, so two callers can never
//! refresh the same token concurrently.
//!
//! ```text
//! Unauthenticated --exchange ok--> Authenticated --now >= expires_at--> Expired
//!        ^                                ^                                |
//!        |                                +---------refresh ok-------------+
//!        +-------------------------refresh failed--------------------------+
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::PluginError;

/// Tokens held for one integration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry. `None` with an access token means it never expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Where a [`TokenState`] sits in the lifecycle at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    Unauthenticated,
    Authenticated,
    Expired,
}

impl TokenState {
    /// Phase at `now`, treating tokens as expired `skew` early.
    pub fn phase_at(&self, now: DateTime<Utc>, skew: Duration) -> TokenPhase {
        match (&self.access_token, self.expires_at) {
            (None, _) => TokenPhase::Unauthenticated,
            (Some(_), Some(expires_at)) if now >= expires_at - skew => TokenPhase::Expired,
            (Some(_), _) => TokenPhase::Authenticated,
        }
    }
}

/// What a token endpoint returns on a successful exchange or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Omitted by servers that keep the previous refresh token valid.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Network side of the lifecycle.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Trade an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, PluginError>;

    /// Trade a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PluginError>;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Persistence for a [`TokenState`] across restarts.
pub trait TokenCache: Send + Sync {
    fn load(&self) -> Result<Option<TokenState>, PluginError>;
    fn store(&self, state: &TokenState) -> Result<(), PluginError>;
    fn clear(&self) -> Result<(), PluginError>;
}

/// Serialized access/refresh/expiry state machine for one integration.
pub struct TokenManager {
    name: String,
    endpoint: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<dyn TokenCache>>,
    skew: Duration,
    state: Mutex<TokenState>,
}

impl TokenManager {
    pub fn new(name: impl Into<String>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            name: name.into(),
            endpoint,
            clock: Arc::new(SystemClock),
            cache: None,
            skew: Duration::zero(),
            state: Mutex::new(TokenState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Treat tokens as expired this much before their real expiry.
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load cached tokens, if a cache is attached and holds any.
    ///
    /// Returns whether an access or refresh token was restored.
    pub async fn restore(&self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        match cache.load() {
            Ok(Some(cached)) => {
                let usable = cached.access_token.is_some() || cached.refresh_token.is_some();
                *self.state.lock().await = cached;
                debug!(integration = %self.name, usable, "restored cached tokens");
                usable
            }
            Ok(None) => false,
            Err(e) => {
                warn!(integration = %self.name, error = %e, "failed to load cached tokens");
                false
            }
        }
    }

    /// One-shot authorization-code exchange.
    ///
    /// On failure the current state is left untouched.
    pub async fn exchange(&self, code: &str) -> bool {
        let mut state = self.state.lock().await;
        let granted = self.endpoint.exchange_code(code).await.and_then(|grant| {
            let expires_at = expiry_after(self.clock.now(), grant.expires_in)?;
            Ok((grant, expires_at))
        });
        match granted {
            Ok((grant, expires_at)) => {
                *state = TokenState {
                    access_token: Some(grant.access_token),
                    refresh_token: grant.refresh_token,
                    expires_at,
                };
                self.persist(&state);
                info!(integration = %self.name, "authorization code exchanged");
                true
            }
            Err(e) => {
                warn!(integration = %self.name, error = %e, "authorization code exchange failed");
                false
            }
        }
    }

    /// Make sure a usable access token is present, refreshing if needed.
    ///
    /// Repeated calls inside the validity window never hit the endpoint.
    pub async fn ensure_valid(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.phase_at(self.clock.now(), self.skew) {
            TokenPhase::Authenticated => true,
            TokenPhase::Unauthenticated | TokenPhase::Expired => {
                self.refresh_locked(&mut state).await
            }
        }
    }

    /// Force a refresh with the stored refresh token.
    pub async fn refresh(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refresh_locked(&mut state).await
    }

    /// A valid access token, or [`PluginError::TokenInvalid`].
    pub async fn bearer(&self) -> Result<String, PluginError> {
        if !self.ensure_valid().await {
            return Err(PluginError::TokenInvalid(format!(
                "{}: no valid access token",
                self.name
            )));
        }
        self.state
            .lock()
            .await
            .access_token
            .clone()
            .ok_or_else(|| {
                PluginError::TokenInvalid(format!("{}: access token missing", self.name))
            })
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> TokenState {
        self.state.lock().await.clone()
    }

    pub async fn phase(&self) -> TokenPhase {
        self.state.lock().await.phase_at(self.clock.now(), self.skew)
    }

    async fn refresh_locked(&self, state: &mut TokenState) -> bool {
        let Some(refresh_token) = state.refresh_token.clone() else {
            if state.access_token.is_some() {
                warn!(
                    integration = %self.name,
                    "access token expired and no refresh token is stored"
                );
            }
            self.invalidate(state);
            return false;
        };

        let granted = self.endpoint.refresh(&refresh_token).await.and_then(|grant| {
            let expires_at = expiry_after(self.clock.now(), grant.expires_in)?;
            Ok((grant, expires_at))
        });
        match granted {
            Ok((grant, expires_at)) => {
                state.access_token = Some(grant.access_token);
                state.expires_at = expires_at;
                if let Some(rotated) = grant.refresh_token {
                    state.refresh_token = Some(rotated);
                }
                self.persist(state);
                debug!(
                    integration = %self.name,
                    expires_at = ?state.expires_at,
                    "access token refreshed"
                );
                true
            }
            Err(e) => {
                warn!(integration = %self.name, error = %e, "token refresh failed");
                self.invalidate(state);
                false
            }
        }
    }

    /// Drop every token: nothing comes back without a fresh exchange.
    fn invalidate(&self, state: &mut TokenState) {
        *state = TokenState::default();
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                warn!(integration = %self.name, error = %e, "failed to clear cached tokens");
            }
        }
    }

    fn persist(&self, state: &TokenState) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(state) {
                warn!(integration = %self.name, error = %e, "failed to persist tokens");
            }
        }
    }
}

/// Absolute expiry for a grant's `expires_in`.
///
/// `None` lifetime means the token never expires. A lifetime that does not
/// fit the calendar is [`PluginError::TokenInvalid`].
fn expiry_after(
    now: DateTime<Utc>,
    expires_in: Option<i64>,
) -> Result<Option<DateTime<Utc>>, PluginError> {
    let Some(secs) = expires_in else {
        return Ok(None);
    };
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .map(Some)
        .ok_or_else(|| PluginError::TokenInvalid(format!("expires_in out of range: {secs}")))
}
