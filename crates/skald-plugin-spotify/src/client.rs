//! Music adapter contract and the Spotify Web API client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::json;
use tracing::{debug, warn};

use skald_plugin::{PluginError, TokenManager};

use crate::types::{PlaybackState, PlaybackToggle, SearchResponse, Track};

/// Spotify Web API root.
pub const API_BASE: &str = "https://api.spotify.com/v1/";

/// Results requested per search; the first one is played.
const SEARCH_LIMIT: &str = "5";

/// Playback operations the skill needs.
#[async_trait]
pub trait MusicAdapter: Send + Sync {
    /// Current player state; `None` when no device is active.
    async fn playback_state(&self) -> Result<Option<PlaybackState>, PluginError>;

    /// Pause when playing, resume otherwise.
    async fn play_pause(&self) -> Result<PlaybackToggle, PluginError>;

    async fn skip_next(&self) -> Result<(), PluginError>;

    async fn skip_previous(&self) -> Result<(), PluginError>;

    /// Best match for `query`, if any.
    async fn search_track(&self, query: &str) -> Result<Option<Track>, PluginError>;

    async fn play_track(&self, uri: &str) -> Result<(), PluginError>;
}

/// Spotify client authorizing every request through a [`TokenManager`].
pub struct SpotifyClient {
    api_base: url::Url,
    tokens: Arc<TokenManager>,
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(tokens: Arc<TokenManager>) -> Result<Self, PluginError> {
        Self::with_api_base(tokens, API_BASE)
    }

    /// Point the client at another API root (a mock server in tests).
    pub fn with_api_base(tokens: Arc<TokenManager>, api_base: &str) -> Result<Self, PluginError> {
        let mut api_base = url::Url::parse(api_base)
            .map_err(|e| PluginError::ConfigurationMissing(format!("invalid api base: {e}")))?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            api_base,
            tokens,
            client: reqwest::Client::new(),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Send an authorized request and reject non-2xx statuses.
    async fn send(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder + Send,
    ) -> Result<Response, PluginError> {
        let bearer = self.tokens.bearer().await?;
        let url = self
            .api_base
            .join(path)
            .map_err(|e| PluginError::AdapterUnavailable(format!("bad endpoint '{path}': {e}")))?;

        let request = build(self.client.request(method.clone(), url).bearer_auth(bearer));
        let response = request.send().await.map_err(|e| {
            warn!(%method, path, error = %e, "spotify request failed");
            PluginError::AdapterUnavailable(format!("{method} {path}: {e}"))
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "spotify rejected the access token");
            return Err(PluginError::TokenInvalid(format!("{method} {path} returned {status}")));
        }
        if !status.is_success() {
            warn!(%method, path, status = %status, "spotify request rejected");
            return Err(PluginError::AdapterUnavailable(format!(
                "{method} {path} returned {status}"
            )));
        }
        debug!(%method, path, status = %status, "spotify request ok");
        Ok(response)
    }

    async fn command(&self, method: Method, path: &str) -> Result<(), PluginError> {
        self.send(method, path, |request| request).await.map(|_| ())
    }
}

#[async_trait]
impl MusicAdapter for SpotifyClient {
    async fn playback_state(&self) -> Result<Option<PlaybackState>, PluginError> {
        let response = self.send(Method::GET, "me/player", |request| request).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| PluginError::AdapterUnavailable(format!("unexpected player payload: {e}")))
    }

    async fn play_pause(&self) -> Result<PlaybackToggle, PluginError> {
        let state = self
            .playback_state()
            .await?
            .ok_or_else(|| PluginError::AdapterUnavailable("no active playback device".into()))?;
        if state.is_playing {
            self.command(Method::PUT, "me/player/pause").await?;
            Ok(PlaybackToggle::Paused)
        } else {
            self.command(Method::PUT, "me/player/play").await?;
            Ok(PlaybackToggle::Resumed)
        }
    }

    async fn skip_next(&self) -> Result<(), PluginError> {
        self.command(Method::POST, "me/player/next").await
    }

    async fn skip_previous(&self) -> Result<(), PluginError> {
        self.command(Method::POST, "me/player/previous").await
    }

    async fn search_track(&self, query: &str) -> Result<Option<Track>, PluginError> {
        let response = self
            .send(Method::GET, "search", |request| {
                request.query(&[("q", query), ("type", "track"), ("limit", SEARCH_LIMIT)])
            })
            .await?;
        let page: SearchResponse = response
            .json()
            .await
            .map_err(|e| {
                PluginError::AdapterUnavailable(format!("unexpected search payload: {e}"))
            })?;
        Ok(page.tracks.items.into_iter().next())
    }

    async fn play_track(&self, uri: &str) -> Result<(), PluginError> {
        self.send(Method::PUT, "me/player/play", |request| {
            request.json(&json!({"uris": [uri]}))
        })
        .await
        .map(|_| ())
    }
}
