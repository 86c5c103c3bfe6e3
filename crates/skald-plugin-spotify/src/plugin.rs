//! Spotify skill: playback control, search and "what's playing".

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{info, warn};

use skald_plugin::{
    CommandContext, EffectiveOptions, Invocation, Manifest, PluginError, SkillPlugin, SpeechSink,
    TokenManager,
};
use skald_plugin_oauth2::{HttpTokenEndpoint, OAuth2ClientConfig, ProviderTokenCache, TokenStore};

use crate::client::{MusicAdapter, SpotifyClient};
use crate::types::PlaybackToggle;

pub const PLUGIN_ID: &str = "spotify";

pub const AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:5003/spotify_callback";

pub const SCOPES: [&str; 5] = [
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "playlist-read-private",
    "user-library-read",
];

const CONNECTED: &str = "Spotify успешно подключен!";
const CONNECT_FAILED: &str = "Ошибка подключения к Spotify";
const NOT_CONFIGURED_LONG: &str = "Spotify не настроен. Проверьте настройки плагина.";
const NOT_CONFIGURED: &str = "Spotify не настроен";

const COMMANDS: [(&str, &str, &str); 6] = [
    ("включи музыку|поставь музыку", "play", "Resume playback"),
    ("пауза|поставь на паузу", "pause", "Pause playback"),
    ("следующий трек|следующий", "next", "Skip to the next track"),
    ("предыдущий трек|предыдущий", "previous", "Back to the previous track"),
    ("поставь трек|найди трек", "search", "Search for a track and play it"),
    ("статус музыки|что играет", "status", "Say what is playing"),
];

/// OAuth2 registration built from the skill's options.
pub fn oauth_config(options: &EffectiveOptions) -> OAuth2ClientConfig {
    OAuth2ClientConfig {
        name: PLUGIN_ID.into(),
        client_id: options.str("client_id").unwrap_or_default().trim().to_string(),
        client_secret: options.str("client_secret").unwrap_or_default().trim().to_string(),
        auth_url: AUTH_URL.into(),
        token_url: TOKEN_URL.into(),
        scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
        redirect_uri: options
            .non_empty_str("redirect_uri")
            .unwrap_or(DEFAULT_REDIRECT_URI)
            .to_string(),
    }
}

/// The Spotify skill.
pub struct SpotifyPlugin {
    store: TokenStore,
    preset: Option<Arc<dyn MusicAdapter>>,
    adapter: OnceLock<Arc<dyn MusicAdapter>>,
}

impl Default for SpotifyPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotifyPlugin {
    pub fn new() -> Self {
        Self {
            store: TokenStore::new(),
            preset: None,
            adapter: OnceLock::new(),
        }
    }

    /// Persist tokens in `store` instead of `~/.skald/tokens`.
    pub fn with_token_store(mut self, store: TokenStore) -> Self {
        self.store = store;
        self
    }

    /// Use `adapter` instead of the Web API client.
    pub fn with_adapter(adapter: Arc<dyn MusicAdapter>) -> Self {
        Self {
            preset: Some(adapter),
            ..Self::new()
        }
    }

    /// Build the token manager and client; speaks the connection result
    /// when an authorization code had to be exchanged.
    async fn connect(
        &self,
        speech: &dyn SpeechSink,
        options: &EffectiveOptions,
    ) -> Result<Arc<dyn MusicAdapter>, PluginError> {
        let config = oauth_config(options);
        config.require_credentials()?;

        let tokens = Arc::new(
            TokenManager::new(PLUGIN_ID, Arc::new(HttpTokenEndpoint::new(config)))
                .with_cache(Arc::new(ProviderTokenCache::new(self.store.clone(), PLUGIN_ID))),
        );

        let auth_code = options.non_empty_str("auth_code").map(str::trim);
        if tokens.restore().await {
            info!(plugin = PLUGIN_ID, "using cached spotify tokens");
        } else if let Some(code) = auth_code {
            if tokens.exchange(code).await {
                speech.emit_speech(CONNECTED);
            } else {
                speech.emit_speech(CONNECT_FAILED);
            }
        } else {
            warn!(
                plugin = PLUGIN_ID,
                "no auth_code and no cached tokens; run `skald spotify-auth-url`"
            );
        }

        Ok(Arc::new(SpotifyClient::new(tokens)?))
    }

    fn adapter_or_fail(
        &self,
        ctx: &CommandContext<'_>,
        message: &str,
    ) -> Result<&dyn MusicAdapter, PluginError> {
        match self.adapter.get() {
            Some(adapter) => Ok(adapter.as_ref()),
            None => {
                ctx.say(message);
                Err(PluginError::ConfigurationMissing(
                    "spotify client_id and client_secret".into(),
                ))
            }
        }
    }
}

#[async_trait]
impl SkillPlugin for SpotifyPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn declare(&self) -> Manifest {
        let manifest = Manifest::new("Spotify интеграция", "1.0")
            .requires_online(true)
            .with_description("Интеграция с Spotify для управления музыкой")
            .with_option("is_active", false)
            .with_option("client_id", "")
            .with_option("client_secret", "")
            .with_option("redirect_uri", DEFAULT_REDIRECT_URI)
            .with_option("auth_code", "");
        COMMANDS
            .iter()
            .fold(manifest, |manifest, (pattern, id, description)| {
                manifest.with_command(*pattern, *id, *description)
            })
    }

    async fn activate(
        &self,
        speech: &dyn SpeechSink,
        options: &EffectiveOptions,
        manifest: Manifest,
    ) -> Result<Manifest, PluginError> {
        if !options.is_active() {
            return Ok(manifest.suppress_commands());
        }
        let adapter = match &self.preset {
            Some(adapter) => adapter.clone(),
            None => match self.connect(speech, options).await {
                Ok(adapter) => adapter,
                Err(e) => {
                    speech.emit_speech(NOT_CONFIGURED_LONG);
                    return Err(e);
                }
            },
        };
        let _ = self.adapter.set(adapter);
        Ok(manifest)
    }

    fn is_ready(&self) -> bool {
        self.adapter.get().is_some()
    }

    async fn invoke(
        &self,
        command: &str,
        ctx: &CommandContext<'_>,
        invocation: &Invocation,
    ) -> Result<(), PluginError> {
        match command {
            "play" => {
                let music = self.adapter_or_fail(ctx, NOT_CONFIGURED_LONG)?;
                play(music, ctx).await
            }
            "pause" => pause(self.adapter_or_fail(ctx, NOT_CONFIGURED)?, ctx).await,
            "next" => {
                let music = self.adapter_or_fail(ctx, NOT_CONFIGURED)?;
                let result = music.skip_next().await;
                answer(ctx, result, "Следующий трек", "Не удалось переключить трек")
            }
            "previous" => {
                let music = self.adapter_or_fail(ctx, NOT_CONFIGURED)?;
                let result = music.skip_previous().await;
                answer(ctx, result, "Предыдущий трек", "Не удалось переключить трек")
            }
            "search" => {
                let music = self.adapter_or_fail(ctx, NOT_CONFIGURED)?;
                search_and_play(music, ctx, invocation).await
            }
            "status" => status(self.adapter_or_fail(ctx, NOT_CONFIGURED)?, ctx).await,
            other => Err(PluginError::NotImplemented(format!(
                "{PLUGIN_ID} has no command '{other}'"
            ))),
        }
    }
}

fn answer(
    ctx: &CommandContext<'_>,
    result: Result<(), PluginError>,
    success: &str,
    failure: &str,
) -> Result<(), PluginError> {
    match result {
        Ok(()) => {
            ctx.say(success);
            Ok(())
        }
        Err(e) => {
            ctx.say(failure);
            Err(e)
        }
    }
}

/// Resume unless already playing; never pauses.
async fn play(music: &dyn MusicAdapter, ctx: &CommandContext<'_>) -> Result<(), PluginError> {
    const FAILED: &str = "Не удалось включить музыку";
    let result = match music.playback_state().await {
        Ok(Some(state)) if state.is_playing => Ok(()),
        Ok(Some(_)) => match music.play_pause().await {
            Ok(PlaybackToggle::Resumed) => Ok(()),
            Ok(PlaybackToggle::Paused) => music.play_pause().await.map(|_| ()),
            Err(e) => Err(e),
        },
        Ok(None) => Err(PluginError::AdapterUnavailable("no active playback device".into())),
        Err(e) => Err(e),
    };
    answer(ctx, result, "Музыка включена!", FAILED)
}

/// Pause unless already paused; never resumes.
async fn pause(music: &dyn MusicAdapter, ctx: &CommandContext<'_>) -> Result<(), PluginError> {
    const FAILED: &str = "Не удалось поставить на паузу";
    let result = match music.playback_state().await {
        Ok(Some(state)) if state.is_playing => music.play_pause().await.map(|_| ()),
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(PluginError::AdapterUnavailable("no active playback device".into())),
        Err(e) => Err(e),
    };
    answer(ctx, result, "Музыка поставлена на паузу", FAILED)
}

async fn search_and_play(
    music: &dyn MusicAdapter,
    ctx: &CommandContext<'_>,
    invocation: &Invocation,
) -> Result<(), PluginError> {
    let Some(query) = invocation.argument() else {
        ctx.say("Скажите название трека");
        return Ok(());
    };
    ctx.say(format!("Ищу трек {query}"));

    match music.search_track(query).await {
        Ok(Some(track)) => {
            let result = music.play_track(&track.uri).await;
            let success = format!("Воспроизвожу {} от {}", track.name, track.artist());
            answer(ctx, result, &success, "Не удалось воспроизвести трек")
        }
        Ok(None) => {
            ctx.say(format!("Трек {query} не найден"));
            Ok(())
        }
        Err(e) => {
            ctx.say("Не удалось найти трек");
            Err(e)
        }
    }
}

async fn status(music: &dyn MusicAdapter, ctx: &CommandContext<'_>) -> Result<(), PluginError> {
    match music.playback_state().await {
        Ok(state) => {
            match state.as_ref().and_then(|s| s.now_playing()) {
                Some(track) => {
                    ctx.say(format!("Сейчас играет {} от {}", track.name, track.artist()))
                }
                None => ctx.say("Музыка не воспроизводится"),
            }
            Ok(())
        }
        Err(e) => {
            ctx.say("Не удалось узнать, что играет");
            Err(e)
        }
    }
}
