//! CLI command implementations for `skald`.
//!
//! - [`run`] -- line-oriented utterance loop.
//! - [`plugins`] -- `plugins` and `commands` listings.
//! - [`say`] -- speak text through the configured backend.
//! - [`spotify`] -- Spotify authorization URL.

pub mod plugins;
pub mod run;
pub mod say;
pub mod spotify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use skald_plugin::{ActiveBackend, PluginHost, SkillPlugin, SpeechSink};
use skald_plugin_homeassistant::HomeAssistantPlugin;
use skald_plugin_oauth2::TokenStore;
use skald_plugin_spotify::SpotifyPlugin;
use skald_plugin_tts::{CommandPlayer, TtsPlugin};

use crate::config::{HostConfig, OptionsStore, resolve_config_dir};
use crate::greeter::GreeterPlugin;

/// Resolved configuration shared by every command.
pub struct Context {
    pub config_dir: PathBuf,
    pub config: HostConfig,
    pub options: OptionsStore,
}

impl Context {
    pub fn load(config_dir: Option<&Path>) -> anyhow::Result<Self> {
        let config_dir = resolve_config_dir(config_dir);
        let config = HostConfig::load(&config_dir)?;
        let options = OptionsStore::new(&config_dir);
        Ok(Self {
            config_dir,
            config,
            options,
        })
    }

    /// Every plugin shipped with the binary, in load order.
    pub fn builtin_plugins(&self) -> Vec<Arc<dyn SkillPlugin>> {
        let tokens = TokenStore::with_dir(self.config_dir.join("tokens"));
        vec![
            Arc::new(GreeterPlugin),
            Arc::new(TtsPlugin::new()),
            Arc::new(HomeAssistantPlugin::new()),
            Arc::new(SpotifyPlugin::new().with_token_store(tokens)),
        ]
    }

    /// Load every plugin into a fresh host.
    ///
    /// A plugin that fails to load is skipped and logged; the rest still load.
    pub async fn load_host(&self, speech: Arc<dyn SpeechSink>) -> PluginHost {
        let mut host = PluginHost::new(speech);

        let preferred_player = self
            .options
            .load(skald_plugin_tts::PLUGIN_ID)
            .get("player")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let Some(player) = CommandPlayer::detect(preferred_player.as_deref()) {
            host.backends_mut().set_player(Arc::new(player));
        }

        for plugin in self.builtin_plugins() {
            let id = plugin.id().to_string();
            let persisted = self.options.load(&id);
            let report = match host.load(plugin, &persisted).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(plugin = %id, kind = e.kind(), error = %e, "plugin skipped");
                    continue;
                }
            };
            for conflict in &report.conflicts {
                warn!(plugin = %id, error = %conflict, "command not registered");
            }
            if self.config.seed_options && !self.options.exists(&id) {
                if let Some(options) = host.options(&id) {
                    if let Err(e) = self.options.save(&id, options.as_map()) {
                        warn!(plugin = %id, error = %e, "could not seed options");
                    }
                }
            }
        }
        host
    }

    /// Activate the configured backend, logging instead of failing.
    pub async fn activate_backend(&self, host: &PluginHost) -> Option<Arc<ActiveBackend>> {
        let name = &self.config.tts_backend;
        match host.activate_backend(name).await {
            Ok(active) => {
                info!(backend = %name, voice = ?active.voice().map(|v| &v.id), "speech ready");
                Some(active)
            }
            Err(e) => {
                warn!(
                    backend = %name,
                    kind = e.kind(),
                    error = %e,
                    "speech output unavailable, printing only"
                );
                None
            }
        }
    }
}
