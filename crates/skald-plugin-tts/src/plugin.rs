//! The `tts` skill: contributes the local speech engines.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use skald_plugin::{
    BackendCapabilities, EffectiveOptions, Manifest, PluginError, SkillPlugin, SpeechSink,
    TtsBackend,
};

use crate::espeak::{self, EspeakBackend};
use crate::piper::{self, PiperBackend};

pub const PLUGIN_ID: &str = "tts";

struct Engines {
    espeak: Arc<EspeakBackend>,
    piper: Arc<PiperBackend>,
}

/// Declares the `espeak` and `piper` backends and builds them from options.
#[derive(Default)]
pub struct TtsPlugin {
    engines: OnceLock<Engines>,
}

impl TtsPlugin {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SkillPlugin for TtsPlugin {
    fn id(&self) -> &str {
        PLUGIN_ID
    }

    fn declare(&self) -> Manifest {
        Manifest::new("Синтез речи", "1.0")
            .with_description("Локальные движки синтеза речи: espeak-ng и piper")
            .with_option("is_active", true)
            .with_option("prefer_language", "ru")
            .with_option("prefer_gender", "female")
            .with_option("default_voice_index", 0)
            .with_option("voice_by_call_name", json!({}))
            .with_option("rate", espeak::DEFAULT_RATE)
            .with_option("volume", espeak::DEFAULT_VOLUME)
            .with_option("model_path", "")
            .with_option("player", "")
            .with_backend(espeak::BACKEND_NAME, BackendCapabilities::SPEAK_AND_RENDER)
            .with_backend(piper::BACKEND_NAME, BackendCapabilities::RENDER_ONLY)
    }

    async fn activate(
        &self,
        _speech: &dyn SpeechSink,
        options: &EffectiveOptions,
        manifest: Manifest,
    ) -> Result<Manifest, PluginError> {
        let engines = Engines {
            espeak: Arc::new(EspeakBackend::detect(options)),
            piper: Arc::new(PiperBackend::detect(options)),
        };
        debug!(
            espeak = ?engines.espeak.binary(),
            piper_model = ?engines.piper.model(),
            "tts engines configured"
        );
        let _ = self.engines.set(engines);
        Ok(manifest.gated(options))
    }

    fn tts_backend(&self, name: &str) -> Option<Arc<dyn TtsBackend>> {
        let engines = self.engines.get()?;
        match name {
            espeak::BACKEND_NAME => Some(engines.espeak.clone()),
            piper::BACKEND_NAME => Some(engines.piper.clone()),
            _ => None,
        }
    }
}
