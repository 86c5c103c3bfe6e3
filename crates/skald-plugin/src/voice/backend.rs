//! TTS backend contract, registry and the active backend.
//!
//! A backend declares two capability flags. [`ActiveBackend::speak_text`]
//! enforces the composition rule so callers never have to:
//! - speak-direct backends are asked to speak first;
//! - when speaking is unavailable or fails, the text is normalized,
//!   rendered to a temporary WAV file and played through the host's
//!   [`AudioPlayer`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::PluginError;
use crate::manifest::BackendCapabilities;
use crate::options::EffectiveOptions;
use crate::traits::{NumeralNormalizer, PassthroughNumerals};

use super::normalize::normalize_for_speech;
use super::selection::{VoiceChoice, VoiceDescriptor, VoicePreferences, select_voice};

/// Text plus the voice to say it with.
#[derive(Debug, Clone, Copy)]
pub struct SpeechRequest<'a> {
    pub text: &'a str,
    pub voice: Option<&'a VoiceChoice>,
}

/// A named text-to-speech implementation.
///
/// Only the methods matching [`capabilities`](Self::capabilities) need to
/// be implemented; the defaults report [`PluginError::NotImplemented`].
#[async_trait]
pub trait TtsBackend: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> BackendCapabilities;

    /// Check the engine is usable. Called once per activation.
    async fn init(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Voices in the engine's enumeration order.
    async fn voices(&self) -> Result<Vec<VoiceDescriptor>, PluginError> {
        Ok(Vec::new())
    }

    async fn speak(&self, request: &SpeechRequest<'_>) -> Result<(), PluginError> {
        let _ = request;
        Err(PluginError::NotImplemented(format!(
            "{} cannot speak directly",
            self.name()
        )))
    }

    async fn render_to_file(
        &self,
        request: &SpeechRequest<'_>,
        path: &Path,
    ) -> Result<(), PluginError> {
        let _ = (request, path);
        Err(PluginError::NotImplemented(format!(
            "{} cannot render to a file",
            self.name()
        )))
    }
}

/// Plays an audio file to completion.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    fn name(&self) -> &str;

    async fn play_file(&self, path: &Path) -> Result<(), PluginError>;
}

struct BackendEntry {
    owner: String,
    backend: Arc<dyn TtsBackend>,
    preferences: VoicePreferences,
}

/// All backends registered by loaded plugins, plus the active one.
pub struct BackendRegistry {
    entries: BTreeMap<String, BackendEntry>,
    player: Option<Arc<dyn AudioPlayer>>,
    numerals: Arc<dyn NumeralNormalizer>,
    active: RwLock<Option<Arc<ActiveBackend>>>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            player: None,
            numerals: Arc::new(PassthroughNumerals),
            active: RwLock::new(None),
        }
    }

    pub fn set_player(&mut self, player: Arc<dyn AudioPlayer>) {
        self.player = Some(player);
    }

    pub fn set_numerals(&mut self, numerals: Arc<dyn NumeralNormalizer>) {
        self.numerals = numerals;
    }

    /// Register `backend` for `owner`, reading voice preferences from the
    /// owner's options.
    pub fn register(
        &mut self,
        owner: &str,
        backend: Arc<dyn TtsBackend>,
        options: &EffectiveOptions,
    ) -> Result<(), PluginError> {
        let name = backend.name().to_string();
        if !backend.capabilities().is_usable() {
            return Err(PluginError::InvalidBackend(format!(
                "'{name}' can neither speak nor render"
            )));
        }
        if let Some(existing) = self.entries.get(&name) {
            return Err(PluginError::InvalidBackend(format!(
                "'{name}' is already provided by '{}'",
                existing.owner
            )));
        }
        debug!(backend = %name, owner = %owner, "registered tts backend");
        self.entries.insert(
            name,
            BackendEntry {
                owner: owner.to_string(),
                backend,
                preferences: VoicePreferences::from_options(options),
            },
        );
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn owner(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.owner.as_str())
    }

    /// Initialize `name`, select its voice and make it the active backend.
    ///
    /// Replaces any previous active backend as a whole; callers holding
    /// the old `Arc` keep using it undisturbed.
    pub async fn activate(&self, name: &str) -> Result<Arc<ActiveBackend>, PluginError> {
        let entry = self.entries.get(name).ok_or_else(|| {
            PluginError::InvalidBackend(format!("no tts backend named '{name}'"))
        })?;
        let caps = entry.backend.capabilities();
        if !caps.can_speak_directly && self.player.is_none() {
            return Err(PluginError::ConfigurationMissing(format!(
                "'{name}' only renders to files and no audio player is available"
            )));
        }

        entry.backend.init().await?;
        let voices = match entry.backend.voices().await {
            Ok(voices) => voices,
            Err(e) => {
                warn!(backend = %name, error = %e, "could not enumerate voices");
                Vec::new()
            }
        };
        let voice = select_voice(&voices, &entry.preferences, "");
        info!(
            backend = %name,
            voices = voices.len(),
            voice = voice.as_ref().map(|v| v.id.as_str()).unwrap_or("<engine default>"),
            "activated tts backend"
        );

        let active = Arc::new(ActiveBackend {
            name: name.to_string(),
            backend: entry.backend.clone(),
            voices,
            preferences: entry.preferences.clone(),
            voice,
            player: self.player.clone(),
            numerals: self.numerals.clone(),
        });
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(active.clone());
        Ok(active)
    }

    pub fn active(&self) -> Option<Arc<ActiveBackend>> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Speak through the active backend.
    pub async fn speak_text(&self, text: &str, addressed_name: &str) -> Result<(), PluginError> {
        let active = self.active().ok_or_else(|| {
            PluginError::ConfigurationMissing("no active tts backend".into())
        })?;
        active.speak_text(text, addressed_name).await
    }
}

/// An initialized backend with its cached voice selection.
pub struct ActiveBackend {
    name: String,
    backend: Arc<dyn TtsBackend>,
    voices: Vec<VoiceDescriptor>,
    preferences: VoicePreferences,
    voice: Option<VoiceChoice>,
    player: Option<Arc<dyn AudioPlayer>>,
    numerals: Arc<dyn NumeralNormalizer>,
}

impl std::fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveBackend")
            .field("name", &self.name)
            .field("voice", &self.voice)
            .field("voices", &self.voices.len())
            .finish()
    }
}

impl ActiveBackend {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Voice chosen at activation.
    pub fn voice(&self) -> Option<&VoiceChoice> {
        self.voice.as_ref()
    }

    pub fn voices(&self) -> &[VoiceDescriptor] {
        &self.voices
    }

    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    /// Voice for an utterance addressed with `addressed_name`.
    pub fn voice_for(&self, addressed_name: &str) -> Option<VoiceChoice> {
        self.preferences
            .override_for(addressed_name, &self.voices)
            .or_else(|| self.voice.clone())
    }

    /// Say `text`, directly when possible, else by render + play.
    pub async fn speak_text(&self, text: &str, addressed_name: &str) -> Result<(), PluginError> {
        let voice = self.voice_for(addressed_name);
        let caps = self.backend.capabilities();

        if caps.can_speak_directly {
            let request = SpeechRequest {
                text,
                voice: voice.as_ref(),
            };
            match self.backend.speak(&request).await {
                Ok(()) => return Ok(()),
                Err(e) if caps.can_render_to_file && self.player.is_some() => {
                    warn!(
                        backend = %self.name,
                        error = %e,
                        "direct speech failed, rendering instead"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.render_and_play(text, voice.as_ref()).await
    }

    async fn render_and_play(
        &self,
        text: &str,
        voice: Option<&VoiceChoice>,
    ) -> Result<(), PluginError> {
        let player = self.player.as_ref().ok_or_else(|| {
            PluginError::ConfigurationMissing(format!(
                "'{}' needs an audio player to be heard",
                self.name
            ))
        })?;
        let prepared = normalize_for_speech(text, self.numerals.as_ref());
        let file = tempfile::Builder::new()
            .prefix("skald-tts-")
            .suffix(".wav")
            .tempfile()?;
        let request = SpeechRequest {
            text: &prepared,
            voice,
        };
        self.backend.render_to_file(&request, file.path()).await?;
        debug!(
            backend = %self.name,
            player = %player.name(),
            path = %file.path().display(),
            "playing rendered speech"
        );
        player.play_file(file.path()).await
    }
}
