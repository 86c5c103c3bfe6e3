//! `piper` backend: neural voices rendered to WAV files.
//!
//! Piper cannot play audio itself, so it is declared render-only and the
//! registry pairs it with the host's audio player.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use skald_plugin::{
    BackendCapabilities, EffectiveOptions, PluginError, SpeechRequest, TtsBackend,
    VoiceDescriptor,
};

use crate::espeak::DEFAULT_RATE;
use crate::process::{find_binary, run};

pub const BACKEND_NAME: &str = "piper";

const LENGTH_SCALE_RANGE: (f64, f64) = (0.5, 2.0);

/// The parts of `<model>.onnx.json` used for voice enumeration.
#[derive(Debug, Default, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    language: Option<ModelLanguage>,
    #[serde(default)]
    speaker_id_map: std::collections::BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct ModelLanguage {
    code: String,
}

pub struct PiperBackend {
    binary: Option<PathBuf>,
    model: Option<PathBuf>,
    length_scale: f64,
}

impl PiperBackend {
    /// Locate `piper` on `PATH`; the model comes from `model_path`.
    pub fn detect(options: &EffectiveOptions) -> Self {
        Self::with_binary(find_binary(&["piper", "piper-tts"]), options)
    }

    pub fn with_binary(binary: Option<PathBuf>, options: &EffectiveOptions) -> Self {
        let rate = options.i64("rate").unwrap_or(DEFAULT_RATE).max(1) as f64;
        Self {
            binary,
            model: options.non_empty_str("model_path").map(PathBuf::from),
            // Piper stretches time; a faster rate is a shorter length.
            length_scale: (DEFAULT_RATE as f64 / rate)
                .clamp(LENGTH_SCALE_RANGE.0, LENGTH_SCALE_RANGE.1),
        }
    }

    pub fn model(&self) -> Option<&Path> {
        self.model.as_deref()
    }

    fn require_binary(&self) -> Result<&Path, PluginError> {
        self.binary
            .as_deref()
            .ok_or_else(|| PluginError::InvalidBackend("piper not found on PATH".into()))
    }

    fn require_model(&self) -> Result<&Path, PluginError> {
        self.model
            .as_deref()
            .ok_or_else(|| PluginError::ConfigurationMissing("piper model_path".into()))
    }

    fn config_path(model: &Path) -> PathBuf {
        let mut name = model.as_os_str().to_owned();
        name.push(".json");
        PathBuf::from(name)
    }

    fn args(&self, model: &Path, request: &SpeechRequest<'_>, wav: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--model".into(),
            model.as_os_str().to_owned(),
            "--output_file".into(),
            wav.as_os_str().to_owned(),
            "--length_scale".into(),
            format!("{:.2}", self.length_scale).into(),
        ];
        // Only multi-speaker models have numeric voice ids.
        if let Some(speaker) = request.voice.filter(|v| v.id.parse::<u32>().is_ok()) {
            args.push("--speaker".into());
            args.push(speaker.id.clone().into());
        }
        args
    }
}

#[async_trait]
impl TtsBackend for PiperBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::RENDER_ONLY
    }

    async fn init(&self) -> Result<(), PluginError> {
        self.require_binary()?;
        let model = self.require_model()?;
        if !tokio::fs::try_exists(model).await? {
            return Err(PluginError::ConfigurationMissing(format!(
                "piper model {} does not exist",
                model.display()
            )));
        }
        Ok(())
    }

    async fn voices(&self) -> Result<Vec<VoiceDescriptor>, PluginError> {
        let model = self.require_model()?;
        let config = match tokio::fs::read_to_string(Self::config_path(model)).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ModelConfig::default(),
            Err(e) => return Err(e.into()),
        };
        let voices = model_voices(model, &config);
        debug!(model = %model.display(), count = voices.len(), "piper voices");
        Ok(voices)
    }

    async fn render_to_file(
        &self,
        request: &SpeechRequest<'_>,
        path: &Path,
    ) -> Result<(), PluginError> {
        let binary = self.require_binary()?;
        let model = self.require_model()?;
        run(binary, &self.args(model, request, path), Some(request.text)).await?;
        Ok(())
    }
}

/// One voice per speaker, ordered by speaker id; single-speaker models
/// yield one voice named after the model file.
fn model_voices(model: &Path, config: &ModelConfig) -> Vec<VoiceDescriptor> {
    let language = config.language.as_ref().map(|l| l.code.as_str());
    let with_language = |voice: VoiceDescriptor| match language {
        Some(code) => voice.with_language(code),
        None => voice,
    };

    if config.speaker_id_map.is_empty() {
        let stem = model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| BACKEND_NAME.to_string());
        return vec![with_language(VoiceDescriptor::new(stem.clone(), stem))];
    }

    let mut speakers: Vec<(&String, &i64)> = config.speaker_id_map.iter().collect();
    speakers.sort_by_key(|(_, id)| **id);
    speakers
        .into_iter()
        .map(|(name, id)| with_language(VoiceDescriptor::new(id.to_string(), name.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skald_plugin::voice::SelectionSource;
    use skald_plugin::{VoiceChoice, merge};

    fn options(value: serde_json::Value) -> EffectiveOptions {
        let defaults = json!({"rate": DEFAULT_RATE, "model_path": ""});
        merge(defaults.as_object().unwrap(), value.as_object().unwrap())
    }

    fn args_of(backend: &PiperBackend, voice: Option<&VoiceChoice>) -> Vec<String> {
        let request = SpeechRequest { text: "привет", voice };
        backend
            .args(Path::new("/m/ru.onnx"), &request, Path::new("/tmp/o.wav"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn speaker_flag_only_for_numeric_voice() {
        let backend = PiperBackend::with_binary(None, &options(json!({"rate": 350})));
        let numeric = VoiceChoice {
            id: "2".into(),
            index: Some(2),
            source: SelectionSource::DefaultIndex,
        };
        let named = VoiceChoice {
            id: "ru_RU-irina-medium".into(),
            index: Some(0),
            source: SelectionSource::Language,
        };
        assert_eq!(
            args_of(&backend, Some(&numeric)),
            vec![
                "--model", "/m/ru.onnx", "--output_file", "/tmp/o.wav", "--length_scale", "0.50",
                "--speaker", "2"
            ]
        );
        assert!(!args_of(&backend, Some(&named)).contains(&"--speaker".to_string()));
    }

    #[test]
    fn multi_speaker_model_lists_speakers_by_id() {
        let config: ModelConfig = serde_json::from_value(json!({
            "language": {"code": "ru_RU", "family": "ru"},
            "num_speakers": 3,
            "speaker_id_map": {"irina": 2, "denis": 0, "dmitri": 1}
        }))
        .unwrap();
        let voices = model_voices(Path::new("/m/ru_RU-multi.onnx"), &config);
        let names: Vec<&str> = voices.iter().map(|v| v.display_name.as_str()).collect();
        assert_eq!(names, vec!["denis", "dmitri", "irina"]);
        assert_eq!(voices[2].id, "2");
        assert!(voices[0].matches_language("ru"));
    }

    #[test]
    fn single_speaker_model_is_one_voice() {
        let voices = model_voices(Path::new("/m/ru_RU-irina-medium.onnx"), &ModelConfig::default());
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].id, "ru_RU-irina-medium");
    }

    #[tokio::test]
    async fn init_requires_existing_model() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.onnx");
        let backend = PiperBackend::with_binary(
            Some(PathBuf::from("/usr/bin/piper")),
            &options(json!({"model_path": missing.to_string_lossy()})),
        );
        assert!(matches!(backend.init().await, Err(PluginError::ConfigurationMissing(_))));

        let unset =
            PiperBackend::with_binary(Some(PathBuf::from("/usr/bin/piper")), &options(json!({})));
        assert!(matches!(unset.init().await, Err(PluginError::ConfigurationMissing(_))));
    }

    #[tokio::test]
    async fn voices_read_model_config() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("voice.onnx");
        std::fs::write(&model, b"").unwrap();
        std::fs::write(
            dir.path().join("voice.onnx.json"),
            json!({"language": {"code": "en_US"}, "speaker_id_map": {}}).to_string(),
        )
        .unwrap();
        let backend = PiperBackend::with_binary(
            None,
            &options(json!({"model_path": model.to_string_lossy()})),
        );
        let voices = backend.voices().await.unwrap();
        assert_eq!(voices.len(), 1);
        assert!(voices[0].matches_language("en"));
    }
}
