//! `espeak-ng` backend: speaks directly and renders WAV files.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use skald_plugin::{
    BackendCapabilities, EffectiveOptions, PluginError, SpeechRequest, TtsBackend,
    VoiceDescriptor,
};

use crate::process::{find_binary, run};

pub const BACKEND_NAME: &str = "espeak";

/// espeak-ng's own default speed, words per minute.
pub const DEFAULT_RATE: i64 = 175;
const RATE_RANGE: (i64, i64) = (80, 450);

pub const DEFAULT_VOLUME: i64 = 100;
const AMPLITUDE_RANGE: (i64, i64) = (0, 200);

pub struct EspeakBackend {
    binary: Option<PathBuf>,
    rate: i64,
    amplitude: i64,
}

impl EspeakBackend {
    /// Locate `espeak-ng` (or legacy `espeak`) on `PATH`.
    pub fn detect(options: &EffectiveOptions) -> Self {
        Self::with_binary(find_binary(&["espeak-ng", "espeak"]), options)
    }

    pub fn with_binary(binary: Option<PathBuf>, options: &EffectiveOptions) -> Self {
        Self {
            binary,
            rate: options
                .i64("rate")
                .unwrap_or(DEFAULT_RATE)
                .clamp(RATE_RANGE.0, RATE_RANGE.1),
            amplitude: options
                .i64("volume")
                .unwrap_or(DEFAULT_VOLUME)
                .clamp(AMPLITUDE_RANGE.0, AMPLITUDE_RANGE.1),
        }
    }

    pub fn binary(&self) -> Option<&Path> {
        self.binary.as_deref()
    }

    fn require_binary(&self) -> Result<&Path, PluginError> {
        self.binary
            .as_deref()
            .ok_or_else(|| PluginError::InvalidBackend("espeak-ng not found on PATH".into()))
    }

    fn args(&self, request: &SpeechRequest<'_>, wav: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(voice) = request.voice {
            args.push("-v".into());
            args.push(voice.id.clone().into());
        }
        args.push("-s".into());
        args.push(self.rate.to_string().into());
        args.push("-a".into());
        args.push(self.amplitude.to_string().into());
        if let Some(wav) = wav {
            args.push("-w".into());
            args.push(wav.as_os_str().to_owned());
        }
        // Text after `--` so a leading dash is never read as a flag.
        args.push("--".into());
        args.push(request.text.into());
        args
    }
}

#[async_trait]
impl TtsBackend for EspeakBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::SPEAK_AND_RENDER
    }

    async fn init(&self) -> Result<(), PluginError> {
        let binary = self.require_binary()?;
        run(binary, &["--version".into()], None).await?;
        Ok(())
    }

    async fn voices(&self) -> Result<Vec<VoiceDescriptor>, PluginError> {
        let output = run(self.require_binary()?, &["--voices".into()], None).await?;
        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        debug!(count = voices.len(), "espeak voices");
        Ok(voices)
    }

    async fn speak(&self, request: &SpeechRequest<'_>) -> Result<(), PluginError> {
        run(self.require_binary()?, &self.args(request, None), None).await?;
        Ok(())
    }

    async fn render_to_file(
        &self,
        request: &SpeechRequest<'_>,
        path: &Path,
    ) -> Result<(), PluginError> {
        run(self.require_binary()?, &self.args(request, Some(path)), None).await?;
        Ok(())
    }
}

/// Parse `espeak-ng --voices`.
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  ru              --/M      Russian            zle/ru
///  2  en-gb           --/M      English_(Great_Britain) gmw/en  (en 2)
/// ```
///
/// The language code doubles as the voice id (`espeak-ng -v ru`).
pub fn parse_voice_list(output: &str) -> Vec<VoiceDescriptor> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [priority, language, age_gender, name, ..] = fields.as_slice() else {
                return None;
            };
            priority.parse::<u32>().ok()?;
            let mut voice =
                VoiceDescriptor::new(*language, name.replace('_', " ")).with_language(*language);
            if let Some(gender) = parse_gender(age_gender) {
                voice = voice.with_gender(gender);
            }
            Some(voice)
        })
        .collect()
}

fn parse_gender(age_gender: &str) -> Option<&'static str> {
    match age_gender.rsplit('/').next()? {
        "M" => Some("male"),
        "F" => Some("female"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skald_plugin::{VoiceChoice, merge};
    use skald_plugin::voice::SelectionSource;

    const VOICES: &str = "\
Pty Language       Age/Gender VoiceName          File                 Other Languages
 5  af              --/M      Afrikaans          gmw/af
 2  en-gb           --/M      English_(Great_Britain) gmw/en               (en 2)
 5  ru              --/F      Russian            zle/ru
 5  uk              --/-      Ukrainian          zle/uk
";

    fn options(value: serde_json::Value) -> EffectiveOptions {
        let defaults = json!({"rate": DEFAULT_RATE, "volume": DEFAULT_VOLUME});
        merge(defaults.as_object().unwrap(), value.as_object().unwrap())
    }

    #[test]
    fn parses_voice_table() {
        let voices = parse_voice_list(VOICES);
        assert_eq!(voices.len(), 4);
        assert_eq!(voices[1].id, "en-gb");
        assert_eq!(voices[1].display_name, "English (Great Britain)");
        assert!(voices[1].matches_language("en"));
        assert_eq!(voices[2].gender.as_deref(), Some("female"));
        assert_eq!(voices[3].gender, None);
    }

    #[test]
    fn skips_header_and_garbage() {
        assert!(parse_voice_list("Pty Language\n\nnot a voice line\n").is_empty());
    }

    #[test]
    fn args_carry_voice_rate_and_amplitude() {
        let backend =
            EspeakBackend::with_binary(None, &options(json!({"rate": 1000, "volume": 50})));
        let voice = VoiceChoice {
            id: "ru".into(),
            index: Some(2),
            source: SelectionSource::Language,
        };
        let request = SpeechRequest {
            text: "-5 градусов",
            voice: Some(&voice),
        };
        let args: Vec<String> = backend
            .args(&request, Some(Path::new("/tmp/out.wav")))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-v", "ru", "-s", "450", "-a", "50", "-w", "/tmp/out.wav", "--", "-5 градусов"]
        );
    }

    #[tokio::test]
    async fn missing_binary_fails_init() {
        let backend = EspeakBackend::with_binary(None, &options(json!({})));
        assert!(matches!(backend.init().await, Err(PluginError::InvalidBackend(_))));
    }
}
