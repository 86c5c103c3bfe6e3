//! Local text-to-speech engines for skald.
//!
//! | Backend | Engine | Capabilities |
//! |---------|--------|--------------|
//! | `espeak` | `espeak-ng` (or `espeak`) | speak directly, render WAV |
//! | `piper` | `piper` with an `.onnx` voice model | render WAV only |
//!
//! Render-only output is played through [`CommandPlayer`], which picks the
//! first of `aplay`, `paplay`, `ffplay` found on `PATH` unless the `player`
//! option names another binary.
//!
//! Engine options (on the `tts` skill): `rate` in words per minute,
//! `volume` (espeak amplitude, 0-200), `model_path` for piper, plus the
//! voice preferences read by the registry (`prefer_language`,
//! `prefer_gender`, `default_voice_index`, `voice_by_call_name`).

pub mod espeak;
pub mod piper;
pub mod player;
pub mod plugin;
mod process;

pub use espeak::{EspeakBackend, parse_voice_list};
pub use piper::PiperBackend;
pub use player::CommandPlayer;
pub use plugin::{PLUGIN_ID, TtsPlugin};
