//! Text-to-speech backends and voice selection.

pub mod backend;
pub mod normalize;
pub mod selection;

pub use backend::{ActiveBackend, AudioPlayer, BackendRegistry, SpeechRequest, TtsBackend};
pub use normalize::normalize_for_speech;
pub use selection::{
    SelectionSource, VoiceChoice, VoiceDescriptor, VoicePreferences, select_voice,
};
