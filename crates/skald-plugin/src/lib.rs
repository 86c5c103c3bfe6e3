//! Skill plugin contract for skald.
//!
//! This crate defines how independently authored skills plug into the
//! voice assistant host: what a skill declares, how its options are
//! merged, how spoken phrases reach its handlers, how text-to-speech
//! backends are composed, and how OAuth-style tokens are kept valid.
//!
//! # Overview
//!
//! | Item | Purpose |
//! |------|---------|
//! | [`SkillPlugin`] | Two-phase declare/activate contract plus `invoke` |
//! | [`Manifest`] | Static declaration: defaults, commands, TTS backends |
//! | [`merge`] | Persisted options overlaid on declared defaults |
//! | [`CommandRouter`] | Alias index with conflict reporting |
//! | [`PluginHost`] | Lifecycle manager and single-utterance dispatcher |
//! | [`BackendRegistry`] | TTS backends, voice selection, speak/render composition |
//! | [`TokenManager`] | Access/refresh/expiry state machine |
//!
//! # Host collaborators
//!
//! The host supplies a [`SpeechSink`] for user-facing output, an
//! [`AudioPlayer`] for render-only backends and, optionally, a
//! [`NumeralNormalizer`].

pub mod error;
pub mod host;
pub mod manifest;
pub mod options;
pub mod router;
pub mod token;
pub mod traits;
pub mod voice;

// Re-export core types at crate root for convenience.
pub use error::PluginError;
pub use host::{DispatchOutcome, LoadReport, PluginHost, PluginState, PluginSummary};
pub use manifest::{BackendCapabilities, CommandSpec, Manifest};
pub use options::{EffectiveOptions, IS_ACTIVE, OptionMap, merge};
pub use router::{CommandRouter, CommandTarget, ConflictPolicy, Registration};
pub use token::{
    Clock, ManualClock, SystemClock, TokenCache, TokenEndpoint, TokenGrant, TokenManager,
    TokenPhase, TokenState,
};
pub use traits::{
    CommandContext, Invocation, NumeralNormalizer, PassthroughNumerals, SkillPlugin, SpeechSink,
};
pub use voice::{
    ActiveBackend, AudioPlayer, BackendRegistry, SpeechRequest, TtsBackend, VoiceChoice,
    VoiceDescriptor, VoicePreferences,
};
