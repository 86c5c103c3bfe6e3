//! Plugin trait definitions.
//!
//! - [`SkillPlugin`] -- the two-phase declare/activate contract plus the
//!   single `invoke` capability the router dispatches through
//! - [`SpeechSink`] -- fire-and-forget speech output provided by the host
//! - [`NumeralNormalizer`] -- host-provided numeral expansion for TTS text
//! - [`CommandContext`] / [`Invocation`] -- what a handler receives
//!
//! All traits are `Send + Sync`. Async methods use `#[async_trait]`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PluginError;
use crate::manifest::Manifest;
use crate::options::EffectiveOptions;
use crate::voice::TtsBackend;

// ---------------------------------------------------------------------------
// Host collaborators
// ---------------------------------------------------------------------------

/// User-facing speech output.
///
/// Fire-and-forget: implementations queue or print the text and return
/// immediately; the result never affects the caller.
pub trait SpeechSink: Send + Sync {
    fn emit_speech(&self, text: &str);
}

/// Expands numerals into words before synthesis.
pub trait NumeralNormalizer: Send + Sync {
    fn normalize_numerals(&self, text: &str) -> String;
}

/// Leaves text untouched. Used when the host has no numeral expander.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughNumerals;

impl NumeralNormalizer for PassthroughNumerals {
    fn normalize_numerals(&self, text: &str) -> String {
        text.to_string()
    }
}

// ---------------------------------------------------------------------------
// Dispatch inputs
// ---------------------------------------------------------------------------

/// A matched utterance as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Full utterance, trimmed.
    pub utterance: String,
    /// The normalized alias that matched.
    pub alias: String,
    /// Utterance minus the matched alias, trimmed. Empty on exact matches.
    pub residual: String,
}

impl Invocation {
    /// The residual, or `None` when the utterance was just the alias.
    pub fn argument(&self) -> Option<&str> {
        let residual = self.residual.trim();
        (!residual.is_empty()).then_some(residual)
    }
}

/// Per-dispatch context handed to [`SkillPlugin::invoke`].
pub struct CommandContext<'a> {
    /// Speech output for user-facing responses.
    pub speech: &'a dyn SpeechSink,
    /// The owning plugin's effective options.
    pub options: &'a EffectiveOptions,
    /// Name the user addressed the assistant with (may be empty).
    pub addressed_name: &'a str,
}

impl CommandContext<'_> {
    /// Speak a response.
    pub fn say(&self, text: impl AsRef<str>) {
        self.speech.emit_speech(text.as_ref());
    }
}

// ---------------------------------------------------------------------------
// SkillPlugin
// ---------------------------------------------------------------------------

/// A skill plugin.
///
/// Lifecycle (mandatory order):
/// 1. [`declare`](Self::declare) -- pure, repeatable, no I/O.
/// 2. [`activate`](Self::activate) -- once, with merged options. May build
///    API clients, acquire tokens, or speak a status line.
/// 3. [`invoke`](Self::invoke) -- once per matched utterance.
///
/// There is no way back to the declared state; re-activation needs a fresh
/// instance.
#[async_trait]
pub trait SkillPlugin: Send + Sync {
    /// Stable plugin identifier; keys persisted options and command owners.
    fn id(&self) -> &str;

    /// Return the static manifest.
    fn declare(&self) -> Manifest;

    /// Activate with merged options and return the manifest to register.
    ///
    /// The default only applies the `is_active` gate.
    async fn activate(
        &self,
        speech: &dyn SpeechSink,
        options: &EffectiveOptions,
        manifest: Manifest,
    ) -> Result<Manifest, PluginError> {
        let _ = speech;
        Ok(manifest.gated(options))
    }

    /// Whether activation left the plugin with a working backend.
    ///
    /// `false` means commands stay registered but handlers fast-fail.
    fn is_ready(&self) -> bool {
        true
    }

    /// Run the command `command` declared in the manifest.
    async fn invoke(
        &self,
        command: &str,
        ctx: &CommandContext<'_>,
        invocation: &Invocation,
    ) -> Result<(), PluginError> {
        let _ = (ctx, invocation);
        Err(PluginError::NotImplemented(format!(
            "plugin '{}' has no command '{command}'",
            self.id()
        )))
    }

    /// Implementation of a TTS backend declared in the manifest.
    fn tts_backend(&self, name: &str) -> Option<Arc<dyn TtsBackend>> {
        let _ = name;
        None
    }
}
