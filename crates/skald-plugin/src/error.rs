//! Plugin error types.
//!
//! Defines [`PluginError`], the unified error type for manifest loading,
//! command registration, dispatch, TTS backends and authenticated adapters.

use thiserror::Error;

/// Errors produced by plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Required credentials or URLs are absent from the plugin options.
    ///
    /// Recoverable: the plugin stays loaded but its handlers fast-fail.
    #[error("not configured: {0}")]
    ConfigurationMissing(String),

    /// A network adapter call failed or returned a non-success status.
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// Token exchange or refresh failed; authenticated calls are refused.
    #[error("token invalid: {0}")]
    TokenInvalid(String),

    /// No registered command matches the utterance.
    #[error("no command matches '{0}'")]
    NoMatch(String),

    /// Two command registrations claim the same alias.
    #[error("alias '{alias}' is claimed by both '{existing}' and '{incoming}'")]
    RegistrationConflict {
        /// The normalized alias.
        alias: String,
        /// `plugin/command` that held the alias first.
        existing: String,
        /// `plugin/command` that tried to claim it.
        incoming: String,
    },

    /// The manifest is malformed. Fatal to that plugin only.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A TTS backend is missing, misdeclared, or cannot synthesize.
    #[error("invalid backend: {0}")]
    InvalidBackend(String),

    /// Plugin execution failed at runtime.
    #[error("plugin execution failed: {0}")]
    ExecutionFailed(String),

    /// Requested capability is not implemented by this plugin or backend.
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// I/O error during plugin operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PluginError {
    /// Stable, machine-friendly name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::AdapterUnavailable(_) => "adapter_unavailable",
            Self::TokenInvalid(_) => "token_invalid",
            Self::NoMatch(_) => "no_match",
            Self::RegistrationConflict { .. } => "registration_conflict",
            Self::InvalidManifest(_) => "invalid_manifest",
            Self::InvalidBackend(_) => "invalid_backend",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::NotImplemented(_) => "not_implemented",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether this error prevents the plugin from being registered at all.
    ///
    /// Everything else leaves the plugin loaded (possibly inert).
    pub fn is_fatal_for_plugin(&self) -> bool {
        matches!(self, Self::InvalidManifest(_) | Self::InvalidBackend(_))
    }
}
