//! Plugin manifest types.
//!
//! Defines [`Manifest`], [`CommandSpec`] and [`BackendCapabilities`] -- the
//! static declaration a skill plugin hands to the host once per process.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PluginError;
use crate::options::{EffectiveOptions, OptionMap};
use crate::router::split_pattern;

/// A plugin's declaration of identity, defaults, commands and TTS backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Human-readable plugin name.
    pub name: String,

    /// Version string. `"1.0"` style short versions are accepted.
    pub version: String,

    /// Whether the plugin needs network access to be useful.
    #[serde(default)]
    pub requires_online: bool,

    #[serde(default)]
    pub description: String,

    /// Declared default options; persisted values overlay these.
    #[serde(default)]
    pub default_options: OptionMap,

    /// Alias pattern (`"включи свет|включи освещение"`) to command record.
    #[serde(default)]
    pub commands: BTreeMap<String, CommandSpec>,

    /// TTS backends this plugin provides, by backend name.
    #[serde(default)]
    pub tts_backends: BTreeMap<String, BackendCapabilities>,
}

/// Tagged handler record: the host invokes `id` on the owning plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Command identifier passed back to [`crate::SkillPlugin::invoke`].
    pub id: String,

    #[serde(default)]
    pub description: String,
}

/// What a TTS backend can do on its own.
///
/// At least one flag must be set; a render-only backend is played through
/// the host's audio player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapabilities {
    pub can_speak_directly: bool,
    pub can_render_to_file: bool,
}

impl BackendCapabilities {
    pub const SPEAK_AND_RENDER: Self = Self {
        can_speak_directly: true,
        can_render_to_file: true,
    };
    pub const RENDER_ONLY: Self = Self {
        can_speak_directly: false,
        can_render_to_file: true,
    };
    pub const SPEAK_ONLY: Self = Self {
        can_speak_directly: true,
        can_render_to_file: false,
    };

    /// Whether the backend can produce speech at all.
    pub fn is_usable(&self) -> bool {
        self.can_speak_directly || self.can_render_to_file
    }
}

impl Manifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            requires_online: false,
            description: String::new(),
            default_options: OptionMap::new(),
            commands: BTreeMap::new(),
            tts_backends: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires_online(mut self, online: bool) -> Self {
        self.requires_online = online;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.default_options.insert(key.into(), default.into());
        self
    }

    pub fn with_command(
        mut self,
        pattern: impl Into<String>,
        id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.commands.insert(
            pattern.into(),
            CommandSpec {
                id: id.into(),
                description: description.into(),
            },
        );
        self
    }

    pub fn with_backend(mut self, name: impl Into<String>, caps: BackendCapabilities) -> Self {
        self.tts_backends.insert(name.into(), caps);
        self
    }

    /// Validate the manifest. Returns an error describing the first
    /// validation failure, or `Ok(())` if the manifest is valid.
    pub fn validate(&self) -> Result<(), PluginError> {
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidManifest("name is required".into()));
        }
        if parse_version(&self.version).is_err() {
            return Err(PluginError::InvalidManifest(format!(
                "invalid version '{}'",
                self.version
            )));
        }
        for (pattern, spec) in &self.commands {
            if split_pattern(pattern).is_empty() {
                return Err(PluginError::InvalidManifest(format!(
                    "command pattern '{pattern}' has no aliases"
                )));
            }
            if spec.id.trim().is_empty() {
                return Err(PluginError::InvalidManifest(format!(
                    "command pattern '{pattern}' has an empty id"
                )));
            }
        }
        for (name, caps) in &self.tts_backends {
            if name.trim().is_empty() {
                return Err(PluginError::InvalidManifest(
                    "tts backend name is required".into(),
                ));
            }
            if !caps.is_usable() {
                return Err(PluginError::InvalidManifest(format!(
                    "tts backend '{name}' declares neither speak nor render"
                )));
            }
        }
        Ok(())
    }

    /// Replace the command set with the empty mapping.
    pub fn suppress_commands(mut self) -> Self {
        self.commands.clear();
        self
    }

    /// Apply the activation gate: commands survive only when `is_active`.
    pub fn gated(self, options: &EffectiveOptions) -> Self {
        if options.is_active() {
            self
        } else {
            self.suppress_commands()
        }
    }

    /// Parse a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PluginError> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }
}

/// Parse a plugin version, padding `"2"` / `"2.1"` to full semver.
pub fn parse_version(version: &str) -> Result<semver::Version, semver::Error> {
    let version = version.trim();
    let padded = match version.split('.').count() {
        1 => format!("{version}.0.0"),
        2 => format!("{version}.0"),
        _ => version.to_string(),
    };
    semver::Version::parse(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::merge;
    use serde_json::json;

    fn lights_manifest() -> Manifest {
        Manifest::new("Home Assistant", "1.0")
            .requires_online(true)
            .with_option("is_active", false)
            .with_option("base_url", "http://localhost:8123")
            .with_command("включи свет|включи освещение", "lights_on", "Turn on main lights")
            .with_command("выключи свет|выключи освещение", "lights_off", "Turn off all lights")
    }

    #[test]
    fn builder_collects_fields() {
        let manifest = lights_manifest();
        assert_eq!(manifest.name, "Home Assistant");
        assert!(manifest.requires_online);
        assert_eq!(manifest.commands.len(), 2);
        assert_eq!(manifest.default_options["base_url"], "http://localhost:8123");
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn short_versions_are_accepted() {
        assert_eq!(parse_version("1.0").unwrap(), semver::Version::new(1, 0, 0));
        assert_eq!(parse_version("2").unwrap(), semver::Version::new(2, 0, 0));
        assert_eq!(parse_version("2.1.3").unwrap(), semver::Version::new(2, 1, 3));
        assert!(parse_version("v-two").is_err());
    }

    #[test]
    fn invalid_version_fails() {
        let err = Manifest::new("x", "not-a-version").validate().unwrap_err();
        assert!(err.to_string().contains("invalid version"), "got: {err}");
    }

    #[test]
    fn missing_name_fails() {
        let err = Manifest::new(" ", "1.0").validate().unwrap_err();
        assert!(err.to_string().contains("name is required"), "got: {err}");
    }

    #[test]
    fn blank_pattern_fails() {
        let err = Manifest::new("x", "1.0")
            .with_command(" | ", "noop", "")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("has no aliases"), "got: {err}");
    }

    #[test]
    fn empty_command_id_fails() {
        let err = Manifest::new("x", "1.0")
            .with_command("тест", "", "")
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("empty id"), "got: {err}");
    }

    #[test]
    fn backend_with_no_capability_fails() {
        let caps = BackendCapabilities {
            can_speak_directly: false,
            can_render_to_file: false,
        };
        let err = Manifest::new("tts", "1.0")
            .with_backend("mute", caps)
            .validate()
            .unwrap_err();
        assert!(matches!(err, PluginError::InvalidManifest(_)));
        assert!(err.to_string().contains("neither speak nor render"));
    }

    #[test]
    fn render_only_backend_is_valid() {
        let manifest =
            Manifest::new("tts", "1.0").with_backend("piper", BackendCapabilities::RENDER_ONLY);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn inactive_options_suppress_commands() {
        let manifest = lights_manifest();
        let options = merge(&manifest.default_options, &OptionMap::new());
        let gated = manifest.clone().gated(&options);
        assert!(gated.commands.is_empty());
        assert_eq!(gated.name, manifest.name);
    }

    #[test]
    fn inactive_suppresses_regardless_of_other_options() {
        let manifest = lights_manifest();
        let persisted = json!({"is_active": false, "base_url": "http://ha:8123"});
        let options = merge(&manifest.default_options, persisted.as_object().unwrap());
        assert!(manifest.gated(&options).commands.is_empty());
    }

    #[test]
    fn active_options_keep_commands() {
        let manifest = lights_manifest();
        let persisted = json!({"is_active": true});
        let options = merge(&manifest.default_options, persisted.as_object().unwrap());
        let gated = manifest.clone().gated(&options);
        assert_eq!(gated.commands, manifest.commands);
    }

    #[test]
    fn manifest_parse_json() {
        let json = json!({
            "name": "Test",
            "version": "1.0",
            "default_options": {"is_active": true, "test_message": "ok"},
            "commands": {
                "тест|привет": {"id": "greet", "description": "Greeting"}
            },
            "tts_backends": {
                "piper": {"can_speak_directly": false, "can_render_to_file": true}
            }
        })
        .to_string();
        let manifest = Manifest::from_json(&json).unwrap();
        assert!(!manifest.requires_online);
        assert_eq!(manifest.commands["тест|привет"].id, "greet");
        assert_eq!(manifest.tts_backends["piper"], BackendCapabilities::RENDER_ONLY);
    }

    #[test]
    fn manifest_json_with_non_string_command_fails() {
        let json = json!({
            "name": "Test",
            "version": "1.0",
            "commands": {"тест": 42}
        })
        .to_string();
        assert!(matches!(
            Manifest::from_json(&json),
            Err(PluginError::Serialization(_))
        ));
    }
}
