//! Host configuration and persisted plugin options.
//!
//! Layout of the config directory:
//!
//! ```text
//! <config_dir>/
//!   config.json            host settings (HostConfig)
//!   options/<plugin>.json  persisted options, one object per plugin
//!   tokens/<provider>.json OAuth tokens (0600)
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use skald_plugin::OptionMap;

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "SKALD_CONFIG_DIR";

/// Host settings read from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Backend activated at startup.
    pub tts_backend: String,

    /// Call names stripped from the start of an utterance.
    pub assistant_names: Vec<String>,

    /// Write merged defaults for plugins that have no options file yet.
    pub seed_options: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tts_backend: "espeak".into(),
            assistant_names: vec!["ирина".into(), "ирины".into(), "ирину".into()],
            seed_options: true,
        }
    }
}

impl HostConfig {
    /// Load `<dir>/config.json`; a missing file yields the defaults.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let path = dir.join("config.json");
        if !path.exists() {
            debug!(path = %path.display(), "no host config, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

/// Resolve the config directory: flag, then `SKALD_CONFIG_DIR`, then `~/.skald`.
pub fn resolve_config_dir(flag: Option<&Path>) -> PathBuf {
    if let Some(dir) = flag {
        return dir.to_path_buf();
    }
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skald")
}

/// Per-plugin option files under `<config_dir>/options`.
#[derive(Debug, Clone)]
pub struct OptionsStore {
    dir: PathBuf,
}

impl OptionsStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            dir: config_dir.join("options"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, plugin_id: &str) -> PathBuf {
        self.dir.join(format!("{plugin_id}.json"))
    }

    pub fn exists(&self, plugin_id: &str) -> bool {
        self.path(plugin_id).exists()
    }

    /// Persisted options; missing or malformed files read as empty.
    pub fn load(&self, plugin_id: &str) -> OptionMap {
        let path = self.path(plugin_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return OptionMap::new(),
            Err(e) => {
                warn!(
                    plugin = %plugin_id,
                    path = %path.display(),
                    error = %e,
                    "cannot read options"
                );
                return OptionMap::new();
            }
        };
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => {
                warn!(
                    plugin = %plugin_id,
                    path = %path.display(),
                    "options file is not an object, ignoring"
                );
                OptionMap::new()
            }
            Err(e) => {
                warn!(
                    plugin = %plugin_id,
                    path = %path.display(),
                    error = %e,
                    "malformed options, ignoring"
                );
                OptionMap::new()
            }
        }
    }

    pub fn save(&self, plugin_id: &str, options: &OptionMap) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.path(plugin_id);
        let json = serde_json::to_string_pretty(options)?;
        std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
        debug!(plugin = %plugin_id, path = %path.display(), "seeded options");
        Ok(())
    }
}
