//! Command-line audio player for rendered speech.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use skald_plugin::{AudioPlayer, PluginError};

use crate::process::{find_binary, run};

/// Players tried in order when none is configured.
pub const KNOWN_PLAYERS: [&str; 3] = ["aplay", "paplay", "ffplay"];

/// Plays WAV files with `aplay`, `paplay`, `ffplay` or a configured binary.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    name: String,
    binary: PathBuf,
}

impl CommandPlayer {
    pub fn new(binary: PathBuf) -> Self {
        let name = binary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, binary }
    }

    /// The preferred player if it is installed, else the first known one.
    pub fn detect(preferred: Option<&str>) -> Option<Self> {
        if let Some(name) = preferred.map(str::trim).filter(|n| !n.is_empty()) {
            match which::which(name) {
                Ok(binary) => return Some(Self::new(binary)),
                Err(e) => warn!(
                    player = %name,
                    error = %e,
                    "configured player not found, detecting"
                ),
            }
        }
        let player = find_binary(&KNOWN_PLAYERS).map(Self::new);
        match &player {
            Some(p) => info!(player = %p.name, "audio player detected"),
            None => warn!("no audio player found; render-only voices are unavailable"),
        }
        player
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn args(&self, file: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = match self.name.as_str() {
            "ffplay" => vec![
                "-autoexit".into(),
                "-nodisp".into(),
                "-loglevel".into(),
                "quiet".into(),
            ],
            "aplay" => vec!["-q".into()],
            _ => Vec::new(),
        };
        args.push(file.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn play_file(&self, path: &Path) -> Result<(), PluginError> {
        run(&self.binary, &self.args(path), None).await?;
        Ok(())
    }
}
