//! Spotify Web API payloads used by the skill.

use serde::{Deserialize, Serialize};

/// Spoken when a track carries no artist.
pub const UNKNOWN_ARTIST: &str = "Неизвестный исполнитель";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// A track object as returned by search and the player endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// `spotify:track:...`
    pub uri: String,
    #[serde(default)]
    pub artists: Vec<Artist>,
}

impl Track {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            uri: uri.into(),
            artists: Vec::new(),
        }
    }

    pub fn with_artist(mut self, name: impl Into<String>) -> Self {
        self.artists.push(Artist { name: name.into() });
        self
    }

    /// First credited artist, or [`UNKNOWN_ARTIST`].
    pub fn artist(&self) -> &str {
        self.artists
            .first()
            .map(|a| a.name.as_str())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_ARTIST)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// `GET /me/player` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub is_playing: bool,
    /// Null for ads, podcasts in some markets, and idle players.
    #[serde(default)]
    pub item: Option<Track>,
    #[serde(default)]
    pub device: Option<Device>,
}

impl PlaybackState {
    /// The playing track, if something is actually playing.
    pub fn now_playing(&self) -> Option<&Track> {
        self.item.as_ref().filter(|_| self.is_playing)
    }
}

/// What a play/pause toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackToggle {
    Paused,
    Resumed,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub tracks: Page<Track>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}
