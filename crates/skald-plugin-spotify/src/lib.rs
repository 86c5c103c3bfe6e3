//! Spotify skill for skald.
//!
//! Playback control over the Spotify Web API. Access tokens come from an
//! OAuth2 authorization-code grant: run `skald spotify-auth-url`, approve
//! access, and put the returned `code` into the skill's `auth_code` option.
//! Tokens are then cached on disk and refreshed on demand, so the code is
//! only exchanged once.

pub mod client;
pub mod plugin;
pub mod types;

pub use client::{API_BASE, MusicAdapter, SpotifyClient};
pub use plugin::{PLUGIN_ID, SCOPES, SpotifyPlugin, oauth_config};
pub use types::{PlaybackState, PlaybackToggle, Track, UNKNOWN_ARTIST};
