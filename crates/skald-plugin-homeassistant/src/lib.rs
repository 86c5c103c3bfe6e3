//! Home Assistant skill for skald.
//!
//! Voice commands for lights, per-room lighting, temperature and humidity
//! sensors, and two scenarios (bedtime, leaving home), backed by the Home
//! Assistant REST API and a long-lived access token.
//!
//! The skill ships inactive (`is_active = false`). When activated without
//! `base_url`/`access_token` it stays loaded and every handler answers
//! "Home Assistant не настроен".

pub mod client;
pub mod plugin;
pub mod types;

pub use client::{HomeAssistantClient, SmartHomeAdapter};
pub use plugin::{HomeAssistantPlugin, PLUGIN_ID};
pub use types::Entity;
