//! Spotify skill driven through `PluginHost` with a fake music adapter.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use skald_plugin::{PluginError, PluginHost, PluginState, SpeechSink};
use skald_plugin_oauth2::TokenStore;
use skald_plugin_spotify::{
    MusicAdapter, PlaybackState, PlaybackToggle, SpotifyPlugin, Track,
};

#[derive(Default)]
struct Transcript(Mutex<Vec<String>>);

impl SpeechSink for Transcript {
    fn emit_speech(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

impl Transcript {
    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn last(&self) -> String {
        self.lines().last().cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct FakePlayer {
    playing: Mutex<bool>,
    library: Vec<Track>,
    token_revoked: bool,
    calls: Mutex<Vec<String>>,
}

impl FakePlayer {
    fn log(&self, call: impl Into<String>) -> Result<(), PluginError> {
        self.calls.lock().unwrap().push(call.into());
        if self.token_revoked {
            return Err(PluginError::TokenInvalid("spotify: no valid access token".into()));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MusicAdapter for FakePlayer {
    async fn playback_state(&self) -> Result<Option<PlaybackState>, PluginError> {
        self.log("state")?;
        let is_playing = *self.playing.lock().unwrap();
        Ok(Some(PlaybackState {
            is_playing,
            item: self.library.first().cloned(),
            device: None,
        }))
    }

    async fn play_pause(&self) -> Result<PlaybackToggle, PluginError> {
        self.log("toggle")?;
        let mut playing = self.playing.lock().unwrap();
        *playing = !*playing;
        Ok(if *playing {
            PlaybackToggle::Resumed
        } else {
            PlaybackToggle::Paused
        })
    }

    async fn skip_next(&self) -> Result<(), PluginError> {
        self.log("next")
    }

    async fn skip_previous(&self) -> Result<(), PluginError> {
        self.log("previous")
    }

    async fn search_track(&self, query: &str) -> Result<Option<Track>, PluginError> {
        self.log(format!("search {query}"))?;
        Ok(self
            .library
            .iter()
            .find(|t| t.name.to_lowercase().contains(query))
            .cloned())
    }

    async fn play_track(&self, uri: &str) -> Result<(), PluginError> {
        self.log(format!("play {uri}"))
    }
}

fn library() -> Vec<Track> {
    vec![Track::new("Группа крови", "spotify:track:1").with_artist("Кино")]
}

async fn host_with(player: Arc<FakePlayer>) -> (PluginHost, Arc<Transcript>) {
    let transcript = Arc::new(Transcript::default());
    let mut host = PluginHost::new(transcript.clone());
    let report = host
        .load(
            Arc::new(SpotifyPlugin::with_adapter(player)),
            json!({"is_active": true}).as_object().unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(report.state, PluginState::Active);
    (host, transcript)
}

#[tokio::test]
async fn play_resumes_paused_music() {
    let player = Arc::new(FakePlayer::default());
    let (host, transcript) = host_with(player.clone()).await;

    host.dispatch("включи музыку", "").await.unwrap();

    assert_eq!(transcript.last(), "Музыка включена!");
    assert_eq!(player.calls(), vec!["state", "toggle"]);
}

#[tokio::test]
async fn play_while_playing_does_not_pause() {
    let player = Arc::new(FakePlayer {
        playing: Mutex::new(true),
        ..FakePlayer::default()
    });
    let (host, transcript) = host_with(player.clone()).await;

    host.dispatch("поставь музыку", "").await.unwrap();

    assert_eq!(transcript.last(), "Музыка включена!");
    assert_eq!(player.calls(), vec!["state"]);
    assert!(*player.playing.lock().unwrap());
}

#[tokio::test]
async fn pause_stops_playing_music() {
    let player = Arc::new(FakePlayer {
        playing: Mutex::new(true),
        ..FakePlayer::default()
    });
    let (host, transcript) = host_with(player.clone()).await;

    host.dispatch("пауза", "").await.unwrap();

    assert_eq!(transcript.last(), "Музыка поставлена на паузу");
    assert!(!*player.playing.lock().unwrap());
}

#[tokio::test]
async fn skip_commands() {
    let player = Arc::new(FakePlayer::default());
    let (host, transcript) = host_with(player.clone()).await;

    host.dispatch("следующий трек", "").await.unwrap();
    host.dispatch("предыдущий", "").await.unwrap();

    assert_eq!(transcript.lines(), vec!["Следующий трек", "Предыдущий трек"]);
    assert_eq!(player.calls(), vec!["next", "previous"]);
}

#[tokio::test]
async fn search_plays_first_match() {
    let player = Arc::new(FakePlayer {
        library: library(),
        ..FakePlayer::default()
    });
    let (host, transcript) = host_with(player.clone()).await;

    let outcome = host.dispatch("поставь трек группа крови", "").await.unwrap();
    assert_eq!(outcome.residual, "группа крови");

    assert_eq!(
        transcript.lines(),
        vec!["Ищу трек группа крови", "Воспроизвожу Группа крови от Кино"]
    );
    assert_eq!(
        player.calls(),
        vec!["search группа крови", "play spotify:track:1"]
    );
}

#[tokio::test]
async fn search_without_title_asks_for_one() {
    let player = Arc::new(FakePlayer::default());
    let (host, transcript) = host_with(player.clone()).await;

    host.dispatch("найди трек", "").await.unwrap();

    assert_eq!(transcript.lines(), vec!["Скажите название трека"]);
    assert!(player.calls().is_empty());
}

#[tokio::test]
async fn search_miss_is_reported() {
    let player = Arc::new(FakePlayer::default());
    let (host, transcript) = host_with(player).await;

    host.dispatch("найди трек кукушка", "").await.unwrap();
    assert_eq!(transcript.last(), "Трек кукушка не найден");
}

#[tokio::test]
async fn status_names_track_and_artist() {
    let player = Arc::new(FakePlayer {
        playing: Mutex::new(true),
        library: library(),
        ..FakePlayer::default()
    });
    let (host, transcript) = host_with(player).await;

    host.dispatch("что играет", "").await.unwrap();
    assert_eq!(transcript.last(), "Сейчас играет Группа крови от Кино");
}

#[tokio::test]
async fn status_when_idle() {
    let player = Arc::new(FakePlayer::default());
    let (host, transcript) = host_with(player).await;

    host.dispatch("статус музыки", "").await.unwrap();
    assert_eq!(transcript.last(), "Музыка не воспроизводится");
}

#[tokio::test]
async fn revoked_token_aborts_with_negative_answer() {
    let player = Arc::new(FakePlayer {
        token_revoked: true,
        ..FakePlayer::default()
    });
    let (host, transcript) = host_with(player).await;

    let err = host.dispatch("следующий", "").await.unwrap_err();
    assert!(matches!(err, PluginError::TokenInvalid(_)));
    assert_eq!(transcript.last(), "Не удалось переключить трек");
}

#[tokio::test]
async fn missing_credentials_fast_fail() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = Arc::new(Transcript::default());
    let mut host = PluginHost::new(transcript.clone());
    let store = TokenStore::with_dir(dir.path().to_path_buf());
    let plugin = SpotifyPlugin::new().with_token_store(store);
    let report = host
        .load(Arc::new(plugin), json!({"is_active": true}).as_object().unwrap())
        .await
        .unwrap();

    assert_eq!(report.state, PluginState::ActiveWithWarning);
    assert_eq!(
        transcript.lines(),
        vec!["Spotify не настроен. Проверьте настройки плагина."]
    );

    let err = host.dispatch("пауза", "").await.unwrap_err();
    assert!(matches!(err, PluginError::ConfigurationMissing(_)));
    assert_eq!(transcript.last(), "Spotify не настроен");

    host.dispatch("включи музыку", "").await.unwrap_err();
    assert_eq!(
        transcript.last(),
        "Spotify не настроен. Проверьте настройки плагина."
    );
}
