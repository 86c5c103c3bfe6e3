//! Speech output for the host.
//!
//! Handlers call [`SpeechSink::emit_speech`] synchronously; [`ChannelSink`]
//! queues the text on an unbounded channel and a single speaker task says
//! it, in order, through the active TTS backend.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use skald_plugin::{ActiveBackend, SpeechSink};

/// One queued line plus the name the user addressed when it was said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    pub addressed_name: String,
}

/// Fire-and-forget sink feeding the speaker task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Utterance>,
    addressed: Mutex<String>,
}

impl ChannelSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Utterance>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            tx,
            addressed: Mutex::new(String::new()),
        });
        (sink, rx)
    }

    /// Call name attached to speech emitted from now on.
    pub fn set_addressed(&self, name: &str) {
        *self.addressed.lock().unwrap_or_else(|e| e.into_inner()) = name.to_string();
    }
}

impl SpeechSink for ChannelSink {
    fn emit_speech(&self, text: &str) {
        let addressed_name = self
            .addressed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if self
            .tx
            .send(Utterance {
                text: text.to_string(),
                addressed_name,
            })
            .is_err()
        {
            warn!(text, "speaker stopped, dropping speech");
        }
    }
}

/// Sink for one-shot commands: speech is only logged.
pub struct LogSink;

impl SpeechSink for LogSink {
    fn emit_speech(&self, text: &str) {
        info!(text, "speech");
    }
}

/// Drain `rx`, printing each line and speaking it when a backend is active.
///
/// Finishes once every sender is dropped and the queue is empty.
pub fn spawn_speaker(
    mut rx: mpsc::UnboundedReceiver<Utterance>,
    backend: Option<Arc<ActiveBackend>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(utterance) = rx.recv().await {
            println!("> {}", utterance.text);
            let Some(backend) = &backend else {
                continue;
            };
            if let Err(e) = backend
                .speak_text(&utterance.text, &utterance.addressed_name)
                .await
            {
                warn!(backend = %backend.name(), kind = e.kind(), error = %e, "speech failed");
            }
        }
        debug!("speaker finished");
    })
}
