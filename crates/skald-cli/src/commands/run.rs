//! `skald run` -- read utterances from stdin and dispatch them.
//!
//! Each non-empty line is one recognized utterance. A leading assistant
//! name ("ирина, включи свет") is stripped and passed on as the addressed
//! name, which lets TTS pick a per-name voice.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use skald_plugin::{PluginError, SpeechSink};

use crate::speech::{ChannelSink, spawn_speaker};

use super::Context;

/// Spoken when no command matches.
pub const NOT_UNDERSTOOD: &str = "Не поняла";

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let (sink, rx) = ChannelSink::new();
    let host = ctx.load_host(sink.clone()).await;
    let backend = ctx.activate_backend(&host).await;
    let speaker = spawn_speaker(rx, backend);

    info!(commands = host.router().len(), "listening on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let (addressed, utterance) = strip_assistant_name(&line, &ctx.config.assistant_names);
        if utterance.is_empty() {
            continue;
        }
        sink.set_addressed(addressed);
        match host.dispatch(utterance, addressed).await {
            Ok(outcome) => debug!(plugin = %outcome.plugin, command = %outcome.command, "handled"),
            Err(PluginError::NoMatch(_)) => sink.emit_speech(NOT_UNDERSTOOD),
            // Already logged and spoken by the host and the handler.
            Err(_) => {}
        }
    }

    // Closing every sender lets the speaker drain and stop.
    drop(host);
    drop(sink);
    speaker.await?;
    Ok(())
}

/// Split a leading call name off `line`.
///
/// Returns `(addressed_name, rest)`; the name is empty when the line does
/// not start with one of `names`.
pub fn strip_assistant_name<'a>(line: &'a str, names: &[String]) -> (&'a str, &'a str) {
    let line = line.trim();
    let (first, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let word = first.trim_end_matches([',', '.', '!', '?', ':']);
    let is_name = names
        .iter()
        .any(|name| name.trim().to_lowercase() == word.to_lowercase());
    if is_name {
        (word, rest.trim_start_matches([',', ' ']).trim())
    } else {
        ("", line)
    }
}
