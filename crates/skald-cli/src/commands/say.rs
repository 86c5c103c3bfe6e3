//! `skald say` -- speak one line through the configured backend.

use std::sync::Arc;

use anyhow::Context as _;

use crate::speech::LogSink;

use super::Context;

pub async fn say(ctx: &Context, text: &str) -> anyhow::Result<()> {
    let text = text.trim();
    if text.is_empty() {
        anyhow::bail!("nothing to say");
    }

    let host = ctx.load_host(Arc::new(LogSink)).await;
    let backend = &ctx.config.tts_backend;
    let active = host
        .activate_backend(backend)
        .await
        .with_context(|| format!("TTS backend '{backend}' is not available"))?;
    active
        .speak_text(text, "")
        .await
        .with_context(|| format!("'{backend}' failed to speak"))?;
    Ok(())
}
