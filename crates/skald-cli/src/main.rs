//! `skald` -- command-line host for the skald voice assistant.
//!
//! - `skald run` -- read utterances from stdin and dispatch them to skills.
//! - `skald plugins` -- list loaded plugins and their state.
//! - `skald commands` -- list registered command aliases.
//! - `skald say` -- speak text through the configured TTS backend.
//! - `skald spotify-auth-url` -- print the Spotify consent URL.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod greeter;
mod speech;

/// skald voice assistant.
#[derive(Parser)]
#[command(name = "skald", about = "skald voice assistant", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (default: $SKALD_CONFIG_DIR or ~/.skald).
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read utterances from stdin, one per line, and act on them.
    Run,

    /// List loaded plugins.
    Plugins {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List registered command aliases.
    Commands,

    /// Speak text through the configured TTS backend.
    Say {
        /// Text to speak.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Print the Spotify authorization URL.
    SpotifyAuthUrl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let ctx = commands::Context::load(cli.config_dir.as_deref())?;
    match cli.command {
        Commands::Run => commands::run::run(&ctx).await?,
        Commands::Plugins { json } => commands::plugins::list_plugins(&ctx, json).await?,
        Commands::Commands => commands::plugins::list_commands(&ctx).await?,
        Commands::Say { text } => commands::say::say(&ctx, &text.join(" ")).await?,
        Commands::SpotifyAuthUrl => commands::spotify::auth_url(&ctx)?,
    }

    Ok(())
}
