//! `skald plugins` and `skald commands` -- inspect what got loaded.

use std::sync::Arc;

use comfy_table::{Table, presets::UTF8_FULL};

use crate::speech::LogSink;

use super::Context;

pub async fn list_plugins(ctx: &Context, json: bool) -> anyhow::Result<()> {
    let host = ctx.load_host(Arc::new(LogSink)).await;
    let loaded = host.loaded();

    if json {
        println!("{}", serde_json::to_string_pretty(&loaded)?);
        return Ok(());
    }

    if loaded.is_empty() {
        println!("No plugins loaded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["ID", "NAME", "VERSION", "STATE", "COMMANDS", "BACKENDS"]);
    for plugin in &loaded {
        let backends = if plugin.backends.is_empty() {
            "-".to_string()
        } else {
            plugin.backends.join(", ")
        };
        table.add_row([
            plugin.id.clone(),
            plugin.name.clone(),
            plugin.version.clone(),
            plugin.state.to_string(),
            plugin.commands.len().to_string(),
            backends,
        ]);
    }
    println!("{table}");
    println!("  Options: {}", ctx.options.dir().display());
    Ok(())
}

pub async fn list_commands(ctx: &Context) -> anyhow::Result<()> {
    let host = ctx.load_host(Arc::new(LogSink)).await;
    let aliases = host.router().aliases();

    if aliases.is_empty() {
        println!("No commands registered.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["ALIAS", "PLUGIN", "COMMAND"]);
    for (alias, target) in aliases {
        table.add_row([alias, target.owner.as_str(), target.command.as_str()]);
    }
    println!("{table}");
    Ok(())
}
