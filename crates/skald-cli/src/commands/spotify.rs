//! `skald spotify-auth-url` -- print the consent URL for the Spotify skill.
//!
//! Open the URL, approve access, then copy the `code` query parameter from
//! the redirect into `auth_code` in the Spotify options file.

use skald_plugin::{SkillPlugin, merge};
use skald_plugin_spotify::{PLUGIN_ID, SpotifyPlugin, oauth_config};

use super::Context;

pub fn auth_url(ctx: &Context) -> anyhow::Result<()> {
    let defaults = SpotifyPlugin::new().declare().default_options;
    let options = merge(&defaults, &ctx.options.load(PLUGIN_ID));
    let config = oauth_config(&options);
    if config.client_id.is_empty() {
        anyhow::bail!(
            "client_id is not set; add it to {}",
            ctx.options.path(PLUGIN_ID).display()
        );
    }

    let url = config.authorize_url(None)?;
    println!("{url}");
    println!("  Redirect: {}", config.redirect_uri);
    Ok(())
}
