use std::time::UNIX_EPOCH;

use crate::{
    commands::{get_bot_avatar, quote::community_label},
    constants::{version::get_version, POISE_VERSION, STARTUP_TIME},
    models::quotes::Scope,
    Context, Error,
};
use poise::serenity_prelude as serenity;

/// get the bot's status.
#[poise::command(prefix_command)]
#[tracing::instrument(skip_all)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let store = &ctx.data().store;

    let total = store.count(Scope::Global).await?;
    let community = ctx.guild_id().map(community_label);
    let here = match community {
        Some(community) => store.count(Scope::Community(&community)).await?,
        None => 0,
    };

    let uptime = STARTUP_TIME
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("<t:{}:R>", d.as_secs()))
        .unwrap_or_else(|_| "unknown".to_string());

    ctx.send(poise::CreateReply::default().embed(
        serenity::CreateEmbed::new()
        .field(
            "about the bot",
            "a quote keeper for Discord: reply to a message with `quote` and it's saved for later, written using the [poise](https://github.com/serenity-rs/poise) framework.".to_string(),
            false
        )
        .field("version", get_version(), false)
        .field("rust", format!("[{0}](https://releases.rs/docs/{0})", rustc_version_runtime::version()), true)
        .field("poise", format!("[{0}](https://docs.rs/crate/poise/{0})", POISE_VERSION), true)
        .field("quotes in this server", format!("{}", here), true)
        .field("quotes overall", format!("{}", total), true)
        .field("uptime", uptime, true)
        .thumbnail(get_bot_avatar(ctx))
    ))
    .await
    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when sending reply"))?;

    Ok(())
}
