use poise::serenity_prelude::{
    self as serenity, ChannelId, GuildId, Message, MessageId, MessageReference, UserId,
};
use time::OffsetDateTime;

use crate::{
    commands::reply,
    constants::{QUOTE_LIST_LIMIT, TIMESTAMP_FORMAT},
    error::{StoreError, ValidationError},
    models::quotes::{DeleteOutcome, NewQuote, Quote, Scope},
    Context, Error,
};

/// reply to a message with this to save it as a quote.
///
/// `quote random`, `quote list @member`, `quote show <id>` and `quote delete <id>` look the
/// saved quotes back up.
#[tracing::instrument(skip_all)]
#[poise::command(
    prefix_command,
    guild_only,
    subcommands("random_quote", "list_quotes", "show_quote", "delete_quote")
)]
pub async fn quote(ctx: Context<'_>) -> Result<(), Error> {
    let Some(message) = referenced_message(ctx).await? else {
        return reply(ctx, "you need to reply to a message to quote it.").await;
    };

    let Some((community, _)) = guild_info(ctx) else {
        return reply(ctx, "i couldn't find this server... try again in a bit?").await;
    };

    let channel = ctx.channel_id().name(ctx).await.inspect_err(
        |e| tracing::error!(err = ?e, "an error occurred when fetching channel name"),
    )?;
    let timestamp = format_timestamp(message.timestamp.unix_timestamp())?;

    let result = ctx
        .data()
        .store
        .insert(NewQuote {
            author: &message.author.name,
            content: &message.content,
            channel: &channel,
            timestamp: &timestamp,
            community: &community,
        })
        .await;

    match result {
        Ok(id) => {
            reply(
                ctx,
                format!(
                    "saved quote `#{id}` from **{}**:\n> {}",
                    message.author.display_name(),
                    message.content
                ),
            )
            .await
        }
        Err(StoreError::Validation(ValidationError::Empty { field: "content" })) => {
            reply(ctx, "that message has no text to quote!").await
        }
        Err(StoreError::Validation(e)) => {
            reply(ctx, format!("couldn't save that quote: {e}.")).await
        }
        Err(e) => Err(e.into()),
    }
}

/// get a random quote from this server.
#[tracing::instrument(skip_all)]
#[poise::command(prefix_command, rename = "random")]
pub async fn random_quote(ctx: Context<'_>) -> Result<(), Error> {
    let Some((community, _)) = guild_info(ctx) else {
        return reply(ctx, "i couldn't find this server... try again in a bit?").await;
    };

    let quote = ctx
        .data()
        .store
        .random_quote(Scope::Community(&community))
        .await?;

    match quote {
        Some(quote) => {
            reply(
                ctx,
                format!(
                    "random quote `#{}` from **{}** in #{} on {}:\n> {}",
                    quote.id, quote.author, quote.channel, quote.timestamp, quote.content
                ),
            )
            .await
        }
        None => reply(ctx, "no quotes yet!").await,
    }
}

/// list the quotes of a member.
#[tracing::instrument(skip_all)]
#[poise::command(prefix_command, rename = "list")]
pub async fn list_quotes(
    ctx: Context<'_>,
    #[description = "member whose quotes to list"] member: serenity::Member,
) -> Result<(), Error> {
    let Some((community, _)) = guild_info(ctx) else {
        return reply(ctx, "i couldn't find this server... try again in a bit?").await;
    };

    let quotes = ctx
        .data()
        .store
        .quotes_by_author(&member.user.name, Scope::Community(&community))
        .await?;

    reply(ctx, format_quote_list(member.display_name(), &quotes)).await
}

/// show a quote from this server by its number.
#[tracing::instrument(skip(ctx))]
#[poise::command(prefix_command, rename = "show", aliases("id"))]
pub async fn show_quote(
    ctx: Context<'_>,
    #[description = "quote number"] id: i64,
) -> Result<(), Error> {
    let Some((community, _)) = guild_info(ctx) else {
        return reply(ctx, "i couldn't find this server... try again in a bit?").await;
    };

    let quote = ctx
        .data()
        .store
        .quote_by_id(id)
        .await?
        .filter(|quote| quote.community == community);

    match quote {
        Some(quote) => {
            reply(
                ctx,
                format!(
                    "quote `#{}` from **{}**:\n> {}",
                    quote.id, quote.author, quote.content
                ),
            )
            .await
        }
        None => reply(ctx, format!("quote `#{id}` not found.")).await,
    }
}

/// delete a quote from this server. only the server owner can do this.
#[tracing::instrument(skip(ctx))]
#[poise::command(prefix_command, rename = "delete")]
pub async fn delete_quote(
    ctx: Context<'_>,
    #[description = "quote number"] id: i64,
) -> Result<(), Error> {
    let Some((community, owner_id)) = guild_info(ctx) else {
        return reply(ctx, "i couldn't find this server... try again in a bit?").await;
    };

    if owner_id != ctx.author().id {
        tracing::warn!(user = %ctx.author().id, id, "non-owner tried to delete a quote");
        return reply(ctx, "only the server owner can delete quotes.").await;
    }

    let store = &ctx.data().store;

    // owners may only delete quotes saved in their own server
    let belongs_here = store
        .quote_by_id(id)
        .await?
        .is_some_and(|quote| quote.community == community);

    let outcome = if belongs_here {
        store.delete_by_id(id).await?
    } else {
        DeleteOutcome::NotFound
    };

    match outcome {
        DeleteOutcome::Deleted => reply(ctx, format!("deleted quote `#{id}`.")).await,
        DeleteOutcome::NotFound => reply(ctx, format!("quote `#{id}` not found.")).await,
    }
}

/// the message the invoking message replies to.
///
/// discord doesn't always resolve the reply inline, so fall back to fetching it by id.
async fn referenced_message(ctx: Context<'_>) -> Result<Option<Message>, Error> {
    let poise::Context::Prefix(prefix_ctx) = ctx else {
        return Ok(None);
    };

    if let Some(message) = &prefix_ctx.msg.referenced_message {
        return Ok(Some(message.as_ref().clone()));
    }

    let Some((channel_id, message_id)) = prefix_ctx
        .msg
        .message_reference
        .as_ref()
        .and_then(reference_target)
    else {
        return Ok(None);
    };

    let message = channel_id.message(ctx, message_id).await.inspect_err(
        |e| tracing::error!(err = ?e, "an error occurred when fetching replied message"),
    )?;

    Ok(Some(message))
}

fn reference_target(reference: &MessageReference) -> Option<(ChannelId, MessageId)> {
    reference
        .message_id
        .map(|message_id| (reference.channel_id, message_id))
}

/// quotes are filed under the guild id, which survives renames and is unique.
pub(crate) fn community_label(guild_id: GuildId) -> String {
    guild_id.to_string()
}

/// community label and owner of the guild the command was invoked in, from cache.
fn guild_info(ctx: Context<'_>) -> Option<(String, UserId)> {
    ctx.guild()
        .map(|guild| (community_label(guild.id), guild.owner_id))
}

fn format_timestamp(unix_timestamp: i64) -> Result<String, Error> {
    Ok(OffsetDateTime::from_unix_timestamp(unix_timestamp)?.format(TIMESTAMP_FORMAT)?)
}

fn format_quote_list(display_name: &str, quotes: &[Quote]) -> String {
    if quotes.is_empty() {
        return format!("no quotes found for {display_name}.");
    }

    let lines = quotes
        .iter()
        .take(QUOTE_LIST_LIMIT)
        .map(|quote| {
            format!(
                "`#{}`: \"{}\" in #{}, recorded on {}",
                quote.id, quote.content, quote.channel, quote.timestamp
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    if quotes.len() <= QUOTE_LIST_LIMIT {
        format!(
            "{display_name} has {} quotes. here they are:\n{lines}",
            quotes.len()
        )
    } else {
        format!(
            "{display_name} has {} quotes. here are the first {QUOTE_LIST_LIMIT}:\n{lines}\n...and {} more.",
            quotes.len(),
            quotes.len() - QUOTE_LIST_LIMIT
        )
    }
}
