use poise::serenity_prelude::{self as serenity, *};
use tracing::Instrument;

use crate::{commands, on_error, store::QuoteStore, Data};

const DEFAULT_DATABASE_URL: &str = "sqlite://quotes.db";
const DEFAULT_PREFIX: &str = "$";

async fn init_store() -> anyhow::Result<QuoteStore> {
    let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        tracing::info!(
            "no DATABASE_URL set, defaulting to {}.",
            DEFAULT_DATABASE_URL
        );
        DEFAULT_DATABASE_URL.to_string()
    });

    tracing::info!("initializing database connection...");
    let store = QuoteStore::connect(&db_url).await?;
    store.initialize().await?;

    Ok(store)
}

fn init_prefix() -> String {
    let prefix = std::env::var("COMMAND_PREFIX")
        .ok()
        .filter(|prefix| !prefix.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

    tracing::info!("listening for commands with prefix {}.", prefix);

    prefix
}

async fn init_discord_client(token: &str, prefix: String, data: Data) -> anyhow::Result<Client> {
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::help::help(),
                commands::status::status(),
                commands::quote::quote(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(prefix),
                ..Default::default()
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                tracing::info!("logged in as {}!", ready.user.name);

                poise::builtins::register_globally(ctx, &framework.options().commands)
                    .await
                    .inspect_err(|e| tracing::error!(err = ?e, "an error occurred when registering commands"))?;

                Ok(data)
            }.in_current_span())
        })
        .build();

    let client = ClientBuilder::new(token, intents)
        .framework(framework)
        .activity(serenity::ActivityData {
            name: "your best lines".into(),
            kind: serenity::ActivityType::Listening,
            state: None,
            url: None,
        })
        .await?;

    Ok(client)
}

/// connect to the database and build the discord client.
///
/// the store is handed back as well so it can be closed once the client stops.
pub async fn init() -> anyhow::Result<(Client, QuoteStore)> {
    tracing::info!("initializing... please wait warmly.");

    let token = std::env::var("DISCORD_TOKEN")
        .map_err(|_| anyhow::anyhow!("missing DISCORD_TOKEN, set it in the environment or .env"))?;

    let store = init_store().await?;
    let prefix = init_prefix();

    let data = Data {
        store: store.clone(),
    };

    let client = init_discord_client(&token, prefix, data).await?;

    tracing::info!("finished initializing!");
    Ok((client, store))
}
