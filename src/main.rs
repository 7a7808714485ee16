use constants::STARTUP_TIME;
use poise::serenity_prelude as serenity;
use error::StoreError;
use store::QuoteStore;

#[derive(Clone)]
struct Data {
    store: QuoteStore,
}

type Error = Box<dyn std::error::Error + Send + Sync>;
type Context<'a> = poise::Context<'a, Data, Error>;

mod commands;
mod constants;
mod error;
mod init;
mod models;
mod store;
mod telemetry;

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            let storage = error
                .downcast_ref::<StoreError>()
                .is_some_and(StoreError::is_storage);

            tracing::error!(
                err = ?error,
                storage,
                command = %ctx.command().qualified_name,
                "an error occurred when running command"
            );

            let _ = ctx
                .send(
                    poise::CreateReply::default()
                        .reply(true)
                        .allowed_mentions(serenity::CreateAllowedMentions::new().replied_user(false))
                        .content("something went wrong on my end... please try again later."),
                )
                .await
                .inspect_err(
                    |e| tracing::error!(err = ?e, "an error occurred when sending reply"),
                );
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                tracing::error!(err = ?e, "an error occurred when handling error");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = &*STARTUP_TIME;

    let telemetry = telemetry::init_telemetry()?;

    let (mut client, store) = init::init().await?;
    let shard_manager = client.shard_manager.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(err = ?e, "an error occurred when listening for shutdown signal");
            return;
        }

        tracing::info!("received shutdown signal, disconnecting...");
        shard_manager.shutdown_all().await;
    });

    let result = client.start().await;

    store.close().await;
    if let Some(telemetry) = telemetry {
        telemetry.shutdown();
    }

    result?;

    tracing::info!("bye!");
    Ok(())
}
