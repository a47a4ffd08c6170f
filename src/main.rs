mod bot;
mod commands;
mod data;
mod error;
mod handlers;
mod log;
mod setup;

use std::sync::Arc;

use bot::client::SerenityGateway;
use bot::Bot;
use handlers::CommandHandler;
use handlers::InteractionHandler;

pub use data::Data;
pub use error::LorikeetError;
pub use setup::Config;

/// Convenient type alias for [poise::Context].
type Context<'a> = poise::Context<'a, Data, LorikeetError>;

#[tokio::main]
async fn main() -> Result<(), LorikeetError> {
    // Tracing isn't installed yet, so config errors go straight to stderr.
    let config = match Config::read() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load {}. {e}", setup::CONFIG_PATH);
            return Err(e.into());
        }
    };

    // Keep the guard alive until the end, dropping it flushes the log file.
    let guard = log::install_tracing(&config);

    let result = run(config).await;
    if let Err(e) = &result {
        tracing::error!("Fatal: {e}");
    }

    drop(guard);
    result
}

/// Start the bot and keep it running until Ctrl-C.
async fn run(config: Arc<Config>) -> Result<(), LorikeetError> {
    config.token()?;

    let commands = Arc::new(CommandHandler::new(config.clone()));
    let interactions = Arc::new(InteractionHandler::new(config.clone()));
    let gateway = Arc::new(SerenityGateway::new(
        config.clone(),
        commands.clone(),
        interactions.clone(),
    ));
    let bot = Bot::new(gateway, config, commands, interactions);

    bot.start().await?;
    tracing::info!("Running, press Ctrl-C to stop.");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C, shutting down. {e}");
    }

    tracing::info!("Shutting down.");
    bot.stop().await
}
