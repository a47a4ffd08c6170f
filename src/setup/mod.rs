//! Configuration and construction of the discord client.

mod config;
pub(crate) mod framework;
pub mod intents;

use serenity::all::EventHandler;

use crate::handlers::CommandHandler;
use crate::handlers::InteractionHandler;
use crate::Data;
use crate::LorikeetError;

pub use config::Config;
pub use config::CONFIG_PATH;

/// Constructs a [serenity::Client] with the framework, cache settings and intents from the config.
pub(crate) async fn client<H>(
    data: Data,
    commands: &CommandHandler,
    interactions: &InteractionHandler,
    handler: H,
) -> Result<serenity::Client, LorikeetError>
where
    H: EventHandler + 'static,
{
    let config = data.config.clone();
    // Get discord token from config file
    let token = config.token()?;

    // Intents we wish to use
    // See https://discord.com/developers/docs/topics/gateway#gateway-intents
    let intents = config.intents();
    tracing::debug!("Using gateway intents {intents:?}");

    let client = serenity::Client::builder(token, intents)
        .cache_settings(config.cache_settings())
        .framework(framework::framework(data, commands, interactions))
        .event_handler(handler)
        .await?;

    Ok(client)
}
