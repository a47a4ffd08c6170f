//! The seam between the bot and the discord client library.

use std::time::Duration;

use async_trait::async_trait;
use serenity::all::ActivityData;
use serenity::all::CreateCommand;
use serenity::all::GuildId;
use serenity::all::OnlineStatus;

use super::events::EventBus;
use crate::LorikeetError;

/// Where slash commands get registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// One guild, updates show up almost immediately.
    Guild(GuildId),
    /// Every guild, discord may take up to an hour to catch up.
    Global,
}

/// Pass-through view of the client's connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    /// `None` until the first heartbeat is acknowledged.
    pub latency: Option<Duration>,
    pub guild_count: usize,
}

/// Operations the bot needs from a gateway client.
///
/// Only the lifecycle manager calls the connection and presence methods.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Authenticate and open the gateway session.
    async fn connect(&self) -> Result<(), LorikeetError>;
    /// Close the session.
    async fn disconnect(&self) -> Result<(), LorikeetError>;
    async fn set_activity(&self, activity: Option<ActivityData>) -> Result<(), LorikeetError>;
    async fn set_status(&self, status: OnlineStatus) -> Result<(), LorikeetError>;
    /// Replace the registered application commands, returns their names.
    async fn register_commands(
        &self,
        scope: CommandScope,
        commands: Vec<CreateCommand>,
    ) -> Result<Vec<String>, LorikeetError>;
    async fn state(&self) -> ConnectionState;
    /// Lifecycle and completion events coming from this gateway.
    fn events(&self) -> &EventBus;
}
