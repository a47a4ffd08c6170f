//! Error types used throughout the bot.
//!
//! [LorikeetError] is the top level error. [UserError]s are mistakes on the user's side and are
//! shown to them verbatim. [ConfigError]s happen before the bot connects and are fatal.

use std::time::Duration;

use serenity::all::Permissions;
use thiserror::Error;

/// Top level error for the bot.
#[derive(Debug, Error)]
pub enum LorikeetError {
    /// Errors coming from the discord client library.
    #[error(transparent)]
    Serenity(#[from] serenity::Error),

    /// Errors while loading configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Errors caused by the user, shown to them as is.
    #[error(transparent)]
    UserError(#[from] UserError),

    /// A command or component handler ran past the configured timeout.
    #[error("Timed out after {}s.", .0.as_secs_f32())]
    Timeout(Duration),

    /// An operation needs a live gateway session.
    #[error("Not connected to discord.")]
    NotConnected,

    /// The gateway task ended without being asked to.
    #[error("Gateway session ended: {reason}")]
    SessionEnded { reason: String },

    /// A command check returned false or errored.
    #[error("A command check failed. {}", .reason.as_deref().unwrap_or("No reason given."))]
    CheckFailed { reason: Option<String> },

    /// A command panicked.
    #[error("Command panicked: {}", .payload.as_deref().unwrap_or("<no payload>"))]
    Panic { payload: Option<String> },

    /// Discord's view of a command differs from the one compiled in.
    #[error("Command structure mismatch: {description}")]
    CommandStructureMismatch { description: String },
}

/// Errors the user can fix themselves.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("This command only works in a server.")]
    GuildOnly,
    #[error("This command only works in direct messages.")]
    DmOnly,
    #[error("This command only works in NSFW channels.")]
    NsfwOnly,
    #[error("Only the bot owner can use this command.")]
    NotOwner,
    #[error("Could not parse `{}`.", .input.as_deref().unwrap_or(""))]
    BadArgs { input: Option<String> },
    #[error("Missing subcommand, try one of: {subcmds}.")]
    MissingSubcommand { subcmds: String },
    #[error("Slow down! Try again in {}s.", .remaining_cooldown.as_secs())]
    OnCooldown { remaining_cooldown: Duration },
    #[error("I'm missing these permissions: {missing_permissions}.")]
    MissingBotPermissions { missing_permissions: Permissions },
    #[error("You are missing these permissions: {}.", .missing_permissions.map_or("unknown".to_string(), |p| p.to_string()))]
    MissingUserPermissions {
        missing_permissions: Option<Permissions>,
    },
    #[error("No command named `{name}`.")]
    UnknownCommand { name: String },
    #[error("No module named `{name}`.")]
    UnknownModule { name: String },
}

/// Errors while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("Invalid value for environment variable '{var}': {reason}")]
    InvalidEnv { var: String, reason: String },
    #[error("Config file io error: {0}")]
    IoError(#[from] std::io::Error),
}
