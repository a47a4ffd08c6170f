//! Prefix commands, e.g. `!ping`.
//!
//! Poise does the argument parsing. This handler decides which messages reach it: messages from
//! humans in guild text channels that start with the prefix or mention the bot.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use poise::BoxFuture;
use serenity::all::Message;
use serenity::all::MessageType;
use serenity::all::UserId;
use tokio::sync::Mutex;

use super::interaction::log_completion;
use crate::bot::events::EventBus;
use crate::bot::events::GatewayEvent;
use crate::bot::events::InvocationKind;
use crate::bot::events::Subscription;
use crate::commands;
use crate::commands::CommandDescriptor;
use crate::Config;
use crate::Data;
use crate::LorikeetError;

/// The parts of a message that decide whether it can be a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageFacts {
    pub in_guild: bool,
    pub author_is_bot: bool,
    /// Joins, pins, boosts and other messages discord writes itself.
    pub is_system: bool,
}

impl MessageFacts {
    pub fn of(msg: &Message) -> Self {
        Self {
            in_guild: msg.guild_id.is_some(),
            author_is_bot: msg.author.bot,
            is_system: !matches!(msg.kind, MessageType::Regular | MessageType::InlineReply),
        }
    }

    /// Only human messages in guild text channels can be commands.
    pub fn accepts(&self) -> bool {
        self.in_guild && !self.author_is_bot && !self.is_system
    }
}

/// Split `content` into the invocation marker and the rest.
///
/// With the prefix, the rest starts right after it. With a mention of `bot_id`, whitespace
/// after the mention is skipped.
pub fn split_invocation<'a>(content: &'a str, prefix: &str, bot_id: UserId) -> Option<(&'a str, &'a str)> {
    if !prefix.is_empty() {
        if let Some(rest) = content.strip_prefix(prefix) {
            return Some((&content[..prefix.len()], rest));
        }
    }

    let id = bot_id.get();
    [format!("<@{id}>"), format!("<@!{id}>")]
        .iter()
        .find_map(|mention| {
            content
                .strip_prefix(mention.as_str())
                .map(|rest| (&content[..mention.len()], rest.trim_start()))
        })
}

/// Hooked into poise as `stripped_dynamic_prefix`. Returning `None` leaves the message alone.
fn strip_invocation<'a>(
    ctx: &'a serenity::all::Context,
    msg: &'a Message,
    data: &'a Data,
) -> BoxFuture<'a, Result<Option<(&'a str, &'a str)>, LorikeetError>> {
    Box::pin(async move {
        if !MessageFacts::of(msg).accepts() {
            return Ok(None);
        }
        let bot_id = ctx.cache.current_user().id;
        Ok(split_invocation(&msg.content, &data.config.commands.prefix, bot_id))
    })
}

/// Loads prefix commands and configures how poise finds them.
pub struct CommandHandler {
    config: Arc<Config>,
    active: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
}

impl CommandHandler {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    /// Load prefix command modules and start logging their completions.
    /// Does nothing when prefix commands are disabled.
    pub async fn initialize(&self, events: &EventBus) -> Result<(), LorikeetError> {
        if !self.config.features.prefix_commands {
            tracing::debug!("Prefix commands disabled, not loading them.");
            return Ok(());
        }

        let names: Vec<String> = commands::list()
            .into_iter()
            .filter(|cmd| cmd.prefix_action.is_some())
            .map(|cmd| cmd.name)
            .collect();
        tracing::info!(
            "Loaded {} prefix commands with prefix '{}': {names:?}",
            names.len(),
            self.config.commands.prefix
        );

        let log_success = self.config.features.command_logging;
        let subscription = events.subscribe("prefix-completions", move |event| async move {
            if let GatewayEvent::Completed(completion) = event {
                if completion.kind == InvocationKind::Prefix {
                    log_completion(&completion, log_success);
                }
            }
        });
        *self.subscription.lock().await = Some(subscription);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn shutdown(&self) {
        self.subscription.lock().await.take();
        self.active.store(false, Ordering::SeqCst);
    }

    /// Prefix commands that are loaded right now.
    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        if !self.is_active() {
            return Vec::new();
        }
        let prefix_commands: Vec<_> = commands::list()
            .into_iter()
            .filter(|cmd| cmd.prefix_action.is_some())
            .collect();
        commands::descriptors(&prefix_commands)
    }

    /// Prefix options for the framework. Without an active handler no message is treated as a command.
    pub fn prefix_options(&self) -> poise::PrefixFrameworkOptions<Data, LorikeetError> {
        if !self.is_active() {
            return poise::PrefixFrameworkOptions {
                mention_as_prefix: false,
                ..Default::default()
            };
        }
        poise::PrefixFrameworkOptions {
            prefix: None,
            mention_as_prefix: false,
            stripped_dynamic_prefix: Some(strip_invocation),
            case_insensitive_commands: true,
            ignore_bots: true,
            ..Default::default()
        }
    }
}
