//! Implements the `info` command, the "User info" context menu and the dismiss button.

use async_trait::async_trait;
use poise::CreateReply;
use serenity::all::ButtonStyle;
use serenity::all::CreateActionRow;
use serenity::all::CreateButton;
use serenity::all::User;
use tracing::instrument;

use crate::commands;
use crate::commands::format;
use crate::commands::format::BotInfo;
use crate::commands::format::Embed;
use crate::handlers::interaction::ComponentCall;
use crate::handlers::interaction::ComponentHandler;
use crate::handlers::interaction::ComponentReply;
use crate::handlers::interaction::Responder;
use crate::handlers::interaction::UNKNOWN_COMPONENT;
use crate::handlers::invoke;
use crate::Config;
use crate::Context;
use crate::LorikeetError;

const DISMISS_ID: &str = "info:dismiss";

/// Show what this bot is and what it can do
#[instrument(skip(ctx), fields(author = %ctx.author().name))]
#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn info(ctx: Context<'_>) -> Result<(), LorikeetError> {
    invoke::bounded(ctx, async move {
        let name = ctx.cache().current_user().name.clone();
        let info = bot_info(name, &ctx.data().config);

        let dismiss = CreateButton::new(DISMISS_ID)
            .label("Dismiss")
            .style(ButtonStyle::Secondary);
        let reply = CreateReply::default()
            .embed(format::info_embed(&info).into())
            .components(commands::component_rows(
                &ctx.data().config,
                vec![CreateActionRow::Buttons(vec![dismiss])],
            ));
        ctx.send(reply).await?;
        Ok(())
    })
    .await
}

/// Show a user's account details
#[instrument(skip(ctx, user), fields(author = %ctx.author().name, target = %user.name))]
#[poise::command(context_menu_command = "User info", category = "General")]
pub async fn user_info(ctx: Context<'_>, user: User) -> Result<(), LorikeetError> {
    invoke::bounded(ctx, async move {
        let reply = CreateReply::default()
            .ephemeral(true)
            .embed(user_embed(&user).into());
        ctx.send(reply).await?;
        Ok(())
    })
    .await
}

pub fn bot_info(name: String, config: &Config) -> BotInfo {
    let features = &config.features;
    BotInfo {
        name,
        version: env!("CARGO_PKG_VERSION"),
        prefix: config.commands.prefix.clone(),
        features: vec![
            ("Slash commands", features.slash_commands),
            ("Prefix commands", features.prefix_commands),
            ("Interactions", features.interactions),
            ("Auto reconnect", features.auto_reconnect),
            ("Command logging", features.command_logging),
        ],
    }
}

fn user_embed(user: &User) -> Embed {
    Embed::new(user.name.clone())
        .field("ID", user.id.to_string(), true)
        .field("Bot", if user.bot { "Yes" } else { "No" }, true)
        .field(
            "Created",
            format!("<t:{}:R>", user.created_at().unix_timestamp()),
            true,
        )
        .color(format::COLOR_INFO)
}

/// Removes the info embed and its button.
pub struct Dismiss;

#[async_trait]
impl ComponentHandler for Dismiss {
    fn namespace(&self) -> &'static str {
        "info"
    }

    fn module(&self) -> &'static str {
        "General"
    }

    async fn handle(&self, call: &ComponentCall, responder: &dyn Responder) -> Result<(), LorikeetError> {
        let reply = match call.action() {
            "dismiss" => ComponentReply::Update {
                content: Some(format!("Dismissed by {}.", call.user)),
                embed: None,
                keep_components: false,
            },
            _ => ComponentReply::ephemeral(UNKNOWN_COMPONENT),
        };
        responder.respond(reply).await
    }
}
