//! Implements the `status` command and its refresh button.

use async_trait::async_trait;
use poise::CreateReply;
use serenity::all::ButtonStyle;
use serenity::all::CreateActionRow;
use serenity::all::CreateButton;
use tracing::instrument;

use crate::commands;
use crate::commands::format;
use crate::commands::latency;
use crate::handlers::interaction::ComponentCall;
use crate::handlers::interaction::ComponentHandler;
use crate::handlers::interaction::ComponentReply;
use crate::handlers::interaction::Responder;
use crate::handlers::interaction::UNKNOWN_COMPONENT;
use crate::handlers::invoke;
use crate::Context;
use crate::LorikeetError;

const REFRESH_ID: &str = "status:refresh";

/// Show uptime, latency and loaded commands
#[instrument(skip(ctx), fields(author = %ctx.author().name))]
#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn status(ctx: Context<'_>) -> Result<(), LorikeetError> {
    invoke::bounded(ctx, async move {
        let guild_count = ctx.cache().guild_count();
        let snapshot = commands::status_snapshot(ctx.data().uptime(), latency(ctx).await, guild_count);

        let reply = CreateReply::default()
            .embed(format::status_embed(&snapshot).into())
            .components(commands::component_rows(&ctx.data().config, vec![refresh_row()]));
        ctx.send(reply).await?;
        Ok(())
    })
    .await
}

fn refresh_row() -> CreateActionRow {
    let button = CreateButton::new(REFRESH_ID)
        .label("Refresh")
        .emoji('🔄')
        .style(ButtonStyle::Secondary);
    CreateActionRow::Buttons(vec![button])
}

/// Redraws the status embed in place.
pub struct RefreshStatus;

#[async_trait]
impl ComponentHandler for RefreshStatus {
    fn namespace(&self) -> &'static str {
        "status"
    }

    fn module(&self) -> &'static str {
        "General"
    }

    async fn handle(&self, call: &ComponentCall, responder: &dyn Responder) -> Result<(), LorikeetError> {
        let reply = match call.action() {
            "refresh" => ComponentReply::Update {
                content: None,
                embed: Some(format::status_embed(&call.status)),
                keep_components: true,
            },
            _ => ComponentReply::ephemeral(UNKNOWN_COMPONENT),
        };
        responder.respond(reply).await
    }
}
