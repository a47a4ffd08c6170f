//! Implements the `ping` command.
//!
//! The bot responds with an embed showing the gateway latency.

use poise::CreateReply;
use tracing::instrument;

use crate::commands::format;
use crate::commands::latency;
use crate::handlers::invoke;
use crate::Context;
use crate::LorikeetError;

/// Check that the bot is alive
#[instrument(skip(ctx), fields(author = %ctx.author().name))]
#[poise::command(prefix_command, slash_command, category = "General")]
pub async fn ping(ctx: Context<'_>) -> Result<(), LorikeetError> {
    invoke::bounded(ctx, async move {
        let embed = format::ping_embed(latency(ctx).await);
        ctx.send(CreateReply::default().embed(embed.into())).await?;
        Ok(())
    })
    .await
}
