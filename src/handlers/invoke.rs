//! Bounded execution of command bodies and the notices users see when one fails.

use std::future::Future;
use std::time::Duration;

use poise::CreateReply;
use serenity::all::CommandType;

use crate::bot::events::Completion;
use crate::bot::events::InvocationKind;
use crate::commands::format;
use crate::commands::format::Embed;
use crate::Context;
use crate::LorikeetError;

/// Generic reply to interaction failures, the details only go to the logs.
pub const GENERIC_ERROR: &str = "An error occurred while processing your request.";

/// Run `fut`, failing with [LorikeetError::Timeout] if it takes longer than `limit`.
/// Only `fut` is cancelled on expiry.
pub async fn run_bounded<F, T>(limit: Duration, fut: F) -> Result<T, LorikeetError>
where
    F: Future<Output = Result<T, LorikeetError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(LorikeetError::Timeout(limit)),
    }
}

/// Run a command body under the configured command timeout.
pub async fn bounded<F>(ctx: Context<'_>, body: F) -> Result<(), LorikeetError>
where
    F: Future<Output = Result<(), LorikeetError>>,
{
    let limit = ctx.data().config.command_timeout();
    run_bounded(limit, body).await
}

/// Where a failed invocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// A prefix command in a text channel.
    Prefix,
    /// A slash command or component. `responded` is true once the initial response was sent.
    Interaction { responded: bool },
}

/// What to tell the user about a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Plain message in the channel.
    ChannelText(String),
    /// Embed in the channel.
    ChannelEmbed(Embed),
    /// Only visible to the invoking user.
    Ephemeral { content: String, follow_up: bool },
}

fn timeout_text(limit: Duration) -> String {
    format!("⏱️ Command timed out after {}s.", limit.as_secs_f32())
}

/// Pick the notice for `error` raised on `surface`. `None` means stay silent.
pub fn notice_for(surface: Surface, error: &LorikeetError) -> Option<Notice> {
    match (surface, error) {
        (Surface::Prefix, LorikeetError::Timeout(limit)) => {
            Some(Notice::ChannelText(timeout_text(*limit)))
        }
        (Surface::Prefix, error) => Some(Notice::ChannelEmbed(format::error_embed(
            "Command Error",
            &error.to_string(),
        ))),
        (Surface::Interaction { responded: true }, LorikeetError::Timeout(_)) => None,
        (Surface::Interaction { responded: false }, LorikeetError::Timeout(limit)) => {
            Some(Notice::Ephemeral {
                content: timeout_text(*limit),
                follow_up: false,
            })
        }
        (Surface::Interaction { responded }, LorikeetError::UserError(user_error)) => {
            Some(Notice::Ephemeral {
                content: user_error.to_string(),
                follow_up: responded,
            })
        }
        (Surface::Interaction { responded }, _) => Some(Notice::Ephemeral {
            content: GENERIC_ERROR.to_string(),
            follow_up: responded,
        }),
    }
}

/// Which surface a poise [Context] belongs to.
pub fn surface_of(ctx: &Context<'_>) -> Surface {
    match ctx {
        poise::Context::Prefix(_) => Surface::Prefix,
        poise::Context::Application(app) => Surface::Interaction {
            responded: app
                .has_sent_initial_response
                .load(std::sync::atomic::Ordering::SeqCst),
        },
    }
}

/// Describe a finished poise invocation for the event bus.
pub fn completion_of(ctx: &Context<'_>, outcome: Result<(), String>) -> Completion {
    let kind = match ctx {
        poise::Context::Prefix(_) => InvocationKind::Prefix,
        poise::Context::Application(app) => match app.interaction.data.kind {
            CommandType::ChatInput => InvocationKind::Slash,
            _ => InvocationKind::ContextMenu,
        },
    };
    Completion {
        kind,
        name: ctx.command().qualified_name.clone(),
        user: ctx.author().name.clone(),
        channel: ctx.channel_id(),
        guild: ctx.guild_id(),
        outcome,
    }
}

/// Send `notice` through a poise [Context]. Failing to send is logged and dropped.
///
/// Poise picks between an initial response and a follow-up by itself.
pub async fn send_notice(ctx: &Context<'_>, notice: Notice) {
    let reply = match notice {
        Notice::ChannelText(content) => CreateReply::default().content(content),
        Notice::ChannelEmbed(embed) => CreateReply::default().embed(embed.into()),
        Notice::Ephemeral { content, .. } => CreateReply::default().ephemeral(true).content(content),
    };
    if let Err(e) = ctx.send(reply).await {
        tracing::error!("Failed to send error notice. {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UserError;

    #[tokio::test(start_paused = true)]
    async fn slow_body_times_out() {
        let limit = Duration::from_millis(3000);
        let result: Result<(), _> = run_bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(LorikeetError::Timeout(d)) if d == limit));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_body_keeps_its_result() {
        let result = run_bounded(Duration::from_secs(3), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let result: Result<(), _> = run_bounded(Duration::from_secs(3), async {
            Err(LorikeetError::NotConnected)
        })
        .await;
        assert!(matches!(result, Err(LorikeetError::NotConnected)));
    }

    #[test]
    fn prefix_timeout_is_a_channel_message() {
        let notice = notice_for(Surface::Prefix, &LorikeetError::Timeout(Duration::from_secs(3)));
        assert_eq!(
            notice,
            Some(Notice::ChannelText("⏱️ Command timed out after 3s.".to_string()))
        );
    }

    #[test]
    fn prefix_failure_is_a_command_error_embed() {
        let Some(Notice::ChannelEmbed(embed)) =
            notice_for(Surface::Prefix, &LorikeetError::NotConnected)
        else {
            panic!("expected an embed");
        };
        assert_eq!(embed.title.as_deref(), Some("Command Error"));
        assert_eq!(embed.description.as_deref(), Some("Not connected to discord."));
    }

    #[test]
    fn interaction_timeout_only_when_nothing_was_sent() {
        let timeout = LorikeetError::Timeout(Duration::from_secs(3));
        assert!(matches!(
            notice_for(Surface::Interaction { responded: false }, &timeout),
            Some(Notice::Ephemeral { follow_up: false, .. })
        ));
        assert_eq!(
            notice_for(Surface::Interaction { responded: true }, &timeout),
            None
        );
    }

    #[test]
    fn interaction_failure_prefers_initial_response() {
        let error = LorikeetError::SessionEnded {
            reason: "gone".to_string(),
        };
        assert_eq!(
            notice_for(Surface::Interaction { responded: false }, &error),
            Some(Notice::Ephemeral {
                content: GENERIC_ERROR.to_string(),
                follow_up: false,
            })
        );
        assert_eq!(
            notice_for(Surface::Interaction { responded: true }, &error),
            Some(Notice::Ephemeral {
                content: GENERIC_ERROR.to_string(),
                follow_up: true,
            })
        );
    }

    #[test]
    fn user_errors_are_shown_verbatim() {
        let error = LorikeetError::from(UserError::GuildOnly);
        assert_eq!(
            notice_for(Surface::Interaction { responded: false }, &error),
            Some(Notice::Ephemeral {
                content: "This command only works in a server.".to_string(),
                follow_up: false,
            })
        );
    }
}
