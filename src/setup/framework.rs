//! Setup for [poise::Framework]

use crate::commands;
use crate::commands::Command;
use crate::handlers::invoke;
use crate::handlers::CommandHandler;
use crate::handlers::InteractionHandler;
use crate::Data;
use crate::LorikeetError;

/// Convenient type alias, only this [poise::Framework] type is used.
type Framework = poise::Framework<Data, LorikeetError>;

/// Construct a [poise::Framework] that only dispatches what the handlers have loaded.
pub(super) fn framework(
    data: Data,
    commands: &CommandHandler,
    interactions: &InteractionHandler,
) -> Framework {
    let options = framework_options(commands, interactions);
    poise::Framework::builder()
        .options(options)
        .setup(move |_ctx, _rdy, _fw| Box::pin(async move { Ok(data) }))
        .build()
}

/// Strip the invocation kinds whose handler is inactive, dropping commands left with none.
pub(crate) fn enabled_commands(prefix_active: bool, interactions_active: bool) -> Vec<Command> {
    commands::list()
        .into_iter()
        .filter_map(|mut cmd| {
            if !prefix_active {
                cmd.prefix_action = None;
            }
            if !interactions_active {
                cmd.slash_action = None;
                cmd.context_menu_action = None;
            }
            let reachable = cmd.prefix_action.is_some()
                || cmd.slash_action.is_some()
                || cmd.context_menu_action.is_some();
            reachable.then_some(cmd)
        })
        .collect()
}

/// Configure options for the [Framework]
fn framework_options(
    commands: &CommandHandler,
    interactions: &InteractionHandler,
) -> poise::FrameworkOptions<Data, LorikeetError> {
    poise::FrameworkOptions {
        commands: enabled_commands(commands.is_active(), interactions.is_active()),
        prefix_options: commands.prefix_options(),
        // Handle framework errors
        on_error: |e| crate::log::handle_framework_error(e),
        // Log when commands start
        pre_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().qualified_name;
                let user = &ctx.author().name;
                tracing::debug!("Started '{cmd_name}' command from {user}.")
            })
        },
        // Publish successful completions, failures go through on_error
        post_command: |ctx| {
            Box::pin(async move {
                let completion = invoke::completion_of(&ctx, Ok(()));
                ctx.data().publish_completion(completion);
            })
        },
        ..Default::default()
    }
}
