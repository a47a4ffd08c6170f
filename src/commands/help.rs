//! Implements the `help` command and its module filter.

use async_trait::async_trait;
use poise::CreateReply;
use serenity::all::CreateActionRow;
use serenity::all::CreateSelectMenu;
use serenity::all::CreateSelectMenuKind;
use serenity::all::CreateSelectMenuOption;
use tracing::instrument;

use crate::commands;
use crate::commands::format;
use crate::commands::CommandDescriptor;
use crate::error::UserError;
use crate::handlers::interaction::ComponentCall;
use crate::handlers::interaction::ComponentHandler;
use crate::handlers::interaction::ComponentReply;
use crate::handlers::interaction::Responder;
use crate::handlers::interaction::UNKNOWN_COMPONENT;
use crate::handlers::invoke;
use crate::Context;
use crate::LorikeetError;

const MODULE_MENU_ID: &str = "help:module";

/// Menu value that lifts the module filter.
const ALL_MODULES: &str = "all";

/// Show the commands, or details on one of them
#[instrument(skip(ctx), fields(author = %ctx.author().name))]
#[poise::command(prefix_command, slash_command, category = "Utility")]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to explain"] command: Option<String>,
) -> Result<(), LorikeetError> {
    invoke::bounded(ctx, async move {
        let prefix = &ctx.data().config.commands.prefix;
        let commands = commands::descriptors(&commands::list());

        let reply = match command {
            Some(name) => {
                let command = find_command(&commands, &name)?;
                CreateReply::default().embed(format::command_help_embed(command, prefix).into())
            }
            None => {
                let modules = commands::module_names(&commands);
                CreateReply::default()
                    .embed(format::help_embed(&commands, prefix, None).into())
                    .components(commands::component_rows(
                        &ctx.data().config,
                        vec![module_menu(&modules)],
                    ))
            }
        };
        ctx.send(reply).await?;
        Ok(())
    })
    .await
}

/// Look up a command by name, ignoring case and a leading slash or prefix.
fn find_command<'a>(
    commands: &'a [CommandDescriptor],
    name: &str,
) -> Result<&'a CommandDescriptor, UserError> {
    let wanted = name.trim().trim_start_matches('/');
    commands
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| UserError::UnknownCommand {
            name: name.trim().to_string(),
        })
}

fn module_menu(modules: &[String]) -> CreateActionRow {
    let options = std::iter::once(CreateSelectMenuOption::new("All modules", ALL_MODULES))
        .chain(modules.iter().map(|m| CreateSelectMenuOption::new(m, m)))
        .collect();
    let menu = CreateSelectMenu::new(MODULE_MENU_ID, CreateSelectMenuKind::String { options })
        .placeholder("Filter by module");
    CreateActionRow::SelectMenu(menu)
}

/// Narrows the help listing to the selected module.
pub struct ModuleSelect {
    pub prefix: String,
}

impl ModuleSelect {
    /// Help embed for `selected`, which is a module name or [ALL_MODULES].
    fn listing(&self, selected: Option<&str>) -> Result<format::Embed, UserError> {
        let commands = commands::descriptors(&commands::list());
        let module = match selected {
            None | Some(ALL_MODULES) => None,
            Some(module) => {
                let known = commands::module_names(&commands)
                    .into_iter()
                    .find(|m| m.eq_ignore_ascii_case(module))
                    .ok_or_else(|| UserError::UnknownModule {
                        name: module.to_string(),
                    })?;
                Some(known)
            }
        };
        Ok(format::help_embed(&commands, &self.prefix, module.as_deref()))
    }
}

#[async_trait]
impl ComponentHandler for ModuleSelect {
    fn namespace(&self) -> &'static str {
        "help"
    }

    fn module(&self) -> &'static str {
        "Utility"
    }

    async fn handle(&self, call: &ComponentCall, responder: &dyn Responder) -> Result<(), LorikeetError> {
        if call.action() != "module" {
            return responder.respond(ComponentReply::ephemeral(UNKNOWN_COMPONENT)).await;
        }

        let embed = self.listing(call.values.first().map(String::as_str))?;
        responder
            .respond(ComponentReply::Update {
                content: None,
                embed: Some(embed),
                keep_components: true,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::interaction::testing::call;
    use crate::handlers::interaction::testing::RecordingResponder;

    fn select() -> ModuleSelect {
        ModuleSelect {
            prefix: "!".to_string(),
        }
    }

    #[test]
    fn commands_are_found_ignoring_case_and_slash() {
        let commands = commands::descriptors(&commands::list());

        assert_eq!(find_command(&commands, "PING").unwrap().name, "ping");
        assert_eq!(find_command(&commands, "/status").unwrap().name, "status");
        assert!(matches!(
            find_command(&commands, "dance"),
            Err(UserError::UnknownCommand { name }) if name == "dance"
        ));
    }

    #[test]
    fn full_listing_groups_every_module() {
        let embed = select().listing(None).unwrap();
        let description = embed.description.unwrap();

        assert!(description.contains("**General**"));
        assert!(description.contains("**Utility**"));
        assert!(description.contains("`!ping`"));
        assert!(description.contains("`!help`"));
    }

    #[tokio::test]
    async fn selecting_a_module_narrows_the_listing() {
        let responder = RecordingResponder::default();

        select()
            .handle(&call(MODULE_MENU_ID, &["Utility"]), &responder)
            .await
            .unwrap();

        let responses = responder.responses();
        let [ComponentReply::Update {
            embed: Some(embed),
            keep_components: true,
            ..
        }] = responses.as_slice()
        else {
            panic!("expected one update, got {responses:?}");
        };
        let description = embed.description.as_deref().unwrap();
        assert!(description.contains("`!help`"));
        assert!(!description.contains("`!ping`"));
    }

    #[tokio::test]
    async fn unknown_module_is_a_user_error() {
        let responder = RecordingResponder::default();

        let result = select()
            .handle(&call(MODULE_MENU_ID, &["Music"]), &responder)
            .await;

        assert!(matches!(
            result,
            Err(LorikeetError::UserError(UserError::UnknownModule { .. }))
        ));
        assert!(responder.responses().is_empty());
    }
}
