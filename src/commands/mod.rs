//! Bot commands.

pub mod format;
mod help;
mod info;
mod ping;
mod status;

use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use serenity::all::CreateActionRow;

use crate::commands::format::StatusSnapshot;
use crate::handlers::interaction::ComponentHandler;
use crate::Config;
use crate::Context;
use crate::{Data, LorikeetError};

/// Convenient type alias for [poise::Command].
pub type Command = poise::Command<Data, LorikeetError>;

/// Module name for commands without a category.
const DEFAULT_MODULE: &str = "General";

/// Lists all the implemented commands
pub fn list() -> Vec<Command> {
    vec![
        ping::ping(),
        status::status(),
        info::info(),
        info::user_info(),
        help::help(),
    ]
}

/// Lists the handlers for buttons and select menus sent by the commands.
pub fn components(config: &Config) -> Vec<Arc<dyn ComponentHandler>> {
    vec![
        Arc::new(status::RefreshStatus),
        Arc::new(info::Dismiss),
        Arc::new(help::ModuleSelect {
            prefix: config.commands.prefix.clone(),
        }),
    ]
}

/// `rows` if their handlers from [components] get loaded, otherwise none.
pub fn component_rows(config: &Config, rows: Vec<CreateActionRow>) -> Vec<CreateActionRow> {
    if config.features.components_enabled() {
        rows
    } else {
        Vec::new()
    }
}

/// Read-only view of a registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: Option<String>,
    /// The command's category.
    pub module: String,
}

impl From<&Command> for CommandDescriptor {
    fn from(cmd: &Command) -> Self {
        Self {
            name: cmd.name.clone(),
            description: cmd.description.clone(),
            module: cmd
                .category
                .clone()
                .unwrap_or_else(|| DEFAULT_MODULE.to_string()),
        }
    }
}

/// Descriptors for `commands`, leaving out context menu only entries.
pub fn descriptors(commands: &[Command]) -> Vec<CommandDescriptor> {
    commands
        .iter()
        .filter(|cmd| cmd.prefix_action.is_some() || cmd.slash_action.is_some())
        .map(CommandDescriptor::from)
        .collect()
}

/// Number of distinct modules in `commands`.
pub fn module_count(commands: &[CommandDescriptor]) -> usize {
    commands.iter().map(|c| c.module.as_str()).unique().count()
}

/// Names of all distinct modules, sorted.
pub fn module_names(commands: &[CommandDescriptor]) -> Vec<String> {
    commands
        .iter()
        .map(|c| c.module.clone())
        .unique()
        .sorted()
        .collect()
}

/// Gateway latency of the invoking shard, `None` until the first heartbeat.
async fn latency(ctx: Context<'_>) -> Option<Duration> {
    let ping = ctx.ping().await;
    (!ping.is_zero()).then_some(ping)
}

/// Status of the running bot, with command counts taken from [list].
pub fn status_snapshot(uptime: Duration, latency: Option<Duration>, guild_count: usize) -> StatusSnapshot {
    let commands = descriptors(&list());
    StatusSnapshot {
        uptime,
        latency,
        guild_count,
        command_count: commands.len(),
        module_count: module_count(&commands),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_has_a_module_and_description() {
        for cmd in list() {
            assert!(cmd.category.is_some(), "{} has no category", cmd.name);
            assert!(
                cmd.description.is_some() || cmd.context_menu_action.is_some(),
                "{} has no description",
                cmd.name
            );
        }
    }

    #[test]
    fn descriptors_cover_text_commands() {
        let descriptors = descriptors(&list());
        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();

        assert_eq!(names, ["ping", "status", "info", "help"]);
        assert_eq!(module_count(&descriptors), 2);
        assert_eq!(module_names(&descriptors), ["General", "Utility"]);
    }

    #[test]
    fn components_are_only_attached_when_they_can_be_handled() {
        let row = || vec![CreateActionRow::Buttons(Vec::new())];
        let mut config = Config::default();
        assert_eq!(component_rows(&config, row()).len(), 1);

        config.features.interactions = false;
        assert!(component_rows(&config, row()).is_empty());

        config.features.interactions = true;
        config.features.slash_commands = false;
        assert!(component_rows(&config, row()).is_empty());
    }

    #[test]
    fn component_namespaces_are_unique() {
        let components = components(&Config::default());
        let namespaces: Vec<_> = components.iter().map(|c| c.namespace()).collect();
        assert_eq!(namespaces.iter().unique().count(), namespaces.len());
    }
}
