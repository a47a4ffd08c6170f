//! Presentation helpers shared by the commands.
//!
//! Embeds are assembled as plain [Embed] values and only turned into serenity builders when sent.

use std::fmt::Write;
use std::time::Duration;

use itertools::Itertools;
use serenity::all::CreateEmbed;
use serenity::all::CreateEmbedFooter;
use serenity::all::Timestamp;

use crate::commands::CommandDescriptor;

pub const COLOR_INFO: u32 = 0x5865F2;
pub const COLOR_SUCCESS: u32 = 0x57F287;
pub const COLOR_ERROR: u32 = 0xED4245;

/// An embed has a limit of 4096 chars in its description.
const DESCRIPTION_LIMIT: usize = 4096;

/// A rich embed, kept independent from serenity's builder so it can be inspected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    /// (name, value, inline)
    pub fields: Vec<(String, String, bool)>,
    pub color: Option<u32>,
    pub footer: Option<String>,
    /// Stamp the embed with the time it is sent.
    pub timestamp: bool,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push((name.into(), value.into(), inline));
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self) -> Self {
        self.timestamp = true;
        self
    }

    /// Value of the field called `name`.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, v, _)| v.as_str())
    }
}

impl From<Embed> for CreateEmbed {
    fn from(embed: Embed) -> Self {
        let mut out = CreateEmbed::new();
        if let Some(title) = embed.title {
            out = out.title(title);
        }
        if let Some(description) = embed.description {
            out = out.description(description);
        }
        if !embed.fields.is_empty() {
            out = out.fields(embed.fields);
        }
        if let Some(color) = embed.color {
            out = out.color(color);
        }
        if let Some(footer) = embed.footer {
            out = out.footer(CreateEmbedFooter::new(footer));
        }
        if embed.timestamp {
            out = out.timestamp(Timestamp::now());
        }
        out
    }
}

/// Format an uptime as `1d 2h 3m 4s`, leaving out leading zero units.
pub fn format_uptime(dur: &Duration) -> String {
    let total_secs = dur.as_secs();
    let days = total_secs / 86_400;
    let hours = (total_secs / 3600) % 24;
    let mins = (total_secs / 60) % 60;
    let secs = total_secs % 60;

    if days > 0 {
        format!("{days}d {hours}h {mins}m {secs}s")
    } else if hours > 0 {
        format!("{hours}h {mins}m {secs}s")
    } else if mins > 0 {
        format!("{mins}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Gateway latency in milliseconds, or `n/a` before the first heartbeat.
pub fn format_latency(latency: Option<Duration>) -> String {
    match latency {
        Some(latency) => format!("{}ms", latency.as_millis()),
        None => "n/a".to_string(),
    }
}

/// Embed describing a failure.
pub fn error_embed(title: &str, reason: &str) -> Embed {
    Embed::new(title)
        .description(reason)
        .color(COLOR_ERROR)
        .timestamp()
}

/// Data shown by the status command and its refresh button.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub uptime: Duration,
    pub latency: Option<Duration>,
    pub guild_count: usize,
    pub command_count: usize,
    pub module_count: usize,
}

pub fn ping_embed(latency: Option<Duration>) -> Embed {
    Embed::new("🏓 Pong!")
        .field("Gateway latency", format_latency(latency), true)
        .color(COLOR_SUCCESS)
}

pub fn status_embed(snapshot: &StatusSnapshot) -> Embed {
    Embed::new("Bot Status")
        .field("Uptime", format_uptime(&snapshot.uptime), true)
        .field("Latency", format_latency(snapshot.latency), true)
        .field("Guilds", snapshot.guild_count.to_string(), true)
        .field(
            "Commands",
            format!(
                "{} in {} modules",
                snapshot.command_count, snapshot.module_count
            ),
            true,
        )
        .color(COLOR_INFO)
        .timestamp()
}

/// What the info command shows about the running bot.
#[derive(Debug, Clone, PartialEq)]
pub struct BotInfo {
    pub name: String,
    pub version: &'static str,
    pub prefix: String,
    /// (feature, enabled)
    pub features: Vec<(&'static str, bool)>,
}

pub fn info_embed(info: &BotInfo) -> Embed {
    let features = info
        .features
        .iter()
        .map(|(name, on)| format!("{} {name}", if *on { "✅" } else { "❌" }))
        .join("\n");

    Embed::new(format!("About {}", info.name))
        .description("A Discord bot built on serenity and poise.")
        .field("Version", info.version, true)
        .field("Prefix", format!("`{}`", info.prefix), true)
        .field("Features", features, false)
        .color(COLOR_INFO)
        .footer("Written in Rust")
}

/// Help listing, grouped by module. `module` narrows it to one module.
pub fn help_embed(commands: &[CommandDescriptor], prefix: &str, module: Option<&str>) -> Embed {
    let mut description = String::new();
    let groups = commands
        .iter()
        .filter(|c| module.map_or(true, |m| c.module.eq_ignore_ascii_case(m)))
        .sorted_by(|a, b| a.module.cmp(&b.module).then(a.name.cmp(&b.name)))
        .chunk_by(|c| c.module.clone());

    for (module, cmds) in &groups {
        let mut block = format!("**{module}**\n");
        for cmd in cmds {
            let about = cmd.description.as_deref().unwrap_or("No description.");
            writeln!(block, "`{prefix}{}` {about}", cmd.name).expect("write to string buffer can't fail");
        }
        if description.len() + block.len() > DESCRIPTION_LIMIT {
            break;
        }
        description.push_str(&block);
        description.push('\n');
    }

    if description.is_empty() {
        description.push_str("No commands available.");
    }

    Embed::new("Help")
        .description(description.trim_end())
        .color(COLOR_INFO)
        .footer(format!("Use {prefix}help <command> or /help for details"))
}

/// Help for a single command.
pub fn command_help_embed(command: &CommandDescriptor, prefix: &str) -> Embed {
    Embed::new(format!("{prefix}{}", command.name))
        .description(
            command
                .description
                .clone()
                .unwrap_or_else(|| "No description.".to_string()),
        )
        .field("Module", &command.module, true)
        .color(COLOR_INFO)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str, module: &str) -> CommandDescriptor {
        CommandDescriptor {
            name: name.to_string(),
            description: Some(format!("Does {name}.")),
            module: module.to_string(),
        }
    }

    #[test]
    fn uptime_leaves_out_leading_zero_units() {
        assert_eq!(format_uptime(&Duration::from_secs(4)), "4s");
        assert_eq!(format_uptime(&Duration::from_secs(63)), "1m 3s");
        assert_eq!(format_uptime(&Duration::from_secs(3600)), "1h 0m 0s");
        assert_eq!(
            format_uptime(&Duration::from_secs(86_400 + 2 * 3600 + 3 * 60 + 4)),
            "1d 2h 3m 4s"
        );
    }

    #[test]
    fn latency_before_first_heartbeat() {
        assert_eq!(format_latency(None), "n/a");
        assert_eq!(format_latency(Some(Duration::from_millis(42))), "42ms");
    }

    #[test]
    fn status_embed_shows_the_snapshot() {
        let embed = status_embed(&StatusSnapshot {
            uptime: Duration::from_secs(90),
            latency: Some(Duration::from_millis(12)),
            guild_count: 3,
            command_count: 4,
            module_count: 2,
        });

        assert_eq!(embed.field_value("Uptime"), Some("1m 30s"));
        assert_eq!(embed.field_value("Latency"), Some("12ms"));
        assert_eq!(embed.field_value("Guilds"), Some("3"));
        assert_eq!(embed.field_value("Commands"), Some("4 in 2 modules"));
    }

    #[test]
    fn help_groups_by_module() {
        let commands = [
            descriptor("status", "General"),
            descriptor("help", "Utility"),
            descriptor("ping", "General"),
        ];
        let embed = help_embed(&commands, "!", None);
        let description = embed.description.unwrap();

        assert_eq!(
            description,
            "**General**\n`!ping` Does ping.\n`!status` Does status.\n\n**Utility**\n`!help` Does help."
        );
    }

    #[test]
    fn help_narrows_to_a_module() {
        let commands = [descriptor("ping", "General"), descriptor("help", "Utility")];
        let embed = help_embed(&commands, "?", Some("utility"));
        assert_eq!(
            embed.description.as_deref(),
            Some("**Utility**\n`?help` Does help.")
        );

        let embed = help_embed(&commands, "?", Some("Music"));
        assert_eq!(embed.description.as_deref(), Some("No commands available."));
    }

    #[test]
    fn info_lists_features() {
        let embed = info_embed(&BotInfo {
            name: "lorikeet".to_string(),
            version: "0.1.0",
            prefix: "!".to_string(),
            features: vec![("Slash commands", true), ("Auto reconnect", false)],
        });
        assert_eq!(
            embed.field_value("Features"),
            Some("✅ Slash commands\n❌ Auto reconnect")
        );
        assert_eq!(embed.field_value("Prefix"), Some("`!`"));
    }
}
