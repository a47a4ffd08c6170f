//! Parsing of the `discord.intents` config value.

use serenity::all::GatewayIntents;

/// Known intent names, normalized: lowercase without underscores.
const NAMED_INTENTS: &[(&str, GatewayIntents)] = &[
    ("guilds", GatewayIntents::GUILDS),
    ("guildmembers", GatewayIntents::GUILD_MEMBERS),
    ("guildmoderation", GatewayIntents::GUILD_MODERATION),
    ("guildemojisandstickers", GatewayIntents::GUILD_EMOJIS_AND_STICKERS),
    ("guildintegrations", GatewayIntents::GUILD_INTEGRATIONS),
    ("guildwebhooks", GatewayIntents::GUILD_WEBHOOKS),
    ("guildinvites", GatewayIntents::GUILD_INVITES),
    ("guildvoicestates", GatewayIntents::GUILD_VOICE_STATES),
    ("guildpresences", GatewayIntents::GUILD_PRESENCES),
    ("guildmessages", GatewayIntents::GUILD_MESSAGES),
    ("guildmessagereactions", GatewayIntents::GUILD_MESSAGE_REACTIONS),
    ("guildmessagetyping", GatewayIntents::GUILD_MESSAGE_TYPING),
    ("directmessages", GatewayIntents::DIRECT_MESSAGES),
    ("directmessagereactions", GatewayIntents::DIRECT_MESSAGE_REACTIONS),
    ("directmessagetyping", GatewayIntents::DIRECT_MESSAGE_TYPING),
    ("messagecontent", GatewayIntents::MESSAGE_CONTENT),
    ("guildscheduledevents", GatewayIntents::GUILD_SCHEDULED_EVENTS),
    (
        "automoderationconfiguration",
        GatewayIntents::AUTO_MODERATION_CONFIGURATION,
    ),
    (
        "automoderationexecution",
        GatewayIntents::AUTO_MODERATION_EXECUTION,
    ),
];

/// Resolve a single intent name. Case and underscores are ignored.
fn intent_by_name(name: &str) -> Option<GatewayIntents> {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();

    match normalized.as_str() {
        "allunprivileged" | "nonprivileged" => Some(GatewayIntents::non_privileged()),
        "all" => Some(GatewayIntents::all()),
        other => NAMED_INTENTS
            .iter()
            .find(|(known, _)| *known == other)
            .map(|(_, intent)| *intent),
    }
}

/// Parse a single intent name or a comma separated list of them into their union.
///
/// Empty input or any unknown name falls back to [GatewayIntents::non_privileged].
pub fn parse_intents(input: &str) -> GatewayIntents {
    let names: Vec<&str> = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        return GatewayIntents::non_privileged();
    }

    let mut intents = GatewayIntents::empty();
    for name in names {
        match intent_by_name(name) {
            Some(intent) => intents |= intent,
            None => {
                tracing::warn!("Unknown gateway intent '{name}', using all unprivileged intents.");
                return GatewayIntents::non_privileged();
            }
        }
    }
    intents
}
