//! Configuration for running this bot.
//!
//! Values come from [CONFIG_PATH] first, then environment variables named
//! `LORIKEET__<SECTION>__<KEY>` override them.

use std::num::NonZeroU64;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serenity::all::GatewayIntents;
use serenity::all::GuildId;

use super::intents;
use crate::bot::presence::ActivityKind;
use crate::bot::presence::Status;
use crate::error::ConfigError;
use crate::log::LogLevel;

/// The path to the config file
pub const CONFIG_PATH: &str = "config.toml";

/// Prefix of environment variables that override the config file.
const ENV_PREFIX: &str = "LORIKEET__";

/// Placeholder written to fresh config files.
const PLACEHOLDER_TOKEN: &str = "put_token_here";

/// Settings that modify bot behavior. Read once at startup and shared behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// See [DiscordConfig]
    pub discord: DiscordConfig,
    /// See [CommandConfig]
    pub commands: CommandConfig,
    /// See [ActivityConfig]
    pub activity: ActivityConfig,
    /// See [FeatureConfig]
    pub features: FeatureConfig,
    /// See [LoggingConfig]
    pub logging: LoggingConfig,
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Token needed to use a bot account.
    pub token: String,
    /// Register slash commands on this guild only. Propagates almost instantly, useful for development.
    #[serde(serialize_with = "serialize_opt", deserialize_with = "deserialize_opt")]
    pub guild_id: Option<GuildId>,
    /// Messages kept in cache per channel.
    pub message_cache_size: usize,
    /// Cache users seen in guild member chunks.
    pub always_download_users: bool,
    /// Gateway intents, a single name or a comma separated list.
    pub intents: String,
}

/// Prefix command settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub prefix: String,
    /// Max runtime of a single command, in milliseconds.
    pub timeout_ms: u64,
}

/// Presence shown once connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    pub kind: ActivityKind,
    pub name: String,
    /// Only used with [ActivityKind::Streaming].
    pub stream_url: Option<String>,
    pub status: Status,
}

/// Feature toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub slash_commands: bool,
    pub prefix_commands: bool,
    /// Buttons and select menus.
    pub interactions: bool,
    pub auto_reconnect: bool,
    pub command_logging: bool,
}

/// Configs for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Print debug traces to console?
    pub console_debug: bool,
    /// Enable writing to log file?
    pub logs_enabled: bool,
    /// Directory to store log files
    pub log_dir: String,
    /// Level for events coming from serenity, poise and friends.
    pub library_level: LogLevel,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: PLACEHOLDER_TOKEN.to_string(),
            guild_id: None,
            message_cache_size: 100,
            always_download_users: false,
            intents: "AllUnprivileged".to_string(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            timeout_ms: 3000,
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            kind: ActivityKind::Playing,
            name: "with Rust".to_string(),
            stream_url: None,
            status: Status::Online,
        }
    }
}

impl FeatureConfig {
    /// Button and select menu handlers load only with both slash commands and interactions on.
    pub fn components_enabled(&self) -> bool {
        self.slash_commands && self.interactions
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            slash_commands: true,
            prefix_commands: true,
            interactions: true,
            auto_reconnect: true,
            command_logging: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_debug: false,
            logs_enabled: true,
            log_dir: "logs".to_string(),
            library_level: LogLevel::Warn,
        }
    }
}

impl Config {
    /// Reads [CONFIG_PATH] and overlays the process environment.
    pub fn read() -> Result<Config, ConfigError> {
        let mut config = Self::read_file(CONFIG_PATH)?;
        config.apply_env(std::env::vars())?;
        Ok(config)
    }

    /// Tries to read `path` to extract a [Config].
    /// If the file doesn't exist or is empty, writes the default config there and returns defaults.
    /// If the file is malformed, the error names the offending key.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) if !content.trim().is_empty() => Self::from_toml(&content),
            Ok(_) => {
                write_file(path, &Config::default())?;
                Ok(Config::default())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_file(path, &Config::default())?;
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Parse a config from toml. Missing keys fall back to their defaults.
    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let de = toml::Deserializer::new(content);
        serde_path_to_error::deserialize(de).map_err(|error| ConfigError::InvalidConfig {
            reason: error.to_string(),
        })
    }

    /// Overrides fields from `LORIKEET__SECTION__KEY` variables. Keys are case insensitive.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            let Some(key) = strip_prefix_ignore_case(&var, ENV_PREFIX) else {
                continue;
            };
            let key = key.to_ascii_lowercase();
            let Some((section, field)) = key.split_once("__") else {
                tracing::debug!("Ignoring environment variable {var}.");
                continue;
            };
            let bad = |reason: String| ConfigError::InvalidEnv {
                var: var.clone(),
                reason,
            };

            match (section, field) {
                ("discord", "token") => self.discord.token = value,
                ("discord", "guild_id") => {
                    self.discord.guild_id = match value.trim() {
                        "" => None,
                        v => Some(GuildId::new(parse::<NonZeroU64>(v).map_err(bad)?.get())),
                    }
                }
                ("discord", "message_cache_size") => {
                    self.discord.message_cache_size = parse(&value).map_err(bad)?
                }
                ("discord", "always_download_users") => {
                    self.discord.always_download_users = parse(&value).map_err(bad)?
                }
                ("discord", "intents") => self.discord.intents = value,
                ("commands", "prefix") => self.commands.prefix = value,
                ("commands", "timeout_ms") => self.commands.timeout_ms = parse(&value).map_err(bad)?,
                ("activity", "kind") => self.activity.kind = parse(&value).map_err(bad)?,
                ("activity", "name") => self.activity.name = value,
                ("activity", "stream_url") => {
                    self.activity.stream_url = Some(value).filter(|v| !v.trim().is_empty())
                }
                ("activity", "status") => self.activity.status = parse(&value).map_err(bad)?,
                ("features", "slash_commands") => {
                    self.features.slash_commands = parse(&value).map_err(bad)?
                }
                ("features", "prefix_commands") => {
                    self.features.prefix_commands = parse(&value).map_err(bad)?
                }
                ("features", "interactions") => {
                    self.features.interactions = parse(&value).map_err(bad)?
                }
                ("features", "auto_reconnect") => {
                    self.features.auto_reconnect = parse(&value).map_err(bad)?
                }
                ("features", "command_logging") => {
                    self.features.command_logging = parse(&value).map_err(bad)?
                }
                ("logging", "console_debug") => {
                    self.logging.console_debug = parse(&value).map_err(bad)?
                }
                ("logging", "logs_enabled") => {
                    self.logging.logs_enabled = parse(&value).map_err(bad)?
                }
                ("logging", "log_dir") => self.logging.log_dir = value,
                ("logging", "library_level") => {
                    self.logging.library_level = parse(&value).map_err(bad)?
                }
                _ => tracing::debug!("Ignoring unknown environment variable {var}."),
            }
        }
        Ok(())
    }

    /// Basic sanity check for if a token was given.
    pub fn token(&self) -> Result<&str, ConfigError> {
        let token = self.discord.token.trim();
        if token.is_empty() || token.contains(PLACEHOLDER_TOKEN) {
            Err(ConfigError::InvalidConfig {
                reason: "Missing discord token".to_string(),
            })
        } else {
            Ok(token)
        }
    }

    pub fn guild_id(&self) -> Option<GuildId> {
        self.discord.guild_id
    }

    /// Parsed gateway intents, see [intents::parse_intents].
    pub fn intents(&self) -> GatewayIntents {
        intents::parse_intents(&self.discord.intents)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.commands.timeout_ms)
    }

    /// Cache settings for the serenity client.
    pub fn cache_settings(&self) -> serenity::cache::Settings {
        let mut settings = serenity::cache::Settings::default();
        settings.max_messages = self.discord.message_cache_size;
        settings.cache_users = self.discord.always_download_users;
        settings
    }

    pub fn log_dir(&self) -> &str {
        &self.logging.log_dir
    }

    /// Is debug mode enabled for console logs
    pub fn console_debug(&self) -> bool {
        self.logging.console_debug
    }

    /// Is file logging enabled.
    pub fn logs_enabled(&self) -> bool {
        self.logging.logs_enabled
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn parse<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| e.to_string())
}

/// Write the given config to `path`.
fn write_file(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config).expect("config serialization can't fail");
    tracing::info!("Writing default config to {}", path.display());
    std::fs::write(path, content).map_err(ConfigError::IoError)
}

fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<GuildId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_any(OptVisitor)
}

fn serialize_opt<S>(val: &Option<GuildId>, ser: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match val {
        Some(v) => ser.serialize_str(&v.get().to_string()),
        None => ser.serialize_str(""),
    }
}

/// Accepts a guild id as a string (possibly empty) or an integer.
struct OptVisitor;

impl<'de> serde::de::Visitor<'de> for OptVisitor {
    type Value = Option<GuildId>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a valid guild id")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v.trim() {
            "" => Ok(None),
            v => {
                let num: u64 = v.parse().map_err(|_| E::custom("not u64"))?;
                self.visit_u64(num)
            }
        }
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        let num = u64::try_from(v).map_err(|_| E::custom("guild id can't be negative"))?;
        self.visit_u64(num)
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if v == 0 {
            return Err(E::custom("guild id can't be zero"));
        }
        Ok(Some(GuildId::new(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unset_keys_use_defaults() {
        let config = Config::from_toml("[discord]\ntoken = \"t\"\n").unwrap();

        assert_eq!(config.discord.token, "t");
        assert_eq!(config.commands.prefix, "!");
        assert_eq!(config.command_timeout(), Duration::from_millis(3000));
        assert_eq!(config.discord.message_cache_size, 100);
        assert_eq!(config.discord.guild_id, None);
        assert_eq!(config.features, FeatureConfig::default());
        assert!(config.features.slash_commands);
        assert!(config.features.prefix_commands);
        assert!(config.features.interactions);
        assert!(config.features.auto_reconnect);
        assert!(config.features.command_logging);
    }

    #[test]
    fn explicit_values_are_bound() {
        let content = r#"
            [discord]
            token = "abc"
            guild_id = "310243609641484288"
            message_cache_size = 25
            always_download_users = true
            intents = "Guilds, GuildMessages"

            [commands]
            prefix = "?"
            timeout_ms = 500

            [activity]
            kind = "Watching"
            name = "the logs"
            status = "Idle"

            [features]
            slash_commands = false
            prefix_commands = true
            interactions = false
            auto_reconnect = false
            command_logging = false

            [logging]
            console_debug = true
            logs_enabled = false
            log_dir = "var/log"
            library_level = "Debug"
        "#;
        let config = Config::from_toml(content).unwrap();

        assert_eq!(config.token().unwrap(), "abc");
        assert_eq!(config.guild_id(), Some(GuildId::new(310243609641484288)));
        assert_eq!(config.discord.message_cache_size, 25);
        assert!(config.discord.always_download_users);
        assert_eq!(
            config.intents(),
            GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES
        );
        assert_eq!(config.commands.prefix, "?");
        assert_eq!(config.command_timeout(), Duration::from_millis(500));
        assert_eq!(config.activity.kind, ActivityKind::Watching);
        assert_eq!(config.activity.name, "the logs");
        assert_eq!(config.activity.status, Status::Idle);
        assert!(!config.features.slash_commands);
        assert!(config.features.prefix_commands);
        assert!(!config.features.interactions);
        assert!(!config.features.auto_reconnect);
        assert!(!config.features.command_logging);
        assert!(config.console_debug());
        assert!(!config.logs_enabled());
        assert_eq!(config.log_dir(), "var/log");
        assert_eq!(config.logging.library_level, LogLevel::Debug);
    }

    #[test]
    fn integer_guild_id_is_accepted() {
        let config = Config::from_toml("[discord]\nguild_id = 42\n").unwrap();
        assert_eq!(config.guild_id(), Some(GuildId::new(42)));

        let config = Config::from_toml("[discord]\nguild_id = \"\"\n").unwrap();
        assert_eq!(config.guild_id(), None);
    }

    #[test]
    fn malformed_value_names_the_key() {
        let err = Config::from_toml("[commands]\ntimeout_ms = \"soon\"\n").unwrap_err();
        let ConfigError::InvalidConfig { reason } = err else {
            panic!("expected InvalidConfig, got {err:?}");
        };
        assert!(reason.contains("commands.timeout_ms"), "{reason}");
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::from_toml("[discord]\ntoken = \"file\"\n[commands]\nprefix = \"?\"\n").unwrap();
        config
            .apply_env(env(&[
                ("LORIKEET__DISCORD__TOKEN", "env"),
                ("lorikeet__commands__timeout_ms", "1234"),
                ("LORIKEET__DISCORD__GUILD_ID", "7"),
                ("LORIKEET__FEATURES__SLASH_COMMANDS", "false"),
                ("LORIKEET__ACTIVITY__KIND", "listening"),
                ("PATH", "/usr/bin"),
                ("LORIKEET__NOPE__NOTHING", "1"),
            ]))
            .unwrap();

        assert_eq!(config.token().unwrap(), "env");
        assert_eq!(config.commands.prefix, "?");
        assert_eq!(config.commands.timeout_ms, 1234);
        assert_eq!(config.guild_id(), Some(GuildId::new(7)));
        assert!(!config.features.slash_commands);
        assert_eq!(config.activity.kind, ActivityKind::Listening);
    }

    #[test]
    fn unparseable_environment_value_is_an_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(env(&[("LORIKEET__FEATURES__AUTO_RECONNECT", "sometimes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { ref var, .. } if var == "LORIKEET__FEATURES__AUTO_RECONNECT"));
    }

    #[test]
    fn placeholder_or_empty_token_is_rejected() {
        assert!(Config::default().token().is_err());

        let mut config = Config::default();
        config.discord.token = "   ".to_string();
        assert!(config.token().is_err());
    }

    #[test]
    fn default_config_survives_a_write_and_read() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        assert_eq!(Config::from_toml(&content).unwrap(), Config::default());
    }

    #[test]
    fn missing_file_writes_a_template() {
        let dir = std::env::temp_dir().join(format!("lorikeet-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let _ = std::fs::remove_file(&path);

        let config = Config::read_file(&path).unwrap();

        assert_eq!(config, Config::default());
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn cache_settings_follow_config() {
        let mut config = Config::default();
        config.discord.message_cache_size = 7;
        config.discord.always_download_users = true;

        let settings = config.cache_settings();
        assert_eq!(settings.max_messages, 7);
        assert!(settings.cache_users);
    }
}
