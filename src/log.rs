//! Logging functionality and error reporting.
//! The logging library of choice is [tracing].

use std::str::FromStr;

use itertools::Itertools;
use poise::BoxFuture;
use poise::FrameworkError;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::error::UserError;
use crate::handlers::invoke;
use crate::Config;
use crate::Context;
use crate::Data;
use crate::LorikeetError;

/// The name of this crate, used to set filter target.
const THIS_CRATE: &str = env!("CARGO_CRATE_NAME");

/// Targets of the libraries whose events are bridged into our subscriber.
const LIBRARY_TARGETS: [&str; 4] = ["serenity", "poise", "tungstenite", "reqwest"];

/// Represents possible log levels to filter messages shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    #[serde(alias = "off", alias = "none")]
    Off,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "warn")]
    Warn,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "trace")]
    Trace,
}

const LEVEL_TABLE: [(LogLevel, LevelFilter); 6] = [
    (LogLevel::Off, LevelFilter::OFF),
    (LogLevel::Error, LevelFilter::ERROR),
    (LogLevel::Warn, LevelFilter::WARN),
    (LogLevel::Info, LevelFilter::INFO),
    (LogLevel::Debug, LevelFilter::DEBUG),
    (LogLevel::Trace, LevelFilter::TRACE),
];

impl LogLevel {
    pub fn to_filter(self) -> LevelFilter {
        LEVEL_TABLE
            .iter()
            .find(|(level, _)| *level == self)
            .map_or(LevelFilter::INFO, |(_, filter)| *filter)
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        LEVEL_TABLE
            .iter()
            .map(|(level, _)| *level)
            .find(|level| format!("{level:?}").eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown log level '{s}'"))
    }
}

/// Which traces are kept. Our own crate logs at INFO, or DEBUG in debug mode.
/// Library events are bridged at the configured level.
fn targets(config: &Config) -> Targets {
    let own_level = if config.console_debug() {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let library_level = config.logging.library_level.to_filter();

    Targets::new()
        .with_default(LevelFilter::INFO)
        .with_target(THIS_CRATE, own_level)
        .with_targets(LIBRARY_TARGETS.map(|target| (target, library_level)))
}

/// Setup format layers, tracing subscribers, and installs tracing.
pub fn install_tracing(config: &Config) -> Option<WorkerGuard> {
    // Uses local time.
    let timer = fmt::time::ChronoLocal::rfc_3339();
    let target = targets(config);
    let debug = config.console_debug();

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_file(debug)
        .with_level(true)
        .with_line_number(debug)
        .with_target(true)
        .with_timer(timer.clone())
        .pretty()
        .with_filter(target.clone());

    // Output is similar to console logs, minus colours and more compact.
    let (log_layer, guard) = if config.logs_enabled() {
        let dir = config.log_dir();

        // Put file logs in `log_dir` directory as "{THIS_CRATE}.log.{TIMESTAMP}" on an hourly basis.
        let prefix_format = format!("{THIS_CRATE}.log");
        let appender = tracing_appender::rolling::hourly(dir, prefix_format);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_ansi(false)
            .with_file(debug)
            .with_level(true)
            .with_line_number(debug)
            .with_target(true)
            .with_timer(timer)
            .with_writer(writer)
            .compact()
            .with_filter(target);

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(log_layer)
        .init();

    guard
}

/// Defines how every framework error is reported.
/// [UserError]s and timeouts are expected and logged at debug. Anything else is a bug and logged as error.
/// Failed invocations are published as completions either way.
pub fn handle_framework_error(err: FrameworkError<Data, LorikeetError>) -> BoxFuture<()> {
    Box::pin(async move {
        if let Some(response) = response_to(err) {
            response.send().await;
        }
    })
}

/// What to tell the user about `err`, if anyone is waiting on it.
fn response_to(err: FrameworkError<Data, LorikeetError>) -> Option<Response> {
    let response = match err {
        FrameworkError::Setup { error, .. } => {
            error!("Error during startup: {error}");
            return None;
        }
        FrameworkError::EventHandler { error, event, .. } => {
            error!("Error while handling event. Event: {event:#?} Error:{error}");
            return None;
        }
        FrameworkError::UnknownCommand {
            msg_content,
            prefix,
            ..
        } => {
            debug!("Ignoring unknown command '{prefix}{msg_content}'.");
            return None;
        }
        FrameworkError::UnknownInteraction { interaction, .. } => {
            error!("Received unknown interaction: {}", interaction.data.name);
            return None;
        }
        FrameworkError::DynamicPrefix { error, msg, .. } => {
            error!("Failed to match prefix of '{}'. {error}", msg.content);
            return None;
        }

        FrameworkError::SubcommandRequired { ctx } => {
            let subcmds = ctx
                .command()
                .subcommands
                .iter()
                .map(|s| s.name.as_str())
                .join(", ");
            user_error(ctx, UserError::MissingSubcommand { subcmds })
        }
        FrameworkError::ArgumentParse {
            error, input, ctx, ..
        } => Response::builder()
            .ctx(ctx)
            .source(UserError::BadArgs { input })
            .add_info(error.to_string())
            .build(),
        FrameworkError::CooldownHit {
            remaining_cooldown,
            ctx,
            ..
        } => user_error(ctx, UserError::OnCooldown { remaining_cooldown }),
        FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => user_error(ctx, UserError::MissingBotPermissions { missing_permissions }),
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => user_error(ctx, UserError::MissingUserPermissions { missing_permissions }),
        FrameworkError::NotAnOwner { ctx, .. } => user_error(ctx, UserError::NotOwner),
        FrameworkError::GuildOnly { ctx, .. } => user_error(ctx, UserError::GuildOnly),
        FrameworkError::DmOnly { ctx, .. } => user_error(ctx, UserError::DmOnly),
        FrameworkError::NsfwOnly { ctx, .. } => user_error(ctx, UserError::NsfwOnly),
        FrameworkError::CommandCheckFailed { error, ctx, .. } => Response::builder()
            .ctx(ctx)
            .source(LorikeetError::CheckFailed {
                reason: error.map(|e| e.to_string()),
            })
            .build(),
        FrameworkError::Command { error, ctx, .. } => {
            let expected = matches!(
                error,
                LorikeetError::UserError(_) | LorikeetError::Timeout(_)
            );
            Response::builder()
                .ctx(ctx)
                .source(error)
                .is_error(!expected)
                .build()
        }

        FrameworkError::CommandPanic { payload, ctx, .. } => Response::builder()
            .ctx(ctx)
            .source(LorikeetError::Panic { payload })
            .is_error(true)
            .build(),
        FrameworkError::CommandStructureMismatch {
            description, ctx, ..
        } => Response::builder()
            .ctx(ctx.into())
            .source(LorikeetError::CommandStructureMismatch {
                description: description.to_string(),
            })
            .add_info("Discord may still be catching up to a command update.")
            .is_error(true)
            .build(),
        _ => {
            error!("Unhandled framework error.");
            return None;
        }
    };
    Some(response)
}

fn user_error(ctx: Context<'_>, source: UserError) -> Response<'_> {
    Response::builder().ctx(ctx).source(source).build()
}

/// Helper function to create debug information from [Context]
fn debug_info(ctx: &Context) -> String {
    let user = &ctx.author().name;
    let cmd = &ctx.command().name;
    let user_input = ctx.invocation_string();
    format!("{user} tried to use {cmd} with {user_input}.")
}

/// Structured response to a failed invocation.
/// Always logs as at least [debug level](tracing::debug), but is upgraded to
/// [error level](tracing::error) if `is_error` is set.
/// The user gets whatever [invoke::notice_for] picks for the invocation's surface.
#[derive(bon::Builder)]
#[builder(on(String, into))]
struct Response<'a> {
    /// The context of the response
    ctx: Context<'a>,
    /// The reason for this response, usually the error causing it.
    #[builder(into)]
    source: LorikeetError,
    /// Additional information to log
    add_info: Option<String>,
    /// Set to `true` to log as error.
    #[builder(default = false)]
    is_error: bool,
}

impl Response<'_> {
    /// Execute the response
    async fn send(&self) {
        let ctx = &self.ctx;

        let log_message = match &self.add_info {
            Some(info) => format!("{} | {info}", self.source),
            None => self.source.to_string(),
        };
        if self.is_error {
            error!("{log_message} | {}", debug_info(ctx));
        } else {
            debug!("{log_message}");
        }

        if let Some(notice) = invoke::notice_for(invoke::surface_of(ctx), &self.source) {
            invoke::send_notice(ctx, notice).await;
        }

        let completion = invoke::completion_of(ctx, Err(self.source.to_string()));
        ctx.data().publish_completion(completion);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_maps_to_one_filter_and_back() {
        for (level, filter) in LEVEL_TABLE {
            assert_eq!(level.to_filter(), filter);
        }
        let levels = LEVEL_TABLE.iter().map(|(l, _)| format!("{l:?}")).unique().count();
        let filters = LEVEL_TABLE.iter().map(|(_, f)| *f).unique().count();
        assert_eq!(levels, LEVEL_TABLE.len());
        assert_eq!(filters, LEVEL_TABLE.len());
    }

    #[test]
    fn levels_parse_ignoring_case() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" TRACE ".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert_eq!("Off".parse::<LogLevel>(), Ok(LogLevel::Off));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn libraries_are_filtered_at_the_configured_level() {
        let mut config = Config::default();
        config.logging.library_level = LogLevel::Error;

        let targets = targets(&config);

        assert!(targets.would_enable("serenity::gateway", &tracing::Level::ERROR));
        assert!(!targets.would_enable("serenity::gateway", &tracing::Level::WARN));
        assert!(targets.would_enable(THIS_CRATE, &tracing::Level::INFO));
        assert!(!targets.would_enable(THIS_CRATE, &tracing::Level::DEBUG));
    }

    #[test]
    fn debug_mode_enables_own_debug_traces() {
        let mut config = Config::default();
        config.logging.console_debug = true;

        let targets = targets(&config);

        assert!(targets.would_enable(THIS_CRATE, &tracing::Level::DEBUG));
        assert!(!targets.would_enable("poise", &tracing::Level::INFO));
    }
}
