//! [Gateway] backed by a real [serenity::Client].

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serenity::all::ActivityData;
use serenity::all::Cache;
use serenity::all::ComponentInteraction;
use serenity::all::ComponentInteractionDataKind;
use serenity::all::ConnectionStage;
use serenity::all::Context;
use serenity::all::CreateCommand;
use serenity::all::CreateInteractionResponse;
use serenity::all::CreateInteractionResponseFollowup;
use serenity::all::CreateInteractionResponseMessage;
use serenity::all::EditInteractionResponse;
use serenity::all::EventHandler;
use serenity::all::Guild;
use serenity::all::GuildId;
use serenity::all::Http;
use serenity::all::Interaction;
use serenity::all::OnlineStatus;
use serenity::all::Ready;
use serenity::all::ShardManager;
use serenity::all::ShardStageUpdateEvent;
use serenity::all::UnavailableGuild;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

use super::events::EventBus;
use super::events::GatewayEvent;
use super::events::ReadySummary;
use super::gateway::CommandScope;
use super::gateway::ConnectionState;
use super::gateway::Gateway;
use crate::commands;
use crate::commands::format::StatusSnapshot;
use crate::handlers::interaction::ComponentCall;
use crate::handlers::interaction::ComponentReply;
use crate::handlers::interaction::Responder;
use crate::handlers::CommandHandler;
use crate::handlers::InteractionHandler;
use crate::setup;
use crate::Config;
use crate::Data;
use crate::LorikeetError;

/// How long [Gateway::disconnect] waits for the client task to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// A running client.
struct Session {
    shard_manager: Arc<ShardManager>,
    cache: Arc<Cache>,
    http: Arc<Http>,
    task: JoinHandle<()>,
}

impl Session {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

struct Shared {
    config: Arc<Config>,
    started: Instant,
    bus: EventBus,
    commands: Arc<CommandHandler>,
    interactions: Arc<InteractionHandler>,
    session: Mutex<Option<Session>>,
    /// Set while a requested disconnect is in progress, so the client ending isn't reported as lost.
    stopping: AtomicBool,
}

/// Talks to discord through serenity. A new client is built on every connect.
pub struct SerenityGateway {
    shared: Arc<Shared>,
}

impl SerenityGateway {
    pub fn new(
        config: Arc<Config>,
        commands: Arc<CommandHandler>,
        interactions: Arc<InteractionHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                started: Instant::now(),
                bus: EventBus::new(),
                commands,
                interactions,
                session: Mutex::new(None),
                stopping: AtomicBool::new(false),
            }),
        }
    }
}

impl Shared {
    async fn state(&self) -> ConnectionState {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref().filter(|s| s.is_running()) else {
            return ConnectionState::default();
        };

        let latency = {
            let runners = session.shard_manager.runners.lock().await;
            runners.values().filter_map(|runner| runner.latency).min()
        };
        ConnectionState {
            connected: true,
            latency,
            guild_count: session.cache.guild_count(),
        }
    }

    async fn snapshot(&self) -> StatusSnapshot {
        let state = self.state().await;
        commands::status_snapshot(self.started.elapsed(), state.latency, state.guild_count)
    }

    /// Run `f` against every shard of the current session.
    async fn each_shard<F>(&self, f: F) -> Result<(), LorikeetError>
    where
        F: Fn(&serenity::all::ShardMessenger),
    {
        let session = self.session.lock().await;
        let session = session.as_ref().ok_or(LorikeetError::NotConnected)?;
        let runners = session.shard_manager.runners.lock().await;
        for runner in runners.values() {
            f(&runner.runner_tx);
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for SerenityGateway {
    async fn connect(&self) -> Result<(), LorikeetError> {
        let shared = &self.shared;
        let mut session = shared.session.lock().await;
        if session.as_ref().is_some_and(Session::is_running) {
            tracing::debug!("Client already running.");
            return Ok(());
        }

        let data = Data::new(shared.config.clone(), shared.started, shared.bus.clone());
        let handler = GatewayEvents {
            shared: shared.clone(),
        };
        let mut client = setup::client(data, &shared.commands, &shared.interactions, handler).await?;

        // Fails fast on a bad token, before any gateway traffic.
        let me = client.http.get_current_user().await?;
        tracing::info!("Authenticated as {}.", me.name);

        shared.stopping.store(false, Ordering::SeqCst);
        let shard_manager = client.shard_manager.clone();
        let cache = client.cache.clone();
        let http = client.http.clone();

        let watcher = shared.clone();
        let task = tokio::spawn(async move {
            let reason = match client.start().await {
                Ok(()) => "client stopped".to_string(),
                Err(e) => e.to_string(),
            };
            if watcher.stopping.load(Ordering::SeqCst) {
                tracing::debug!("Client stopped on request.");
            } else {
                tracing::error!("Client stopped unexpectedly: {reason}");
                watcher.bus.publish(GatewayEvent::ConnectionLost { reason });
            }
        });

        *session = Some(Session {
            shard_manager,
            cache,
            http,
            task,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LorikeetError> {
        let Some(session) = self.shared.session.lock().await.take() else {
            return Ok(());
        };

        self.shared.stopping.store(true, Ordering::SeqCst);
        session.shard_manager.shutdown_all().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, session.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_error)) => Err(LorikeetError::SessionEnded {
                reason: join_error.to_string(),
            }),
            Err(_elapsed) => Err(LorikeetError::Timeout(SHUTDOWN_GRACE)),
        }
    }

    async fn set_activity(&self, activity: Option<ActivityData>) -> Result<(), LorikeetError> {
        self.shared
            .each_shard(|shard| shard.set_activity(activity.clone()))
            .await
    }

    async fn set_status(&self, status: OnlineStatus) -> Result<(), LorikeetError> {
        self.shared
            .each_shard(|shard| shard.set_status(status))
            .await
    }

    async fn register_commands(
        &self,
        scope: CommandScope,
        commands: Vec<CreateCommand>,
    ) -> Result<Vec<String>, LorikeetError> {
        let http = {
            let session = self.shared.session.lock().await;
            session
                .as_ref()
                .map(|s| s.http.clone())
                .ok_or(LorikeetError::NotConnected)?
        };

        let registered = match scope {
            CommandScope::Global => serenity::all::Command::set_global_commands(&http, commands).await?,
            CommandScope::Guild(guild) => guild.set_commands(&http, commands).await?,
        };
        Ok(registered.into_iter().map(|cmd| cmd.name).collect())
    }

    async fn state(&self) -> ConnectionState {
        self.shared.state().await
    }

    fn events(&self) -> &EventBus {
        &self.shared.bus
    }
}

/// Counts over `guilds` as cached right now. Guilds not in the cache only add to `guild_count`.
fn cached_summary(cache: &Cache, guilds: &[GuildId]) -> ReadySummary {
    let bot_name = cache.current_user().name.clone();
    let cached = guilds
        .iter()
        .filter_map(|id| cache.guild(*id).map(|g| (g.member_count, g.channels.len())));
    ReadySummary::from_guilds(bot_name, guilds.len(), cached)
}

/// Turns serenity events into [GatewayEvent]s and dispatches components.
struct GatewayEvents {
    shared: Arc<Shared>,
}

#[async_trait]
impl EventHandler for GatewayEvents {
    async fn ready(&self, _ctx: Context, rdy: Ready) {
        // Guilds arrive after ready, so the summary waits for `cache_ready` unless there are none.
        if rdy.guilds.is_empty() {
            let summary = ReadySummary::from_guilds(rdy.user.name.clone(), 0, std::iter::empty());
            self.shared.bus.publish(GatewayEvent::Ready(summary));
        }
    }

    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let summary = cached_summary(&ctx.cache, &guilds);
        self.shared.bus.publish(GatewayEvent::Ready(summary));
    }

    async fn shard_stage_update(&self, _ctx: Context, event: ShardStageUpdateEvent) {
        let shard = event.shard_id.0;
        match event.new {
            ConnectionStage::Connected => self.shared.bus.publish(GatewayEvent::Connected { shard }),
            ConnectionStage::Disconnected => {
                self.shared.bus.publish(GatewayEvent::Disconnected { shard })
            }
            _ => tracing::trace!("Shard {shard} is {:?}", event.new),
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new == Some(true) {
            self.shared.bus.publish(GatewayEvent::GuildJoined {
                id: guild.id,
                name: guild.name,
            });
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Unavailable means an outage, not that we were removed.
        if !incomplete.unavailable {
            self.shared.bus.publish(GatewayEvent::GuildLeft { id: incomplete.id });
        }
    }

    #[instrument(level = "debug", skip_all)]
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        // Commands are dispatched by poise.
        let Interaction::Component(component) = interaction else {
            return;
        };

        let values = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => values.clone(),
            _ => Vec::new(),
        };
        let call = ComponentCall {
            custom_id: component.data.custom_id.clone(),
            values,
            user: component.user.name.clone(),
            channel: component.channel_id,
            guild: component.guild_id,
            status: self.shared.snapshot().await,
        };
        let responder = ComponentResponder {
            http: ctx.http.clone(),
            interaction: &component,
            responded: AtomicBool::new(false),
        };

        let completion = self.shared.interactions.dispatch_component(call, &responder).await;
        self.shared.bus.publish(GatewayEvent::Completed(completion));
    }
}

/// Responds to a component interaction over http.
struct ComponentResponder<'a> {
    http: Arc<Http>,
    interaction: &'a ComponentInteraction,
    responded: AtomicBool,
}

#[async_trait]
impl Responder for ComponentResponder<'_> {
    fn has_responded(&self) -> bool {
        self.responded.load(Ordering::SeqCst)
    }

    async fn respond(&self, reply: ComponentReply) -> Result<(), LorikeetError> {
        let response = match reply {
            ComponentReply::Message {
                content,
                embed,
                ephemeral,
            } => {
                let mut message = CreateInteractionResponseMessage::new().ephemeral(ephemeral);
                if let Some(content) = content {
                    message = message.content(content);
                }
                if let Some(embed) = embed {
                    message = message.embed(embed.into());
                }
                CreateInteractionResponse::Message(message)
            }
            ComponentReply::Update {
                content,
                embed,
                keep_components,
            } => {
                let mut message = CreateInteractionResponseMessage::new()
                    .embeds(embed.into_iter().map(Into::into).collect());
                if let Some(content) = content {
                    message = message.content(content);
                }
                if !keep_components {
                    message = message.components(Vec::new());
                }
                CreateInteractionResponse::UpdateMessage(message)
            }
        };

        self.interaction.create_response(&self.http, response).await?;
        self.responded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn follow_up(&self, reply: ComponentReply) -> Result<(), LorikeetError> {
        match reply {
            ComponentReply::Message {
                content,
                embed,
                ephemeral,
            } => {
                let mut followup = CreateInteractionResponseFollowup::new().ephemeral(ephemeral);
                if let Some(content) = content {
                    followup = followup.content(content);
                }
                if let Some(embed) = embed {
                    followup = followup.embed(embed.into());
                }
                self.interaction.create_followup(&self.http, followup).await?;
            }
            ComponentReply::Update {
                content,
                embed,
                keep_components,
            } => {
                let mut edit =
                    EditInteractionResponse::new().embeds(embed.into_iter().map(Into::into).collect());
                if let Some(content) = content {
                    edit = edit.content(content);
                }
                if !keep_components {
                    edit = edit.components(Vec::new());
                }
                self.interaction.edit_response(&self.http, edit).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guilds_missing_from_the_cache_add_no_members_or_channels() {
        let cache = Cache::new();

        let summary = cached_summary(&cache, &[GuildId::new(42), GuildId::new(43)]);

        assert_eq!(summary.guild_count, 2);
        assert_eq!(summary.user_count, 0);
        assert_eq!(summary.channel_count, 0);
    }
}
