//! Slash commands, context menus and message components.
//!
//! Slash and context menu commands are dispatched by poise, this handler decides which of them are
//! loaded and registers them with discord. Buttons and select menus are dispatched here.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::ChannelId;
use serenity::all::GuildId;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::instrument;

use super::invoke;
use super::invoke::Notice;
use super::invoke::Surface;
use crate::bot::events::Completion;
use crate::bot::events::EventBus;
use crate::bot::events::GatewayEvent;
use crate::bot::events::InvocationKind;
use crate::bot::events::Subscription;
use crate::bot::gateway::CommandScope;
use crate::bot::gateway::Gateway;
use crate::commands;
use crate::commands::format::Embed;
use crate::commands::format::StatusSnapshot;
use crate::commands::Command;
use crate::Config;
use crate::LorikeetError;

/// Shown when a component's handler is gone, e.g. a button from before interactions were disabled.
pub const UNKNOWN_COMPONENT: &str = "This component is no longer available.";

/// A button press or menu selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentCall {
    /// `namespace:action`, the namespace picks the handler.
    pub custom_id: String,
    /// Selected values, empty for buttons.
    pub values: Vec<String>,
    pub user: String,
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    /// Bot status at the time of the call.
    pub status: StatusSnapshot,
}

impl ComponentCall {
    pub fn namespace(&self) -> &str {
        self.custom_id
            .split_once(':')
            .map_or(self.custom_id.as_str(), |(ns, _)| ns)
    }

    pub fn action(&self) -> &str {
        self.custom_id.split_once(':').map_or("", |(_, action)| action)
    }
}

/// A response to a component.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentReply {
    /// A new message.
    Message {
        content: Option<String>,
        embed: Option<Embed>,
        ephemeral: bool,
    },
    /// Edit the message the component is attached to. `embed` replaces its embeds, `None` clears them.
    Update {
        content: Option<String>,
        embed: Option<Embed>,
        keep_components: bool,
    },
}

impl ComponentReply {
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self::Message {
            content: Some(content.into()),
            embed: None,
            ephemeral: true,
        }
    }
}

/// Sends responses for a single component interaction.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Was the initial response already sent?
    fn has_responded(&self) -> bool;
    /// The initial response.
    async fn respond(&self, reply: ComponentReply) -> Result<(), LorikeetError>;
    /// Any response after the initial one.
    async fn follow_up(&self, reply: ComponentReply) -> Result<(), LorikeetError>;
}

/// Handles every component whose id starts with [ComponentHandler::namespace].
#[async_trait]
pub trait ComponentHandler: Send + Sync {
    fn namespace(&self) -> &'static str;
    /// Module the component belongs to, for listings.
    fn module(&self) -> &'static str;
    async fn handle(&self, call: &ComponentCall, responder: &dyn Responder) -> Result<(), LorikeetError>;
}

/// Read-only view of something users can interact with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub module: String,
    pub kind: InvocationKind,
}

/// Loads and registers interaction commands, dispatches components.
pub struct InteractionHandler {
    config: Arc<Config>,
    active: AtomicBool,
    components: RwLock<Vec<Arc<dyn ComponentHandler>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl InteractionHandler {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            active: AtomicBool::new(false),
            components: RwLock::new(Vec::new()),
            subscription: Mutex::new(None),
        }
    }

    /// Load interaction modules and start logging completions.
    /// Does nothing when slash commands are disabled.
    pub async fn initialize(&self, events: &EventBus) -> Result<(), LorikeetError> {
        if !self.config.features.slash_commands {
            tracing::debug!("Slash commands disabled, not loading interactions.");
            return Ok(());
        }

        let components = if self.config.features.components_enabled() {
            commands::components(&self.config)
        } else {
            tracing::debug!("Interactions disabled, not loading components.");
            Vec::new()
        };
        let slash = self.slash_commands();
        tracing::info!(
            "Loaded {} interaction commands and {} component handlers.",
            slash.len(),
            components.len()
        );
        *self.components.write().await = components;

        let log_interactions = self.config.features.command_logging;
        let subscription = events.subscribe("interaction-completions", move |event| async move {
            if let GatewayEvent::Completed(completion) = event {
                if completion.kind.is_interaction() {
                    log_completion(&completion, log_interactions);
                }
            }
        });
        *self.subscription.lock().await = Some(subscription);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Unsubscribe and drop loaded handlers.
    pub async fn shutdown(&self) {
        self.subscription.lock().await.take();
        self.components.write().await.clear();
        self.active.store(false, Ordering::SeqCst);
    }

    /// Commands that can be invoked as slash commands or context menus.
    pub fn slash_commands(&self) -> Vec<Command> {
        commands::list()
            .into_iter()
            .filter(|cmd| cmd.slash_action.is_some() || cmd.context_menu_action.is_some())
            .collect()
    }

    /// Register slash commands on the configured guild, or globally without one.
    /// Does nothing when slash commands are disabled.
    pub async fn register_commands<G>(&self, gateway: &G) -> Result<(), LorikeetError>
    where
        G: Gateway + ?Sized,
    {
        if !self.config.features.slash_commands {
            tracing::info!("Slash commands disabled, skipping command registration.");
            return Ok(());
        }

        let app_commands = poise::builtins::create_application_commands(&self.slash_commands());
        let scope = match self.config.guild_id() {
            Some(guild) => {
                tracing::info!("Registering commands on guild {guild}.");
                CommandScope::Guild(guild)
            }
            None => {
                tracing::info!("Registering commands globally, this may take up to an hour to show up.");
                CommandScope::Global
            }
        };

        let names = gateway.register_commands(scope, app_commands).await?;
        tracing::info!("Registered the following commands: {names:?}");
        Ok(())
    }

    /// Every slash command, context menu and component this handler has loaded.
    pub async fn descriptors(&self) -> Vec<InteractionDescriptor> {
        if !self.is_active() {
            return Vec::new();
        }

        let mut out: Vec<InteractionDescriptor> = self
            .slash_commands()
            .iter()
            .map(|cmd| InteractionDescriptor {
                name: cmd.context_menu_name.clone().unwrap_or_else(|| cmd.name.clone()),
                description: cmd.description.clone(),
                module: cmd.category.clone().unwrap_or_default(),
                kind: if cmd.slash_action.is_some() {
                    InvocationKind::Slash
                } else {
                    InvocationKind::ContextMenu
                },
            })
            .collect();

        for component in self.components.read().await.iter() {
            out.push(InteractionDescriptor {
                name: component.namespace().to_string(),
                description: None,
                module: component.module().to_string(),
                kind: InvocationKind::Component,
            });
        }
        out
    }

    /// Run the handler for `call` under the command timeout. Never fails, failures become a notice
    /// to the user and are reported in the returned [Completion].
    #[instrument(skip_all, fields(custom_id = %call.custom_id, user = %call.user))]
    pub async fn dispatch_component(&self, call: ComponentCall, responder: &dyn Responder) -> Completion {
        let handler = {
            let components = self.components.read().await;
            components
                .iter()
                .find(|c| c.namespace() == call.namespace())
                .cloned()
        };

        let outcome = match handler {
            Some(handler) => {
                let limit = self.config.command_timeout();
                invoke::run_bounded(limit, handler.handle(&call, responder)).await
            }
            None => {
                tracing::debug!("No handler for component {}", call.custom_id);
                send_reply(responder, ComponentReply::ephemeral(UNKNOWN_COMPONENT)).await;
                Ok(())
            }
        };

        if let Err(error) = &outcome {
            let surface = Surface::Interaction {
                responded: responder.has_responded(),
            };
            if let Some(notice) = invoke::notice_for(surface, error) {
                send_notice(responder, notice).await;
            }
        }

        Completion {
            kind: InvocationKind::Component,
            name: call.custom_id,
            user: call.user,
            channel: call.channel,
            guild: call.guild,
            outcome: outcome.map_err(|e| e.to_string()),
        }
    }
}

/// Send the initial response, or a follow-up if one was already sent. Failures are only logged.
async fn send_reply(responder: &dyn Responder, reply: ComponentReply) {
    let result = if responder.has_responded() {
        responder.follow_up(reply).await
    } else {
        responder.respond(reply).await
    };
    if let Err(e) = result {
        tracing::error!("Failed to respond to component. {e}");
    }
}

async fn send_notice(responder: &dyn Responder, notice: Notice) {
    let (reply, follow_up) = match notice {
        Notice::Ephemeral { content, follow_up } => (ComponentReply::ephemeral(content), follow_up),
        Notice::ChannelText(content) => (
            ComponentReply::Message {
                content: Some(content),
                embed: None,
                ephemeral: false,
            },
            responder.has_responded(),
        ),
        Notice::ChannelEmbed(embed) => (
            ComponentReply::Message {
                content: None,
                embed: Some(embed),
                ephemeral: false,
            },
            responder.has_responded(),
        ),
    };

    let result = if follow_up {
        responder.follow_up(reply).await
    } else {
        responder.respond(reply).await
    };
    if let Err(e) = result {
        tracing::error!("Failed to send error notice. {e}");
    }
}

/// Log a finished interaction.
pub fn log_completion(completion: &Completion, log_success: bool) {
    let Completion {
        kind,
        name,
        user,
        channel,
        guild,
        outcome,
    } = completion;
    let guild = guild.map_or("DM".to_string(), |g| g.to_string());

    match outcome {
        Ok(()) if log_success => {
            tracing::info!("{kind:?} '{name}' by {user} in channel {channel} (guild {guild}) succeeded.")
        }
        Ok(()) => {}
        Err(reason) => {
            tracing::warn!("{kind:?} '{name}' by {user} in channel {channel} (guild {guild}) failed: {reason}")
        }
    }
}
