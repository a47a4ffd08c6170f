//! Bot lifecycle: starting, stopping, presence and reacting to the connection.

pub mod client;
pub mod events;
pub mod gateway;
pub mod presence;

use std::sync::Arc;
use std::time::Duration;

use serenity::all::ActivityData;
use serenity::all::OnlineStatus;
use tokio::sync::Mutex;

use crate::commands;
use crate::handlers::CommandHandler;
use crate::handlers::InteractionHandler;
use crate::Config;
use crate::LorikeetError;
use events::GatewayEvent;
use events::ReadySummary;
use events::Subscription;
use gateway::Gateway;

/// Wait before the single reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Owns the gateway connection. Start and stop never interleave.
pub struct Bot<G: Gateway> {
    lifecycle: Lifecycle<G>,
}

/// Everything the lifecycle event handler needs, cheap to clone into it.
struct Lifecycle<G: Gateway> {
    gateway: Arc<G>,
    config: Arc<Config>,
    commands: Arc<CommandHandler>,
    interactions: Arc<InteractionHandler>,
    /// Serializes start, stop and reconnects. Holds the lifecycle subscription while running.
    lock: Arc<Mutex<Option<Subscription>>>,
}

impl<G: Gateway> Clone for Lifecycle<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            config: self.config.clone(),
            commands: self.commands.clone(),
            interactions: self.interactions.clone(),
            lock: self.lock.clone(),
        }
    }
}

impl<G: Gateway> Bot<G> {
    pub fn new(
        gateway: Arc<G>,
        config: Arc<Config>,
        commands: Arc<CommandHandler>,
        interactions: Arc<InteractionHandler>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle {
                gateway,
                config,
                commands,
                interactions,
                lock: Arc::new(Mutex::new(None)),
            },
        }
    }

    /// Initialize the handlers and connect. Errors if authentication fails.
    pub async fn start(&self) -> Result<(), LorikeetError> {
        let this = &self.lifecycle;
        let mut subscription = this.lock.lock().await;

        if this.gateway.state().await.connected {
            tracing::warn!("Start requested but the bot is already connected.");
            return Ok(());
        }

        tracing::info!("Starting bot.");
        *subscription = Some(this.subscribe());
        let events = this.gateway.events();
        let init = futures::try_join!(
            this.commands.initialize(events),
            this.interactions.initialize(events)
        );

        if let Err(e) = async { init?; this.gateway.connect().await }.await {
            subscription.take();
            this.commands.shutdown().await;
            this.interactions.shutdown().await;
            return Err(e);
        }
        tracing::info!("Connected to the gateway.");
        Ok(())
    }

    /// Unsubscribe everything, go offline and disconnect.
    pub async fn stop(&self) -> Result<(), LorikeetError> {
        let this = &self.lifecycle;
        let mut subscription = this.lock.lock().await;

        if !this.gateway.state().await.connected {
            tracing::warn!("Stop requested but the bot is not connected.");
            return Ok(());
        }

        tracing::info!("Stopping bot.");
        subscription.take();
        this.commands.shutdown().await;
        this.interactions.shutdown().await;

        if let Err(e) = this.gateway.set_status(OnlineStatus::Offline).await {
            tracing::warn!("Failed to go offline before disconnecting. {e}");
        }
        this.gateway.disconnect().await?;
        tracing::info!("Disconnected from the gateway.");
        Ok(())
    }

    /// Update the activity and status. Does nothing while disconnected.
    #[allow(dead_code)]
    pub async fn set_activity(
        &self,
        activity: Option<ActivityData>,
        status: OnlineStatus,
    ) -> Result<(), LorikeetError> {
        self.lifecycle.set_activity(activity, status).await
    }

    pub async fn is_connected(&self) -> bool {
        self.lifecycle.gateway.state().await.connected
    }
}

impl<G: Gateway> Lifecycle<G> {
    fn subscribe(&self) -> Subscription {
        let this = self.clone();
        self.gateway.events().subscribe("lifecycle", move |event| {
            let this = this.clone();
            async move { this.on_event(event).await }
        })
    }

    async fn on_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready(summary) => self.on_ready(summary).await,
            GatewayEvent::Connected { shard } => tracing::info!("Shard {shard} connected."),
            GatewayEvent::Disconnected { shard } => tracing::warn!("Shard {shard} disconnected."),
            GatewayEvent::ConnectionLost { reason } => self.on_connection_lost(&reason).await,
            GatewayEvent::GuildJoined { id, name } => tracing::info!("Joined guild {name} ({id})."),
            GatewayEvent::GuildLeft { id } => tracing::info!("Left guild {id}."),
            GatewayEvent::Completed(_) => {}
        }
    }

    async fn set_activity(
        &self,
        activity: Option<ActivityData>,
        status: OnlineStatus,
    ) -> Result<(), LorikeetError> {
        if !self.gateway.state().await.connected {
            tracing::warn!("Can't set activity while disconnected.");
            return Ok(());
        }
        let shown = activity
            .as_ref()
            .map(|a| (presence::ActivityKind::from_serenity(a.kind), a.name.clone()));
        self.gateway.set_activity(activity).await?;
        self.gateway.set_status(status).await?;
        tracing::debug!(
            "Presence set to {:?} with activity {shown:?}.",
            presence::Status::from_serenity(status)
        );
        Ok(())
    }

    async fn on_ready(&self, summary: ReadySummary) {
        let activity = &self.config.activity;
        let data = presence::activity_data(activity.kind, &activity.name, activity.stream_url.as_deref());
        if let Err(e) = self.set_activity(Some(data), activity.status.to_serenity()).await {
            tracing::error!("Failed to set activity. {e}");
        }

        if let Err(e) = self.interactions.register_commands(self.gateway.as_ref()).await {
            tracing::error!("Failed to register commands. {e}");
        }

        let prefix_commands = self.commands.descriptors();
        let interactions = self.interactions.descriptors().await;
        let modules = commands::module_count(&commands::descriptors(&commands::list()));
        tracing::info!(
            guilds = summary.guild_count,
            users = summary.user_count,
            channels = summary.channel_count,
            modules,
            prefix_commands = prefix_commands.len(),
            interactions = interactions.len(),
            "{} is ready!",
            summary.bot_name
        );
    }

    /// Reconnect once after [RECONNECT_DELAY] if enabled. No further retries.
    async fn on_connection_lost(&self, reason: &str) {
        if !self.config.features.auto_reconnect {
            tracing::warn!("Connection lost ({reason}), auto reconnect is disabled.");
            return;
        }

        tracing::warn!(
            "Connection lost ({reason}), reconnecting in {}s.",
            RECONNECT_DELAY.as_secs()
        );
        tokio::time::sleep(RECONNECT_DELAY).await;

        let _guard = self.lock.lock().await;
        if self.gateway.state().await.connected {
            tracing::debug!("Already reconnected.");
            return;
        }
        match self.gateway.connect().await {
            Ok(()) => tracing::info!("Reconnected to the gateway."),
            Err(e) => tracing::error!("Reconnect failed, staying disconnected. {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::gateway::mock::MockGateway;
    use crate::bot::gateway::CommandScope;

    fn bot_with(gateway: MockGateway, edit: impl FnOnce(&mut Config)) -> (Bot<MockGateway>, Arc<MockGateway>) {
        let mut config = Config::default();
        config.discord.token = "t".to_string();
        edit(&mut config);
        let config = Arc::new(config);
        let gateway = Arc::new(gateway);
        let bot = Bot::new(
            gateway.clone(),
            config.clone(),
            Arc::new(CommandHandler::new(config.clone())),
            Arc::new(InteractionHandler::new(config)),
        );
        (bot, gateway)
    }

    /// Give spawned subscription tasks a chance to run.
    async fn settle() {
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn ready() -> GatewayEvent {
        GatewayEvent::Ready(ReadySummary {
            bot_name: "lorikeet".to_string(),
            guild_count: 2,
            user_count: 10,
            channel_count: 5,
        })
    }

    #[tokio::test]
    async fn start_connects_once() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});

        bot.start().await.unwrap();

        assert!(bot.is_connected().await);
        assert_eq!(gateway.connect_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_connect_exactly_once() {
        let (bot, gateway) = bot_with(MockGateway::with_connect_delay(Duration::from_millis(50)), |_| {});

        let (a, b, c) = tokio::join!(bot.start(), bot.start(), bot.start());

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(gateway.connect_count(), 1);
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});

        bot.start().await.unwrap();
        bot.start().await.unwrap();

        assert_eq!(gateway.connect_count(), 1);
    }

    #[tokio::test]
    async fn failed_authentication_propagates() {
        let gateway = MockGateway::new();
        gateway.fail_connects(true);
        let (bot, gateway) = bot_with(gateway, |_| {});

        let result = bot.start().await;

        assert!(matches!(result, Err(LorikeetError::Serenity(_))));
        assert!(!bot.is_connected().await);
        settle().await;
        assert_eq!(gateway.events().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stop_goes_offline_and_disconnects() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});
        bot.start().await.unwrap();

        bot.stop().await.unwrap();
        settle().await;

        assert!(!bot.is_connected().await);
        assert_eq!(gateway.disconnect_count(), 1);
        assert_eq!(gateway.status_calls(), vec![OnlineStatus::Offline]);
        assert_eq!(gateway.events().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn stop_while_disconnected_is_a_no_op() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});

        bot.stop().await.unwrap();

        assert_eq!(gateway.disconnect_count(), 0);
        assert!(gateway.status_calls().is_empty());
    }

    #[tokio::test]
    async fn set_activity_needs_a_connection() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});

        bot.set_activity(Some(ActivityData::playing("x")), OnlineStatus::Idle)
            .await
            .unwrap();
        assert!(gateway.activity_calls().is_empty());

        bot.start().await.unwrap();
        bot.set_activity(Some(ActivityData::playing("x")), OnlineStatus::Idle)
            .await
            .unwrap();
        assert_eq!(gateway.activity_calls().len(), 1);
        assert_eq!(gateway.status_calls(), vec![OnlineStatus::Idle]);
    }

    #[tokio::test]
    async fn ready_sets_activity_and_registers_commands() {
        let (bot, gateway) = bot_with(MockGateway::new(), |c| {
            c.activity.name = "the sky".to_string();
        });
        bot.start().await.unwrap();

        gateway.events().publish(ready());
        settle().await;

        let activities = gateway.activity_calls();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].as_ref().map(|a| a.name.as_str()), Some("the sky"));
        assert_eq!(gateway.status_calls(), vec![OnlineStatus::Online]);
        let registrations = gateway.registration_calls();
        assert_eq!(registrations.len(), 1);
        assert_eq!(registrations[0].0, CommandScope::Global);
    }

    #[tokio::test]
    async fn ready_skips_registration_when_slash_commands_are_disabled() {
        let (bot, gateway) = bot_with(MockGateway::new(), |c| c.features.slash_commands = false);
        bot.start().await.unwrap();

        gateway.events().publish(ready());
        settle().await;

        assert!(gateway.registration_calls().is_empty());
        assert_eq!(gateway.activity_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_connection_is_retried_once_after_the_delay() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});
        bot.start().await.unwrap();

        gateway.lose_connection();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(gateway.connect_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(gateway.connect_count(), 2);
        assert!(bot.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnect_is_not_retried() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});
        bot.start().await.unwrap();

        gateway.fail_connects(true);
        gateway.lose_connection();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(gateway.connect_count(), 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(gateway.connect_count(), 2);
        assert!(!bot.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn no_reconnect_when_disabled() {
        let (bot, gateway) = bot_with(MockGateway::new(), |c| c.features.auto_reconnect = false);
        bot.start().await.unwrap();

        gateway.lose_connection();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(gateway.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_restart_cancels_a_pending_reconnect() {
        let (bot, gateway) = bot_with(MockGateway::new(), |_| {});
        bot.start().await.unwrap();

        gateway.lose_connection();
        tokio::time::sleep(Duration::from_secs(1)).await;
        bot.start().await.unwrap();
        bot.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(gateway.connect_count(), 2);
        assert!(!bot.is_connected().await);
    }
}
