//! Gateway events fanned out to the bot's components.
//!
//! The serenity event handler and the command hooks publish onto an [EventBus]. Components listen
//! through [EventBus::subscribe], which hands back a [Subscription]; dropping it unsubscribes.

use std::future::Future;

use serenity::all::ChannelId;
use serenity::all::GuildId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Events buffered per subscriber before it starts lagging.
const CAPACITY: usize = 64;

/// Counts logged when the bot becomes ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySummary {
    pub bot_name: String,
    pub guild_count: usize,
    pub user_count: usize,
    pub channel_count: usize,
}

impl ReadySummary {
    /// Totals the `(members, channels)` of every guild found in the cache.
    pub fn from_guilds(
        bot_name: String,
        guild_count: usize,
        cached: impl IntoIterator<Item = (u64, usize)>,
    ) -> Self {
        let (user_count, channel_count) = cached
            .into_iter()
            .fold((0, 0), |(users, channels), (m, c)| (users + m as usize, channels + c));
        Self {
            bot_name,
            guild_count,
            user_count,
            channel_count,
        }
    }
}

/// How a command or component was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    Prefix,
    Slash,
    ContextMenu,
    Component,
}

impl InvocationKind {
    pub fn is_interaction(self) -> bool {
        !matches!(self, Self::Prefix)
    }
}

/// A finished command or component invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub kind: InvocationKind,
    pub name: String,
    pub user: String,
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    /// `Err` holds the failure reason.
    pub outcome: Result<(), String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready(ReadySummary),
    /// A shard finished connecting.
    Connected { shard: u32 },
    /// A shard dropped its connection. Serenity reconnects shards by itself.
    Disconnected { shard: u32 },
    /// The client stopped without being asked to.
    ConnectionLost { reason: String },
    GuildJoined { id: GuildId, name: String },
    GuildLeft { id: GuildId },
    Completed(Completion),
}

/// Broadcasts [GatewayEvent]s. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Send `event` to every live subscription. Having none is fine.
    pub fn publish(&self, event: GatewayEvent) {
        tracing::trace!("Publishing {event:?}");
        let _ = self.tx.send(event);
    }

    /// Run `handler` on every event published from now on, until the [Subscription] is dropped.
    /// Events are handled one at a time, in order.
    pub fn subscribe<F, Fut>(&self, name: &'static str, handler: F) -> Subscription
    where
        F: Fn(GatewayEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Subscription '{name}' missed {missed} events.")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        tracing::debug!("Subscribed '{name}' to gateway events.");
        Subscription { name, task }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Handle to a running subscription. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    task: JoinHandle<()>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!("Unsubscribing '{}' from gateway events.", self.name);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn ready_summary_totals_cached_guilds() {
        let summary = ReadySummary::from_guilds("lorikeet".to_string(), 3, [(10, 4), (25, 7)]);

        assert_eq!(
            summary,
            ReadySummary {
                bot_name: "lorikeet".to_string(),
                guild_count: 3,
                user_count: 35,
                channel_count: 11,
            }
        );
    }

    #[tokio::test]
    async fn subscriber_sees_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = bus.subscribe("test", move |event| {
            let sink = sink.clone();
            async move { sink.lock().await.push(event) }
        });

        bus.publish(GatewayEvent::Connected { shard: 0 });
        bus.publish(GatewayEvent::Disconnected { shard: 0 });
        settle().await;

        assert_eq!(
            *seen.lock().await,
            vec![
                GatewayEvent::Connected { shard: 0 },
                GatewayEvent::Disconnected { shard: 0 }
            ]
        );
    }

    #[tokio::test]
    async fn dropping_the_subscription_unsubscribes() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0usize));

        let sink = seen.clone();
        let sub = bus.subscribe("test", move |_| {
            let sink = sink.clone();
            async move { *sink.lock().await += 1 }
        });
        bus.publish(GatewayEvent::Connected { shard: 0 });
        settle().await;
        drop(sub);
        settle().await;

        bus.publish(GatewayEvent::Connected { shard: 0 });
        settle().await;

        assert_eq!(*seen.lock().await, 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_cancels_a_handler_in_progress() {
        let bus = EventBus::new();
        let finished = Arc::new(Mutex::new(false));

        let flag = finished.clone();
        let sub = bus.subscribe("slow", move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                *flag.lock().await = true;
            }
        });
        bus.publish(GatewayEvent::ConnectionLost {
            reason: "test".to_string(),
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(sub);
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(!*finished.lock().await);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        EventBus::new().publish(GatewayEvent::GuildLeft {
            id: GuildId::new(1),
        });
    }
}
