//! This module contains everything relating to [Data].

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use crate::bot::events::Completion;
use crate::bot::events::EventBus;
use crate::bot::events::GatewayEvent;
use crate::Config;

/// Data shared with every command through the framework.
#[derive(Debug, Clone)]
pub struct Data {
    /// Settings read at startup.
    pub config: Arc<Config>,
    /// When the process started, for uptime.
    pub started: Instant,
    /// Where command completions get published.
    pub events: EventBus,
}

impl Data {
    pub fn new(config: Arc<Config>, started: Instant, events: EventBus) -> Self {
        Self {
            config,
            started,
            events,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn publish_completion(&self, completion: Completion) {
        self.events.publish(GatewayEvent::Completed(completion));
    }
}
