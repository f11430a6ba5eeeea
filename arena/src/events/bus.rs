//! Broadcast bus for battle events.
//!
//! Tokio broadcast-based pub/sub. Publishing never fails the operation
//! that produced the event: with no subscribers the event is simply
//! dropped.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::ArenaEvent;

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to an event bus.
pub type SharedEventBus = Arc<EventBus>;

/// Event bus over a tokio broadcast channel.
pub struct EventBus {
    sender: broadcast::Sender<ArenaEvent>,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus.
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. No receivers is fine.
    pub fn publish(&self, event: ArenaEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<ArenaEvent> {
        self.sender.subscribe()
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
