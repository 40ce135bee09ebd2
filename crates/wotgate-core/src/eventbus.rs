//! Event bus for the WoTGate event-driven architecture.
//!
//! Device adapters publish onto the bus; anything interested in device
//! activity (rules, storage, UI bridges) subscribes to it.

use crate::event::{EventMetadata, GatewayEvent};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Event bus for the gateway.
///
/// Events are distributed to every subscriber over a broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    /// Broadcast channel sender
    tx: broadcast::Sender<(GatewayEvent, EventMetadata)>,
    /// Event bus name for identification
    name: String,
}

impl EventBus {
    /// Create a new event bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new event bus with the specified capacity.
    ///
    /// The capacity determines how many events are buffered for slow subscribers.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            name: "default".to_string(),
        }
    }

    /// Create a new event bus with a name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::new()
        }
    }

    /// Get the name of this event bus.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event. Usable from synchronous notification paths.
    ///
    /// Returns `true` if there was at least one subscriber.
    pub fn publish_now(&self, event: GatewayEvent, metadata: EventMetadata) -> bool {
        self.tx.send((event, metadata)).is_ok()
    }

    /// Subscribe to all events.
    ///
    /// If the subscriber falls behind, older events may be dropped.
    pub fn subscribe(&self) -> EventBusReceiver {
        EventBusReceiver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver for all events from the event bus.
pub struct EventBusReceiver {
    rx: broadcast::Receiver<(GatewayEvent, EventMetadata)>,
}

impl EventBusReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the event bus is closed.
    pub async fn recv(&mut self) -> Option<(GatewayEvent, EventMetadata)> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                // Missed some events, keep reading from the oldest retained one
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<(GatewayEvent, EventMetadata)> {
        self.rx.try_recv().ok()
    }
}

/// Shared event bus handle.
pub type SharedEventBus = Arc<EventBus>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn property_changed(device_id: &str) -> GatewayEvent {
        GatewayEvent::PropertyChanged {
            device_id: device_id.to_string(),
            property: "temperature".to_string(),
            value: json!(21.5),
            timestamp: 0,
        }
    }

    fn removed(device_id: &str) -> GatewayEvent {
        GatewayEvent::DeviceRemoved {
            device_id: device_id.to_string(),
            adapter_id: "wot".to_string(),
            timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(bus.publish_now(property_changed("sensor"), EventMetadata::new("system")));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.0.type_name(), "PropertyChanged");
        assert_eq!(received.1.source, "system");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::with_name("empty");
        assert_eq!(bus.name(), "empty");
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!bus.publish_now(property_changed("sensor"), EventMetadata::new("system")));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish_now(removed("lamp"), EventMetadata::new("adapter:wot"));

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert_eq!(received1.0, received2.0);
        assert_eq!(received1.1.source, "adapter:wot");
    }

    #[tokio::test]
    async fn test_shared_event_bus() {
        let bus: SharedEventBus = Arc::new(EventBus::new());
        let bus_clone = Arc::clone(&bus);
        let mut rx = bus.subscribe();

        tokio::spawn(async move {
            bus_clone.publish_now(property_changed("test"), EventMetadata::new("system"));
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.0.device_id(), "test");
    }

    #[test]
    fn test_publish_now_with_metadata() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        let meta = EventMetadata::new("adapter:wot").with_correlation_id("req-9");
        assert!(bus.publish_now(removed("lamp"), meta));

        let (_, meta) = rx.try_recv().unwrap();
        assert_eq!(meta.correlation_id.as_deref(), Some("req-9"));
        assert!(rx.try_recv().is_none());
    }
}
