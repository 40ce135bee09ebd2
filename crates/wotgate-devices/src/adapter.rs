//! Adapter side of the device bridge.
//!
//! A [`WotAdapter`] owns the devices it mirrored from remote things. Devices
//! talk back to it only through the [`AdapterHandle`] trait, holding a weak
//! reference, so an adapter can be dropped or unloaded while devices still
//! have pump tasks in flight.

use crate::action::ActionRequest;
use crate::consumed::SharedThing;
use crate::device::{DeviceConfig, WotDevice};
use crate::td::ThingDescription;
use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use wotgate_core::config::{device as device_defaults, env_vars};
use wotgate_core::{EventMetadata, GatewayEvent, SharedEventBus};

/// Local notification emitted by a mirrored device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Device registered with the adapter
    Added {
        device_id: String,
        title: Option<String>,
        timestamp: i64,
    },

    /// Device torn down and detached
    Removed { device_id: String, timestamp: i64 },

    /// A pushed property value was applied to the local cache
    PropertyChanged {
        device_id: String,
        property: String,
        value: Value,
        timestamp: i64,
    },

    /// The remote thing emitted an event
    Event {
        device_id: String,
        event: String,
        data: Value,
        timestamp: i64,
    },

    /// An action request changed state
    ActionStatus {
        device_id: String,
        request: ActionRequest,
    },
}

impl DeviceEvent {
    /// Get the device ID for this event.
    pub fn device_id(&self) -> &str {
        match self {
            Self::Added { device_id, .. }
            | Self::Removed { device_id, .. }
            | Self::PropertyChanged { device_id, .. }
            | Self::Event { device_id, .. }
            | Self::ActionStatus { device_id, .. } => device_id,
        }
    }

    /// Get the timestamp for this event.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Added { timestamp, .. }
            | Self::Removed { timestamp, .. }
            | Self::PropertyChanged { timestamp, .. }
            | Self::Event { timestamp, .. } => *timestamp,
            Self::ActionStatus { request, .. } => request
                .time_completed
                .unwrap_or(request.time_requested)
                .timestamp(),
        }
    }

    /// Convert to the gateway-wide event type.
    pub fn to_gateway_event(self, adapter_id: &str) -> GatewayEvent {
        match self {
            Self::Added {
                device_id,
                title,
                timestamp,
            } => GatewayEvent::DeviceAdded {
                device_id,
                adapter_id: adapter_id.to_string(),
                title,
                timestamp,
            },
            Self::Removed {
                device_id,
                timestamp,
            } => GatewayEvent::DeviceRemoved {
                device_id,
                adapter_id: adapter_id.to_string(),
                timestamp,
            },
            Self::PropertyChanged {
                device_id,
                property,
                value,
                timestamp,
            } => GatewayEvent::PropertyChanged {
                device_id,
                property,
                value,
                timestamp,
            },
            Self::Event {
                device_id,
                event,
                data,
                timestamp,
            } => GatewayEvent::DeviceEvent {
                device_id,
                event,
                data,
                timestamp,
            },
            Self::ActionStatus { device_id, request } => {
                let timestamp = request
                    .time_completed
                    .unwrap_or(request.time_requested)
                    .timestamp();
                GatewayEvent::ActionStatus {
                    device_id,
                    request_id: request.id,
                    action: request.name,
                    status: request.status.to_string(),
                    error: request.error,
                    timestamp,
                }
            }
        }
    }
}

/// What a device needs from the adapter that owns it.
pub trait AdapterHandle: Send + Sync {
    /// Identifier of the owning adapter.
    fn adapter_id(&self) -> &str;

    /// Deliver a device notification.
    fn notify(&self, event: DeviceEvent);

    /// The device finished its teardown and must be forgotten.
    fn device_removed(&self, device_id: &str);
}

/// Per-device notification helper.
///
/// Holds only a weak reference to the adapter; notifications emitted after
/// the adapter is gone are dropped.
#[derive(Clone)]
pub struct Notifier {
    device_id: Arc<str>,
    adapter: Weak<dyn AdapterHandle>,
}

impl Notifier {
    pub fn new(device_id: &str, adapter: &Arc<dyn AdapterHandle>) -> Self {
        Self {
            device_id: Arc::from(device_id),
            adapter: Arc::downgrade(adapter),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn property_changed(&self, property: &str, value: Value) {
        self.send(DeviceEvent::PropertyChanged {
            device_id: self.device_id.to_string(),
            property: property.to_string(),
            value,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    pub fn event(&self, event: &str, data: Value) {
        self.send(DeviceEvent::Event {
            device_id: self.device_id.to_string(),
            event: event.to_string(),
            data,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    pub fn action_status(&self, request: ActionRequest) {
        self.send(DeviceEvent::ActionStatus {
            device_id: self.device_id.to_string(),
            request,
        });
    }

    /// Tell the adapter this device is gone.
    pub fn detach(&self) {
        if let Some(adapter) = self.adapter.upgrade() {
            adapter.device_removed(&self.device_id);
        }
    }

    fn send(&self, event: DeviceEvent) {
        match self.adapter.upgrade() {
            Some(adapter) => adapter.notify(event),
            None => debug!(device_id = %self.device_id, "Adapter gone, notification dropped"),
        }
    }
}

fn default_adapter_id() -> String {
    device_defaults::DEFAULT_ADAPTER_ID.to_string()
}

fn default_cancel_timeout_ms() -> u64 {
    env_vars::cancel_timeout_ms()
}

fn default_event_channel_capacity() -> usize {
    env_vars::event_channel_capacity()
}

fn default_action_history() -> usize {
    env_vars::action_history()
}

/// WoT adapter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WotAdapterConfig {
    /// Adapter identifier
    #[serde(default = "default_adapter_id")]
    pub id: String,
    /// Upper bound for one remote subscription cancel, in milliseconds
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
    /// Notifications buffered for slow subscribers
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Finished action requests kept per device
    #[serde(default = "default_action_history")]
    pub action_history: usize,
}

impl Default for WotAdapterConfig {
    fn default() -> Self {
        Self {
            id: default_adapter_id(),
            cancel_timeout_ms: default_cancel_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            action_history: default_action_history(),
        }
    }
}

impl WotAdapterConfig {
    /// Create a configuration with defaults for everything but the id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the cancel timeout.
    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the notification channel capacity.
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    /// Set how many finished action requests each device keeps.
    pub fn with_action_history(mut self, history: usize) -> Self {
        self.action_history = history;
        self
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    /// Per-device settings derived from this configuration.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            cancel_timeout: self.cancel_timeout(),
            action_history: self.action_history,
        }
    }
}

/// Adapter owning the devices mirrored from consumed things.
pub struct WotAdapter {
    config: WotAdapterConfig,
    devices: DashMap<String, Arc<WotDevice>>,
    event_tx: broadcast::Sender<DeviceEvent>,
    event_bus: Option<SharedEventBus>,
}

impl WotAdapter {
    /// Create a new adapter.
    ///
    /// When an event bus is given, every device notification is also
    /// published there as a [`GatewayEvent`].
    pub fn new(config: WotAdapterConfig, event_bus: Option<SharedEventBus>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Arc::new(Self {
            config,
            devices: DashMap::new(),
            event_tx,
            event_bus,
        })
    }

    pub fn config(&self) -> &WotAdapterConfig {
        &self.config
    }

    /// Mirror a consumed thing as a local device.
    ///
    /// `Added` is announced before the device's interactions are wired, so
    /// it precedes anything the device relays. A device already registered
    /// under `device_id` is destroyed and replaced, including one registered
    /// by a concurrent call while this one was being built.
    pub async fn add_device(
        self: &Arc<Self>,
        device_id: &str,
        td: ThingDescription,
        thing: SharedThing,
    ) -> Arc<WotDevice> {
        if let Some(previous) = self.get_device(device_id) {
            info!(adapter = %self.config.id, device_id = %device_id, "Replacing existing device");
            previous.destroy().await;
        }

        self.notify(DeviceEvent::Added {
            device_id: device_id.to_string(),
            title: td.title().map(str::to_string),
            timestamp: chrono::Utc::now().timestamp(),
        });

        let handle: Arc<dyn AdapterHandle> = self.clone();
        let device = Arc::new(
            WotDevice::with_config(&handle, device_id, td, thing, self.config.device_config()).await,
        );

        if let Some(displaced) = self.devices.insert(device_id.to_string(), Arc::clone(&device)) {
            if !displaced.is_destroyed() {
                warn!(
                    adapter = %self.config.id,
                    device_id = %device_id,
                    "Concurrent add displaced a live device, destroying it"
                );
                displaced.destroy().await;
            }
        }

        info!(
            adapter = %self.config.id,
            device_id = %device_id,
            subscriptions = device.subscription_count(),
            "Device added"
        );
        device
    }

    /// Destroy and forget a device. Returns `false` if it was not registered.
    pub async fn remove_device(&self, device_id: &str) -> bool {
        match self.get_device(device_id) {
            Some(device) => {
                device.destroy().await;
                true
            }
            None => false,
        }
    }

    pub fn get_device(&self, device_id: &str) -> Option<Arc<WotDevice>> {
        self.devices.get(device_id).map(|d| Arc::clone(d.value()))
    }

    pub fn list_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|d| d.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Destroy every device. Returns how many were torn down.
    pub async fn unload(&self) -> usize {
        let devices: Vec<Arc<WotDevice>> =
            self.devices.iter().map(|d| Arc::clone(d.value())).collect();
        let count = devices.len();
        for device in devices {
            device.destroy().await;
        }
        info!(adapter = %self.config.id, count, "Adapter unloaded");
        count
    }

    /// Subscribe to device notifications as a stream.
    pub fn subscribe(&self) -> Pin<Box<dyn Stream<Item = DeviceEvent> + Send + '_>> {
        let rx = self.event_tx.subscribe();
        Box::pin(async_stream::stream! {
            let mut rx = rx;
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Subscribe to device notifications on the raw broadcast channel.
    pub fn subscribe_receiver(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }
}

impl AdapterHandle for WotAdapter {
    fn adapter_id(&self) -> &str {
        &self.config.id
    }

    fn notify(&self, event: DeviceEvent) {
        let _ = self.event_tx.send(event.clone());

        if let Some(bus) = &self.event_bus {
            let mut metadata = EventMetadata::new(format!("adapter:{}", self.config.id));
            if let DeviceEvent::ActionStatus { request, .. } = &event {
                metadata = metadata.with_correlation_id(request.id.clone());
            }
            bus.publish_now(event.to_gateway_event(&self.config.id), metadata);
        }
    }

    fn device_removed(&self, device_id: &str) {
        // Only the destroyed instance; a replacement may already be registered.
        let removed = self
            .devices
            .remove_if(device_id, |_, device| device.is_destroyed())
            .is_some();
        if !removed {
            debug!(adapter = %self.config.id, device_id = %device_id, "Destroyed device was not registered");
            return;
        }

        info!(adapter = %self.config.id, device_id = %device_id, "Device removed");
        self.notify(DeviceEvent::Removed {
            device_id: device_id.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionStatus;
    use serde_json::json;

    #[test]
    fn test_config_builder() {
        let config = WotAdapterConfig::new("lab")
            .with_cancel_timeout(Duration::from_millis(250))
            .with_event_channel_capacity(16);

        assert_eq!(config.id, "lab");
        assert_eq!(config.cancel_timeout(), Duration::from_millis(250));
        assert_eq!(config.device_config().cancel_timeout, Duration::from_millis(250));
        assert_eq!(config.event_channel_capacity, 16);
        assert_eq!(config.with_action_history(5).device_config().action_history, 5);
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: WotAdapterConfig = serde_json::from_value(json!({"id": "lab"})).unwrap();
        assert_eq!(config.id, "lab");
        assert!(config.cancel_timeout_ms > 0);
        assert!(config.event_channel_capacity > 0);
    }

    #[test]
    fn test_device_event_to_gateway() {
        let event = DeviceEvent::PropertyChanged {
            device_id: "lamp".to_string(),
            property: "on".to_string(),
            value: json!(true),
            timestamp: 7,
        };
        assert_eq!(event.device_id(), "lamp");
        assert_eq!(event.timestamp(), 7);

        let gateway = event.to_gateway_event("wot");
        assert!(matches!(gateway, GatewayEvent::PropertyChanged { .. }));

        let removed = DeviceEvent::Removed {
            device_id: "lamp".to_string(),
            timestamp: 0,
        }
        .to_gateway_event("wot");
        assert!(matches!(
            removed,
            GatewayEvent::DeviceRemoved { ref adapter_id, .. } if adapter_id == "wot"
        ));
    }

    #[test]
    fn test_action_status_to_gateway() {
        let request: ActionRequest = serde_json::from_value(json!({
            "id": "req-1",
            "name": "fade",
            "status": "failed",
            "error": "timeout",
            "time_requested": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(request.status, ActionStatus::Failed);

        let gateway = DeviceEvent::ActionStatus {
            device_id: "lamp".to_string(),
            request,
        }
        .to_gateway_event("wot");

        match gateway {
            GatewayEvent::ActionStatus {
                request_id,
                status,
                error,
                ..
            } => {
                assert_eq!(request_id, "req-1");
                assert_eq!(status, "failed");
                assert_eq!(error.as_deref(), Some("timeout"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_notifier_without_adapter_drops_events() {
        let adapter: Arc<dyn AdapterHandle> = WotAdapter::new(WotAdapterConfig::default(), None);
        let notifier = Notifier::new("ghost", &adapter);
        drop(adapter);

        notifier.property_changed("on", json!(true));
        notifier.detach();
        assert_eq!(notifier.device_id(), "ghost");
    }
}
