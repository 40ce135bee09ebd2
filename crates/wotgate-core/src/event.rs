//! Unified event types for the WoTGate event bus.
//!
//! Device adapters translate their local notifications into these events so
//! the rest of the gateway can react without knowing anything about the
//! remote protocol a device is bridged from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Gateway-wide event type.
///
/// Every event carries the id of the device it concerns and a unix
/// timestamp (seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GatewayEvent {
    /// A device was registered with its adapter
    DeviceAdded {
        device_id: String,
        adapter_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        timestamp: i64,
    },

    /// A device was torn down and detached from its adapter
    DeviceRemoved {
        device_id: String,
        adapter_id: String,
        timestamp: i64,
    },

    /// A mirrored property received a new value from the remote thing
    PropertyChanged {
        device_id: String,
        property: String,
        value: Value,
        timestamp: i64,
    },

    /// The remote thing emitted an event
    DeviceEvent {
        device_id: String,
        event: String,
        #[serde(default)]
        data: Value,
        timestamp: i64,
    },

    /// An action request changed state
    ActionStatus {
        device_id: String,
        request_id: String,
        action: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: i64,
    },
}

impl GatewayEvent {
    /// Get the event type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::DeviceAdded { .. } => "DeviceAdded",
            Self::DeviceRemoved { .. } => "DeviceRemoved",
            Self::PropertyChanged { .. } => "PropertyChanged",
            Self::DeviceEvent { .. } => "DeviceEvent",
            Self::ActionStatus { .. } => "ActionStatus",
        }
    }

    /// Get the id of the device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            Self::DeviceAdded { device_id, .. }
            | Self::DeviceRemoved { device_id, .. }
            | Self::PropertyChanged { device_id, .. }
            | Self::DeviceEvent { device_id, .. }
            | Self::ActionStatus { device_id, .. } => device_id,
        }
    }

    /// Get the event timestamp.
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::DeviceAdded { timestamp, .. }
            | Self::DeviceRemoved { timestamp, .. }
            | Self::PropertyChanged { timestamp, .. }
            | Self::DeviceEvent { timestamp, .. }
            | Self::ActionStatus { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_property_event(&self) -> bool {
        matches!(self, Self::PropertyChanged { .. })
    }

    pub fn is_device_event(&self) -> bool {
        matches!(self, Self::DeviceEvent { .. })
    }

    pub fn is_action_event(&self) -> bool {
        matches!(self, Self::ActionStatus { .. })
    }
}

impl fmt::Display for GatewayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.device_id())
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub event_id: String,
    /// Optional correlation ID (e.g. an action request id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Event source (component that published)
    pub source: String,
    /// Event timestamp
    pub timestamp: i64,
}

impl EventMetadata {
    /// Create new event metadata.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            correlation_id: None,
            source: source.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Create with a specific correlation ID.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_accessors() {
        let event = GatewayEvent::PropertyChanged {
            device_id: "lamp".to_string(),
            property: "on".to_string(),
            value: json!(true),
            timestamp: 42,
        };

        assert_eq!(event.type_name(), "PropertyChanged");
        assert_eq!(event.device_id(), "lamp");
        assert_eq!(event.timestamp(), 42);
        assert!(event.is_property_event());
        assert!(!event.is_action_event());
        assert_eq!(event.to_string(), "PropertyChanged(lamp)");
    }

    #[test]
    fn test_event_serde_tag() {
        let event = GatewayEvent::DeviceEvent {
            device_id: "door".to_string(),
            event: "opened".to_string(),
            data: json!({"angle": 90}),
            timestamp: 0,
        };

        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["type"], "DeviceEvent");
        assert_eq!(encoded["data"]["angle"], 90);

        let decoded: GatewayEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_metadata_correlation() {
        let meta = EventMetadata::new("adapter:wot").with_correlation_id("req-1");
        assert_eq!(meta.source, "adapter:wot");
        assert_eq!(meta.correlation_id.as_deref(), Some("req-1"));
        assert!(!meta.event_id.is_empty());
    }
}
