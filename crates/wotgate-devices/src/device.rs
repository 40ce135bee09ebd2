//! Device facade.
//!
//! [`WotDevice`] is the local device mirrored from one consumed thing. It is
//! built from a Thing Description in a fixed order (properties, actions,
//! events), tolerating per-interaction failures, and exposes the local
//! read/write/invoke surface plus a single idempotent teardown.

use crate::action::{ActionInvoker, ActionRequest};
use crate::adapter::{AdapterHandle, Notifier};
use crate::capability::CapabilityRegistry;
use crate::consumed::SharedThing;
use crate::error::{DeviceError, DeviceResult};
use crate::event::EventRelay;
use crate::ledger::SubscriptionLedger;
use crate::property::{PropertyHandle, PropertyMirror};
use crate::td::{ActionAffordance, EventAffordance, InteractionKind, ThingDescription};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Per-device settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Upper bound for one remote subscription cancel during teardown
    pub cancel_timeout: Duration,
    /// Finished action requests kept for inspection
    pub action_history: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            cancel_timeout: wotgate_core::config::cancel_timeout(),
            action_history: wotgate_core::config::env_vars::action_history(),
        }
    }
}

/// An interaction that could not be fully set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupFailure {
    pub kind: InteractionKind,
    pub name: String,
    pub reason: String,
}

/// Local device mirroring one remote thing.
pub struct WotDevice {
    id: String,
    title: Option<String>,
    properties: PropertyMirror,
    actions: ActionInvoker,
    events: EventRelay,
    ledger: SubscriptionLedger,
    notifier: Notifier,
    setup_failures: Vec<SetupFailure>,
    destroyed: AtomicBool,
}

impl WotDevice {
    /// Build a device with default settings.
    pub async fn new(
        adapter: &Arc<dyn AdapterHandle>,
        device_id: &str,
        td: ThingDescription,
        thing: SharedThing,
    ) -> Self {
        Self::with_config(adapter, device_id, td, thing, DeviceConfig::default()).await
    }

    /// Build a device.
    ///
    /// Never fails as a whole: a malformed affordance is skipped and a failed
    /// subscription leaves its interaction unobserved. Both are logged and
    /// listed in [`setup_failures`](Self::setup_failures).
    pub async fn with_config(
        adapter: &Arc<dyn AdapterHandle>,
        device_id: &str,
        td: ThingDescription,
        thing: SharedThing,
        config: DeviceConfig,
    ) -> Self {
        let notifier = Notifier::new(device_id, adapter);
        let ledger = SubscriptionLedger::new(device_id, config.cancel_timeout);
        let registry = CapabilityRegistry::from_td(&td);

        let mut setup_failures: Vec<SetupFailure> = registry
            .skipped()
            .iter()
            .filter_map(|e| {
                e.interaction().map(|(kind, name)| SetupFailure {
                    kind,
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect();

        let mut properties = PropertyMirror::new(Arc::clone(&thing), notifier.clone());
        for affordance in registry.properties() {
            let name = affordance.name.clone();
            if let Err(e) = properties.attach(affordance.clone(), &ledger).await {
                warn!(device_id = %device_id, property = %name, "Property left unobserved: {}", e);
                setup_failures.push(SetupFailure {
                    kind: InteractionKind::Property,
                    name,
                    reason: e.to_string(),
                });
            }
        }

        let mut actions =
            ActionInvoker::new(Arc::clone(&thing), notifier.clone(), config.action_history);
        for affordance in registry.actions() {
            actions.register(affordance.clone());
        }

        let mut events = EventRelay::new(Arc::clone(&thing), notifier.clone());
        for affordance in registry.events() {
            let name = affordance.name.clone();
            if let Err(e) = events.attach(affordance.clone(), &ledger).await {
                warn!(device_id = %device_id, event = %name, "Event not relayed: {}", e);
                setup_failures.push(SetupFailure {
                    kind: InteractionKind::Event,
                    name,
                    reason: e.to_string(),
                });
            }
        }

        info!(
            device_id = %device_id,
            properties = properties.len(),
            subscriptions = ledger.len(),
            failures = setup_failures.len(),
            "WoT device constructed"
        );

        Self {
            id: device_id.to_string(),
            title: td.title().map(str::to_string),
            properties,
            actions,
            events,
            ledger,
            notifier,
            setup_failures,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Forward a property write to the remote thing.
    pub async fn set_property(&self, name: &str, value: Value) -> DeviceResult<()> {
        self.ensure_alive()?;
        self.properties.set_property(name, value).await
    }

    /// Current value of a property (cached push value or live read).
    pub async fn get_property(&self, name: &str) -> DeviceResult<Value> {
        self.ensure_alive()?;
        self.properties.get_property(name).await
    }

    /// Invoke an action remotely, tracking it under `request_id`.
    pub async fn request_action(
        &self,
        request_id: impl Into<String>,
        name: &str,
        input: Option<Value>,
    ) -> DeviceResult<Option<Value>> {
        self.ensure_alive()?;
        self.actions.request_action(request_id, name, input).await
    }

    pub fn find_property(&self, name: &str) -> Option<Arc<PropertyHandle>> {
        self.properties.find(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &Arc<PropertyHandle>> {
        self.properties.properties()
    }

    pub fn find_action(&self, name: &str) -> Option<&ActionAffordance> {
        self.actions.find(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionAffordance> {
        self.actions.actions()
    }

    pub fn find_event(&self, name: &str) -> Option<&EventAffordance> {
        self.events.find(name)
    }

    pub fn events(&self) -> impl Iterator<Item = &EventAffordance> {
        self.events.events()
    }

    pub fn action_request(&self, request_id: &str) -> Option<ActionRequest> {
        self.actions.request(request_id)
    }

    pub fn action_requests(&self) -> Vec<ActionRequest> {
        self.actions.requests()
    }

    /// Number of open remote subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.ledger.len()
    }

    pub fn setup_failures(&self) -> &[SetupFailure] {
        &self.setup_failures
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Release every remote subscription and detach from the adapter.
    ///
    /// Only the first call does anything.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let released = self.ledger.release_all().await;
        info!(device_id = %self.id, released, "WoT device destroyed");
        self.notifier.detach();
    }

    fn ensure_alive(&self) -> DeviceResult<()> {
        if self.is_destroyed() {
            return Err(DeviceError::Destroyed(self.id.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WotDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WotDevice")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("properties", &self.properties.len())
            .field("subscriptions", &self.ledger.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
