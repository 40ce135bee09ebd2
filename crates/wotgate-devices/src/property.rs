//! Property mirror.
//!
//! Each TD property gets a local [`PropertyHandle`]. Readable observable
//! properties are kept in sync through a remote observation whose values are
//! pumped into the handle's cache; every other read goes to the remote thing.
//! Local writes are forwarded and never touch the cache, so the cache only
//! ever reflects values the remote thing reported.

use crate::adapter::Notifier;
use crate::consumed::{SharedThing, value_channel};
use crate::error::{DeviceError, DeviceResult};
use crate::ledger::{Subscription, SubscriptionKind, SubscriptionLedger};
use crate::td::{DataSchema, PropertyAffordance};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct PropertyState {
    value: Option<Value>,
    observed: bool,
    updates: u64,
}

/// Local mirror of one remote property.
#[derive(Debug)]
pub struct PropertyHandle {
    affordance: PropertyAffordance,
    state: RwLock<PropertyState>,
}

impl PropertyHandle {
    pub fn new(affordance: PropertyAffordance) -> Self {
        Self {
            affordance,
            state: RwLock::new(PropertyState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.affordance.name
    }

    pub fn schema(&self) -> &DataSchema {
        &self.affordance.schema
    }

    pub fn affordance(&self) -> &PropertyAffordance {
        &self.affordance
    }

    pub fn is_readable(&self) -> bool {
        self.affordance.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.affordance.is_writable()
    }

    /// Whether a push channel is active for this property.
    pub fn is_observed(&self) -> bool {
        self.state.read().observed
    }

    /// Last value pushed by the remote thing.
    pub fn cached_value(&self) -> Option<Value> {
        self.state.read().value.clone()
    }

    /// Number of pushed values applied so far.
    pub fn update_count(&self) -> u64 {
        self.state.read().updates
    }

    fn mark_observed(&self) {
        self.state.write().observed = true;
    }

    fn apply_push(&self, value: Value) {
        let mut state = self.state.write();
        state.value = Some(value);
        state.updates += 1;
    }

    /// Cached value, but only while a push channel has delivered one.
    fn live_cached_value(&self) -> Option<Value> {
        let state = self.state.read();
        if state.observed { state.value.clone() } else { None }
    }
}

/// Owns every property handle of a device.
pub struct PropertyMirror {
    thing: SharedThing,
    notifier: Notifier,
    properties: BTreeMap<String, Arc<PropertyHandle>>,
}

impl PropertyMirror {
    pub fn new(thing: SharedThing, notifier: Notifier) -> Self {
        Self {
            thing,
            notifier,
            properties: BTreeMap::new(),
        }
    }

    /// Register a property and, if it is observable and readable, open its
    /// push channel.
    ///
    /// The handle is registered even when observation fails; the error is
    /// returned so the caller can record the degraded interaction.
    pub async fn attach(
        &mut self,
        affordance: PropertyAffordance,
        ledger: &SubscriptionLedger,
    ) -> DeviceResult<()> {
        let observe = affordance.wants_observation();
        let handle = Arc::new(PropertyHandle::new(affordance));
        self.properties
            .insert(handle.name().to_string(), Arc::clone(&handle));

        if observe {
            self.observe(handle, ledger).await?;
        }
        Ok(())
    }

    async fn observe(
        &self,
        handle: Arc<PropertyHandle>,
        ledger: &SubscriptionLedger,
    ) -> DeviceResult<()> {
        let name = handle.name().to_string();
        let (sink, mut values) = value_channel();
        let remote = self
            .thing
            .observe_property(&name, sink)
            .await
            .map_err(|source| DeviceError::Subscribe {
                kind: SubscriptionKind::PropertyObserve,
                name: name.clone(),
                source,
            })?;

        let pump_handle = Arc::clone(&handle);
        let notifier = self.notifier.clone();
        let pump = tokio::spawn(async move {
            while let Some(value) = values.recv().await {
                pump_handle.apply_push(value.clone());
                notifier.property_changed(pump_handle.name(), value);
            }
        });

        ledger
            .register(
                Subscription::new(SubscriptionKind::PropertyObserve, name.clone(), remote)
                    .with_pump(pump.abort_handle()),
            )
            .await?;
        handle.mark_observed();

        debug!(device_id = %self.notifier.device_id(), property = %name, "Observing property");
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<PropertyHandle>> {
        self.properties.get(name).cloned()
    }

    pub fn properties(&self) -> impl Iterator<Item = &Arc<PropertyHandle>> {
        self.properties.values()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Forward a local write to the remote thing.
    ///
    /// The cache is left alone; it changes only when the remote thing pushes
    /// the new value back.
    pub async fn set_property(&self, name: &str, value: Value) -> DeviceResult<()> {
        let handle = self
            .properties
            .get(name)
            .ok_or_else(|| DeviceError::UnknownProperty(name.to_string()))?;
        if !handle.is_writable() {
            return Err(DeviceError::ReadOnlyProperty(name.to_string()));
        }

        debug!(device_id = %self.notifier.device_id(), property = %name, "Writing property");
        self.thing
            .write_property(name, value)
            .await
            .map_err(|source| DeviceError::RemoteWrite {
                name: name.to_string(),
                source,
            })
    }

    /// Current value of a property.
    ///
    /// Served from the cache once the push channel delivered a value,
    /// otherwise read from the remote thing. Write-only properties are
    /// rejected without a remote call.
    pub async fn get_property(&self, name: &str) -> DeviceResult<Value> {
        let handle = self
            .properties
            .get(name)
            .ok_or_else(|| DeviceError::UnknownProperty(name.to_string()))?;
        if !handle.is_readable() {
            return Err(DeviceError::WriteOnlyProperty(name.to_string()));
        }

        if let Some(value) = handle.live_cached_value() {
            return Ok(value);
        }

        debug!(device_id = %self.notifier.device_id(), property = %name, "Reading property");
        self.thing
            .read_property(name)
            .await
            .map_err(|source| DeviceError::RemoteRead {
                name: name.to_string(),
                source,
            })
    }
}
