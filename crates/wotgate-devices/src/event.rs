//! Event relay: re-emits remote event payloads as local device events.

use crate::adapter::Notifier;
use crate::consumed::{SharedThing, value_channel};
use crate::error::{DeviceError, DeviceResult};
use crate::ledger::{Subscription, SubscriptionKind, SubscriptionLedger};
use crate::td::EventAffordance;
use std::collections::BTreeMap;
use tracing::debug;

pub struct EventRelay {
    thing: SharedThing,
    notifier: Notifier,
    events: BTreeMap<String, EventAffordance>,
}

impl EventRelay {
    pub fn new(thing: SharedThing, notifier: Notifier) -> Self {
        Self {
            thing,
            notifier,
            events: BTreeMap::new(),
        }
    }

    /// Register an event and subscribe to it once.
    ///
    /// The descriptor stays registered if the subscription fails; the error
    /// is returned for the caller to record.
    pub async fn attach(
        &mut self,
        affordance: EventAffordance,
        ledger: &SubscriptionLedger,
    ) -> DeviceResult<()> {
        let name = affordance.name.clone();
        self.events.insert(name.clone(), affordance);

        let (sink, mut payloads) = value_channel();
        let remote = self
            .thing
            .subscribe_event(&name, sink)
            .await
            .map_err(|source| DeviceError::Subscribe {
                kind: SubscriptionKind::EventSubscribe,
                name: name.clone(),
                source,
            })?;

        let notifier = self.notifier.clone();
        let event_name = name.clone();
        let pump = tokio::spawn(async move {
            while let Some(data) = payloads.recv().await {
                notifier.event(&event_name, data);
            }
        });

        ledger
            .register(
                Subscription::new(SubscriptionKind::EventSubscribe, name.clone(), remote)
                    .with_pump(pump.abort_handle()),
            )
            .await?;

        debug!(device_id = %self.notifier.device_id(), event = %name, "Subscribed to event");
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&EventAffordance> {
        self.events.get(name)
    }

    pub fn events(&self) -> impl Iterator<Item = &EventAffordance> {
        self.events.values()
    }
}
