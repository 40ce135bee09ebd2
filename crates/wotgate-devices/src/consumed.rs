//! Consumed-thing contract.
//!
//! The transport that actually talks to a remote thing (HTTP, CoAP, MQTT…)
//! lives outside this crate. It plugs in by implementing [`ConsumedThing`].

use crate::error::ThingResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half handed to the transport for push delivery.
///
/// The transport sends every observed value or event payload into the sink,
/// in the order it receives them. A closed sink means the device no longer
/// listens; the transport may then drop the remote subscription.
pub type ValueSink = mpsc::UnboundedSender<Value>;

/// Receiving half drained by the device.
pub type ValueStream = mpsc::UnboundedReceiver<Value>;

/// Shared consumed-thing handle.
pub type SharedThing = Arc<dyn ConsumedThing>;

/// Create a sink/stream pair for one subscription.
pub fn value_channel() -> (ValueSink, ValueStream) {
    mpsc::unbounded_channel()
}

/// Cancellation handle for one open remote subscription.
#[async_trait]
pub trait RemoteSubscription: Send + Sync {
    /// Stop the remote side from pushing further values.
    async fn cancel(&self) -> ThingResult<()>;
}

/// Remote access to one thing described by a TD.
#[async_trait]
pub trait ConsumedThing: Send + Sync {
    /// Read the current value of a property.
    async fn read_property(&self, name: &str) -> ThingResult<Value>;

    /// Write a property value.
    async fn write_property(&self, name: &str, value: Value) -> ThingResult<()>;

    /// Invoke an action and wait for its completion.
    ///
    /// Returns the action output, if the action declares one.
    async fn invoke_action(&self, name: &str, input: Option<Value>) -> ThingResult<Option<Value>>;

    /// Start pushing property changes into `sink`.
    async fn observe_property(
        &self,
        name: &str,
        sink: ValueSink,
    ) -> ThingResult<Box<dyn RemoteSubscription>>;

    /// Start pushing event payloads into `sink`.
    async fn subscribe_event(
        &self,
        name: &str,
        sink: ValueSink,
    ) -> ThingResult<Box<dyn RemoteSubscription>>;
}
