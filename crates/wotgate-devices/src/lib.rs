//! Web of Things device bridge.
//!
//! Mirrors a remote WoT thing, described by its Thing Description and reached
//! through a [`ConsumedThing`] transport, into a local device owned by a
//! gateway adapter.
//!
//! ## Architecture
//!
//! - **CapabilityRegistry**: typed view of the TD's properties, actions and events
//! - **PropertyMirror**: local property handles, push-updated caches, write forwarding
//! - **ActionInvoker**: remote invocation with a per-request status record
//! - **EventRelay**: remote events re-emitted as device notifications
//! - **SubscriptionLedger**: every open remote subscription, released together
//! - **WotDevice**: the device facade composing the above
//! - **WotAdapter**: owns devices and fans out their notifications
//!
//! The transport is supplied by the host. [`mock::MockThing`] is an
//! in-memory implementation for tests and demos.

pub mod action;
pub mod adapter;
pub mod capability;
pub mod consumed;
pub mod device;
pub mod error;
pub mod event;
pub mod ledger;
pub mod mock;
pub mod property;
pub mod td;

pub use action::{ActionRequest, ActionStatus};
pub use adapter::{AdapterHandle, DeviceEvent, Notifier, WotAdapter, WotAdapterConfig};
pub use capability::{CapabilityRegistry, Interaction};
pub use consumed::{ConsumedThing, RemoteSubscription, SharedThing, ValueSink, ValueStream};
pub use device::{DeviceConfig, SetupFailure, WotDevice};
pub use error::{DeviceError, DeviceResult, LedgerError, SchemaError, ThingError, ThingResult};
pub use ledger::{Subscription, SubscriptionKind, SubscriptionLedger};
pub use property::PropertyHandle;
pub use td::{
    ActionAffordance, DataSchema, DataType, EventAffordance, InteractionKind, PropertyAffordance,
    ThingDescription,
};
