//! Core types shared across the WoTGate workspace.
//!
//! This crate holds the ambient pieces every other crate builds on: the
//! gateway event type and its broadcast bus, configuration defaults, and
//! tracing initialisation.

pub mod config;
pub mod event;
pub mod eventbus;
pub mod logging;

// Event exports
pub use event::{EventMetadata, GatewayEvent};

// Event bus exports
pub use eventbus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, SharedEventBus};
