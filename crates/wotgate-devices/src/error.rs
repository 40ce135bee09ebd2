//! Error types for the WoT device bridge.

use crate::ledger::SubscriptionKind;
use crate::td::InteractionKind;
use thiserror::Error;

/// Result type for consumed-thing (transport) operations.
pub type ThingResult<T> = Result<T, ThingError>;

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failure reported by the remote-thing transport.
#[derive(Debug, Error)]
pub enum ThingError {
    /// Transport-level failure (connection, protocol, encoding)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation timeout
    #[error("Operation timeout after {0}ms")]
    Timeout(u64),

    /// The remote thing refused the operation
    #[error("Rejected by remote thing: {0}")]
    Rejected(String),

    /// Other error
    #[error("Thing error: {0}")]
    Other(#[from] anyhow::Error),
}

/// A Thing Description (or one affordance of it) is structurally invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The document as a whole cannot be used.
    #[error("Invalid thing description: {0}")]
    Document(String),

    /// A single affordance is malformed and was skipped.
    #[error("Invalid {kind} '{name}': {reason}")]
    Affordance {
        kind: InteractionKind,
        name: String,
        reason: String,
    },
}

impl SchemaError {
    /// Name of the offending affordance, if any.
    pub fn interaction(&self) -> Option<(InteractionKind, &str)> {
        match self {
            Self::Document(_) => None,
            Self::Affordance { kind, name, .. } => Some((*kind, name)),
        }
    }
}

/// Subscription ledger refusals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{kind} subscription for '{name}' is already registered")]
    Duplicate { kind: SubscriptionKind, name: String },

    #[error("Ledger has been released, {kind} subscription for '{name}' refused")]
    Released { kind: SubscriptionKind, name: String },
}

/// Error type for device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Property '{0}' is read-only")]
    ReadOnlyProperty(String),

    #[error("Property '{0}' is write-only")]
    WriteOnlyProperty(String),

    #[error("Failed to read property '{name}': {source}")]
    RemoteRead {
        name: String,
        #[source]
        source: ThingError,
    },

    #[error("Failed to write property '{name}': {source}")]
    RemoteWrite {
        name: String,
        #[source]
        source: ThingError,
    },

    #[error("Failed to invoke action '{name}': {source}")]
    Invoke {
        name: String,
        #[source]
        source: ThingError,
    },

    #[error("Failed to open {kind} subscription for '{name}': {source}")]
    Subscribe {
        kind: SubscriptionKind,
        name: String,
        #[source]
        source: ThingError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Device '{0}' has been destroyed")]
    Destroyed(String),
}

impl DeviceError {
    /// Whether the caller supplied a name the device does not know.
    pub fn is_unknown_name(&self) -> bool {
        matches!(self, Self::UnknownProperty(_) | Self::UnknownAction(_))
    }

    /// Whether the failure originated in the remote thing or its transport.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::RemoteRead { .. }
                | Self::RemoteWrite { .. }
                | Self::Invoke { .. }
                | Self::Subscribe { .. }
        )
    }
}
