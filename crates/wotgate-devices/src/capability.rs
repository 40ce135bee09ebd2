//! Capability registry.
//!
//! Turns the raw interaction maps of a [`ThingDescription`] into typed
//! affordances, keyed by (kind, name). Malformed fragments are skipped and
//! remembered; they never prevent the rest of the device from being built.

use crate::error::SchemaError;
use crate::td::{
    ActionAffordance, EventAffordance, InteractionKind, PropertyAffordance, ThingDescription,
    parse_action, parse_event, parse_property,
};
use std::collections::BTreeMap;
use tracing::warn;

/// One resolved interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Property(PropertyAffordance),
    Action(ActionAffordance),
    Event(EventAffordance),
}

impl Interaction {
    pub fn kind(&self) -> InteractionKind {
        match self {
            Self::Property(_) => InteractionKind::Property,
            Self::Action(_) => InteractionKind::Action,
            Self::Event(_) => InteractionKind::Event,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Property(p) => &p.name,
            Self::Action(a) => &a.name,
            Self::Event(e) => &e.name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    interactions: BTreeMap<(InteractionKind, String), Interaction>,
    skipped: Vec<SchemaError>,
}

impl CapabilityRegistry {
    /// Build the registry for a TD.
    pub fn from_td(td: &ThingDescription) -> Self {
        let mut registry = Self::default();

        for kind in [
            InteractionKind::Property,
            InteractionKind::Action,
            InteractionKind::Event,
        ] {
            for (name, fragment) in td.interactions(kind) {
                let parsed = match kind {
                    InteractionKind::Property => parse_property(name, fragment).map(Interaction::Property),
                    InteractionKind::Action => parse_action(name, fragment).map(Interaction::Action),
                    InteractionKind::Event => parse_event(name, fragment).map(Interaction::Event),
                };

                match parsed {
                    Ok(interaction) => {
                        registry.interactions.insert((kind, name.clone()), interaction);
                    }
                    Err(e) => {
                        warn!(thing = td.id().unwrap_or("<anonymous>"), "Skipping affordance: {}", e);
                        registry.skipped.push(e);
                    }
                }
            }
        }

        registry
    }

    /// Look up an interaction by kind and name.
    pub fn resolve(&self, kind: InteractionKind, name: &str) -> Option<&Interaction> {
        self.interactions.get(&(kind, name.to_string()))
    }

    pub fn property(&self, name: &str) -> Option<&PropertyAffordance> {
        match self.resolve(InteractionKind::Property, name) {
            Some(Interaction::Property(p)) => Some(p),
            _ => None,
        }
    }

    pub fn action(&self, name: &str) -> Option<&ActionAffordance> {
        match self.resolve(InteractionKind::Action, name) {
            Some(Interaction::Action(a)) => Some(a),
            _ => None,
        }
    }

    pub fn event(&self, name: &str) -> Option<&EventAffordance> {
        match self.resolve(InteractionKind::Event, name) {
            Some(Interaction::Event(e)) => Some(e),
            _ => None,
        }
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyAffordance> {
        self.interactions.values().filter_map(|i| match i {
            Interaction::Property(p) => Some(p),
            _ => None,
        })
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionAffordance> {
        self.interactions.values().filter_map(|i| match i {
            Interaction::Action(a) => Some(a),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &EventAffordance> {
        self.interactions.values().filter_map(|i| match i {
            Interaction::Event(e) => Some(e),
            _ => None,
        })
    }

    /// Fragments that failed validation.
    pub fn skipped(&self) -> &[SchemaError] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}
