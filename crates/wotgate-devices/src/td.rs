//! Thing Description model.
//!
//! A TD is accepted as JSON and kept mostly opaque. Only the three
//! interaction maps are inspected here; each affordance fragment is parsed
//! lazily by the capability registry so that one malformed affordance does
//! not invalidate the whole document.

use crate::error::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// The three interaction maps a TD can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    Property,
    Action,
    Event,
}

impl InteractionKind {
    /// Name of the TD member holding this kind of affordance.
    pub fn td_member(&self) -> &'static str {
        match self {
            Self::Property => "properties",
            Self::Action => "actions",
            Self::Event => "events",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property => write!(f, "property"),
            Self::Action => write!(f, "action"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// JSON schema primitive types allowed in a data schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Integer,
    Number,
    String,
    Object,
    Array,
    Null,
}

/// Data schema of a property value, action input/output or event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub write_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,
    /// Everything else the fragment carries, preserved untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataSchema {
    /// Check the structural constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_only && self.write_only {
            return Err("readOnly and writeOnly are both set".to_string());
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(format!("minimum {} exceeds maximum {}", min, max));
            }
        }
        Ok(())
    }
}

/// A TD property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAffordance {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub observable: bool,
    #[serde(flatten)]
    pub schema: DataSchema,
}

impl PropertyAffordance {
    /// Readable unless declared write-only.
    pub fn is_readable(&self) -> bool {
        !self.schema.write_only
    }

    /// Writable unless declared read-only.
    pub fn is_writable(&self) -> bool {
        !self.schema.read_only
    }

    /// Whether a push channel should be opened for this property.
    pub fn wants_observation(&self) -> bool {
        self.observable && self.is_readable()
    }
}

/// A TD action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAffordance {
    #[serde(skip)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<DataSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<DataSchema>,
    #[serde(default)]
    pub safe: bool,
    #[serde(default)]
    pub idempotent: bool,
}

impl ActionAffordance {
    fn validate(&self) -> Result<(), String> {
        if let Some(input) = &self.input {
            input.validate().map_err(|e| format!("input: {}", e))?;
        }
        if let Some(output) = &self.output {
            output.validate().map_err(|e| format!("output: {}", e))?;
        }
        Ok(())
    }
}

/// A TD event.
///
/// The payload schema is normally nested under `data`; a schema written
/// inline on the event itself is accepted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAffordance {
    #[serde(skip)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSchema>,
    #[serde(flatten)]
    pub inline: DataSchema,
}

impl EventAffordance {
    /// Schema of the event payload.
    pub fn payload_schema(&self) -> &DataSchema {
        self.data.as_ref().unwrap_or(&self.inline)
    }

    fn validate(&self) -> Result<(), String> {
        self.payload_schema().validate()
    }
}

/// A validated Thing Description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingDescription {
    id: Option<String>,
    title: Option<String>,
    properties: Map<String, Value>,
    actions: Map<String, Value>,
    events: Map<String, Value>,
}

impl ThingDescription {
    /// Accept a TD document.
    ///
    /// Fails only when the document itself is unusable: not an object, or an
    /// interaction member that is present but not an object.
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let Value::Object(mut doc) = value else {
            return Err(SchemaError::Document("expected a JSON object".to_string()));
        };

        let id = take_string(&mut doc, "id")?;
        let title = take_string(&mut doc, "title")?;
        let properties = take_map(&mut doc, InteractionKind::Property)?;
        let actions = take_map(&mut doc, InteractionKind::Action)?;
        let events = take_map(&mut doc, InteractionKind::Event)?;

        Ok(Self {
            id,
            title,
            properties,
            actions,
            events,
        })
    }

    /// Parse a TD from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| SchemaError::Document(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Raw affordance fragments of one kind, keyed by interaction name.
    pub fn interactions(&self, kind: InteractionKind) -> &Map<String, Value> {
        match kind {
            InteractionKind::Property => &self.properties,
            InteractionKind::Action => &self.actions,
            InteractionKind::Event => &self.events,
        }
    }

    /// Total number of declared affordances.
    pub fn interaction_count(&self) -> usize {
        self.properties.len() + self.actions.len() + self.events.len()
    }
}

impl TryFrom<Value> for ThingDescription {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn take_string(doc: &mut Map<String, Value>, key: &str) -> Result<Option<String>, SchemaError> {
    match doc.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(SchemaError::Document(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn take_map(
    doc: &mut Map<String, Value>,
    kind: InteractionKind,
) -> Result<Map<String, Value>, SchemaError> {
    match doc.remove(kind.td_member()) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(SchemaError::Document(format!(
            "'{}' must be an object",
            kind.td_member()
        ))),
    }
}

/// Parse one raw fragment into a typed affordance.
pub(crate) fn parse_property(name: &str, fragment: &Value) -> Result<PropertyAffordance, SchemaError> {
    let mut affordance: PropertyAffordance = parse_fragment(InteractionKind::Property, name, fragment)?;
    affordance
        .schema
        .validate()
        .map_err(|reason| affordance_error(InteractionKind::Property, name, reason))?;
    affordance.name = name.to_string();
    Ok(affordance)
}

pub(crate) fn parse_action(name: &str, fragment: &Value) -> Result<ActionAffordance, SchemaError> {
    let mut affordance: ActionAffordance = parse_fragment(InteractionKind::Action, name, fragment)?;
    affordance
        .validate()
        .map_err(|reason| affordance_error(InteractionKind::Action, name, reason))?;
    affordance.name = name.to_string();
    Ok(affordance)
}

pub(crate) fn parse_event(name: &str, fragment: &Value) -> Result<EventAffordance, SchemaError> {
    let mut affordance: EventAffordance = parse_fragment(InteractionKind::Event, name, fragment)?;
    affordance
        .validate()
        .map_err(|reason| affordance_error(InteractionKind::Event, name, reason))?;
    affordance.name = name.to_string();
    Ok(affordance)
}

fn parse_fragment<T: serde::de::DeserializeOwned>(
    kind: InteractionKind,
    name: &str,
    fragment: &Value,
) -> Result<T, SchemaError> {
    if !fragment.is_object() {
        return Err(affordance_error(kind, name, "expected a JSON object".to_string()));
    }
    T::deserialize(fragment).map_err(|e| affordance_error(kind, name, e.to_string()))
}

fn affordance_error(kind: InteractionKind, name: &str, reason: String) -> SchemaError {
    SchemaError::Affordance {
        kind,
        name: name.to_string(),
        reason,
    }
}
