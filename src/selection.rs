//! Selector trees for choosing devices, sensors and streams.
//!
//! Selectors are built with explicit functions rather than comparison
//! operators:
//!
//! ```
//! use tempoiq_client::selection::{and, device, equals, or, sensor};
//!
//! let selector = or([
//!     and([equals(device::key(), "foo"), equals(sensor::attribute("baz"), "boz")]),
//!     and([equals(device::key(), "bar"), equals(sensor::attribute("foo"), "bar")]),
//! ]);
//! # let _ = selector;
//! ```
//!
//! The same tree evaluates locally against [`StreamHeader`]s (used to bind
//! streams of a read response) and encodes to the API's JSON selection shape
//! (used by searches, deletes and monitoring rules).

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};
use crate::types::{Device, Sensor, StreamHeader};

/// Which object a scalar selector constrains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Target {
    /// Device key, name or attributes.
    Devices,
    /// Sensor key, name or attributes.
    Sensors,
    /// Per-stream properties such as the derived function.
    Streams,
}

impl Target {
    fn as_str(self) -> &'static str {
        match self {
            Target::Devices => "devices",
            Target::Sensors => "sensors",
            Target::Streams => "streams",
        }
    }
}

/// Field of the target being compared.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// Object key.
    Key,
    /// Object name.
    Name,
    /// One entry of the attribute map.
    Attribute(String),
    /// Derived function name (streams only).
    Function,
}

/// A target/field pair, the left-hand side of an equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    /// Object being constrained.
    pub target: Target,
    /// Field compared on that object.
    pub field: Field,
}

/// Paths into device fields.
pub mod device {
    use super::{Field, FieldPath, Target};

    /// `device.key`
    pub fn key() -> FieldPath {
        FieldPath { target: Target::Devices, field: Field::Key }
    }

    /// `device.name`
    pub fn name() -> FieldPath {
        FieldPath { target: Target::Devices, field: Field::Name }
    }

    /// `device.attributes[key]`
    pub fn attribute(key: impl Into<String>) -> FieldPath {
        FieldPath { target: Target::Devices, field: Field::Attribute(key.into()) }
    }
}

/// Paths into sensor fields.
pub mod sensor {
    use super::{Field, FieldPath, Target};

    /// `sensor.key`
    pub fn key() -> FieldPath {
        FieldPath { target: Target::Sensors, field: Field::Key }
    }

    /// `sensor.name`
    pub fn name() -> FieldPath {
        FieldPath { target: Target::Sensors, field: Field::Name }
    }

    /// `sensor.attributes[key]`
    pub fn attribute(key: impl Into<String>) -> FieldPath {
        FieldPath { target: Target::Sensors, field: Field::Attribute(key.into()) }
    }
}

/// Paths into stream fields.
pub mod stream {
    use super::{Field, FieldPath, Target};

    /// `stream.function`
    pub fn function() -> FieldPath {
        FieldPath { target: Target::Streams, field: Field::Function }
    }
}

/// A single equality constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScalarSelector {
    /// Field being compared.
    pub path: FieldPath,
    /// Expected value.
    pub value: String,
}

impl ScalarSelector {
    fn matches(&self, header: &StreamHeader) -> bool {
        match (self.path.target, &self.path.field) {
            (Target::Devices, field) => device_field_matches(&header.device, field, &self.value),
            (Target::Sensors, field) => sensor_field_matches(&header.sensor, field, &self.value),
            (Target::Streams, Field::Function) => {
                header.function.as_deref() == Some(self.value.as_str())
            }
            (Target::Streams, _) => false,
        }
    }
}

fn device_field_matches(device: &Device, field: &Field, expected: &str) -> bool {
    match field {
        Field::Key => device.key == expected,
        Field::Name => device.name == expected,
        Field::Attribute(key) => device.attributes.get(key).is_some_and(|v| v == expected),
        Field::Function => false,
    }
}

fn sensor_field_matches(sensor: &Sensor, field: &Field, expected: &str) -> bool {
    match field {
        Field::Key => sensor.key == expected,
        Field::Name => sensor.name == expected,
        Field::Attribute(key) => sensor.attributes.get(key).is_some_and(|v| v == expected),
        Field::Function => false,
    }
}

/// A selector tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    /// One equality constraint.
    Scalar(ScalarSelector),
    /// All children must match. Empty matches everything.
    And(Vec<Selector>),
    /// At least one child must match. Empty matches nothing.
    Or(Vec<Selector>),
}

/// Build an equality constraint.
pub fn equals(path: FieldPath, value: impl Into<String>) -> Selector {
    Selector::Scalar(ScalarSelector { path, value: value.into() })
}

/// Build a conjunction.
pub fn and(selectors: impl IntoIterator<Item = Selector>) -> Selector {
    Selector::And(selectors.into_iter().collect())
}

/// Build a disjunction.
pub fn or(selectors: impl IntoIterator<Item = Selector>) -> Selector {
    Selector::Or(selectors.into_iter().collect())
}

impl Selector {
    /// Evaluate the tree against one stream header.
    pub fn matches(&self, header: &StreamHeader) -> bool {
        match self {
            Selector::Scalar(s) => s.matches(header),
            Selector::And(children) => children.iter().all(|c| c.matches(header)),
            Selector::Or(children) => children.iter().any(|c| c.matches(header)),
        }
    }

    /// The single target every scalar in the tree constrains.
    ///
    /// Returns `None` for an empty tree or one mixing targets.
    pub fn target(&self) -> Option<Target> {
        match self {
            Selector::Scalar(s) => Some(s.path.target),
            Selector::And(children) | Selector::Or(children) => {
                let mut targets = children.iter().map(Selector::target);
                let first = targets.next()??;
                targets.all(|t| t == Some(first)).then_some(first)
            }
        }
    }

    /// Decode the API's JSON selection shape.
    ///
    /// The wire format does not name the target on each scalar; it is
    /// implied by where the selection sits (`devices` or `sensors`).
    pub fn from_json(json: &Json, target: Target) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| parse_error(json, target))?;
        if object.len() != 1 {
            return Err(parse_error(json, target));
        }
        let Some((name, inner)) = object.iter().next() else {
            return Err(parse_error(json, target));
        };
        match name.as_str() {
            "and" | "or" => {
                let children = inner
                    .as_array()
                    .ok_or_else(|| parse_error(json, target))?
                    .iter()
                    .map(|child| Selector::from_json(child, target))
                    .collect::<Result<Vec<_>>>()?;
                Ok(if name == "and" {
                    Selector::And(children)
                } else {
                    Selector::Or(children)
                })
            }
            "attributes" => {
                let attrs = inner.as_object().ok_or_else(|| parse_error(json, target))?;
                let mut scalars = attrs
                    .iter()
                    .map(|(key, value)| {
                        let value = value.as_str().ok_or_else(|| parse_error(json, target))?;
                        Ok(equals(
                            FieldPath { target, field: Field::Attribute(key.clone()) },
                            value,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                if scalars.len() == 1 {
                    Ok(scalars.remove(0))
                } else {
                    Ok(Selector::And(scalars))
                }
            }
            field => {
                let field = match field {
                    "key" => Field::Key,
                    "name" => Field::Name,
                    "function" => Field::Function,
                    _ => return Err(parse_error(json, target)),
                };
                let value = inner.as_str().ok_or_else(|| parse_error(json, target))?;
                Ok(equals(FieldPath { target, field }, value))
            }
        }
    }
}

fn parse_error(json: &Json, target: Target) -> Error {
    Error::Parse {
        message: format!("invalid {} selector: {}", target.as_str(), json),
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            Selector::Scalar(s) => match &s.path.field {
                Field::Key => map.serialize_entry("key", &s.value)?,
                Field::Name => map.serialize_entry("name", &s.value)?,
                Field::Function => map.serialize_entry("function", &s.value)?,
                Field::Attribute(key) => {
                    let mut attrs = Map::new();
                    attrs.insert(key.clone(), Json::String(s.value.clone()));
                    map.serialize_entry("attributes", &attrs)?
                }
            },
            Selector::And(children) => map.serialize_entry("and", children)?,
            Selector::Or(children) => map.serialize_entry("or", children)?,
        }
        map.end()
    }
}

/// Conjunction of selectors over one target; encodes as `"all"` when empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    selectors: Vec<Selector>,
}

impl Selection {
    /// Selection matching every object.
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a selector to the conjunction.
    pub fn add(&mut self, selector: Selector) {
        self.selectors.push(selector);
    }

    /// Selectors added so far.
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Returns true if the selection matches everything.
    pub fn is_all(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Decode a selection for `target`.
    pub fn from_json(json: &Json, target: Target) -> Result<Self> {
        if json.as_str() == Some("all") {
            return Ok(Self::all());
        }
        let selectors = match Selector::from_json(json, target)? {
            Selector::And(children) => children,
            other => vec![other],
        };
        Ok(Self { selectors })
    }
}

impl Serialize for Selection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.selectors.is_empty() {
            return serializer.serialize_str("all");
        }
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("and", &self.selectors)?;
        map.end()
    }
}

/// Device and sensor selections of a search.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Filters {
    /// Devices to include.
    pub devices: Selection,
    /// Sensors to include.
    pub sensors: Selection,
}

impl Filters {
    /// Decode `{"devices": .., "sensors": ..}`; a missing side means all.
    pub fn from_json(json: &Json) -> Result<Self> {
        let side = |name: &str, target| match json.get(name) {
            Some(value) => Selection::from_json(value, target),
            None => Ok(Selection::all()),
        };
        Ok(Self {
            devices: side("devices", Target::Devices)?,
            sensors: side("sensors", Target::Sensors)?,
        })
    }
}

impl<'de> Deserialize<'de> for Filters {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        Filters::from_json(&json).map_err(serde::de::Error::custom)
    }
}

/// Kind of object a search returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    /// Devices with their sensors.
    Devices,
    /// Individual sensors.
    Sensors,
}

/// A device/sensor search, as embedded in reads, deletes and rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Search {
    /// What the search returns.
    pub select: ObjectType,
    /// Which objects are included.
    pub filters: Filters,
}

impl Search {
    /// Search everything of the given type.
    pub fn new(select: ObjectType) -> Self {
        Self {
            select,
            filters: Filters::default(),
        }
    }
}
