//! Core types for TempoIQ requests and responses.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A device, the unit TempoIQ groups sensors under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device key.
    pub key: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form string attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Sensors attached to the device.
    #[serde(default)]
    pub sensors: Vec<Sensor>,
}

impl Device {
    /// Create a device with no name, attributes or sensors.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            attributes: BTreeMap::new(),
            sensors: Vec::new(),
        }
    }

    /// Set the device name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach a sensor.
    pub fn with_sensor(mut self, sensor: Sensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Get a sensor by key.
    pub fn sensor(&self, key: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.key == key)
    }
}

/// A sensor belonging to a device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Sensor key, unique within its device.
    pub key: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form string attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Sensor {
    /// Create a sensor with no name or attributes.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Set the sensor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A single timestamped sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Sample time.
    #[serde(rename = "t")]
    pub timestamp: DateTime<FixedOffset>,
    /// Sample value.
    #[serde(rename = "v")]
    pub value: Value,
}

impl Point {
    /// Create a new point.
    pub fn new(timestamp: DateTime<FixedOffset>, value: impl Into<Value>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }
}

/// Identifier the server assigns to each stream in a read response.
///
/// The header block may carry ids as JSON numbers while row payloads key
/// them as object keys (always strings); both decode to the same id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Create an id from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct StreamIdVisitor;

impl<'de> Visitor<'de> for StreamIdVisitor {
    type Value = StreamId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a stream id as string or integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<StreamId, E> {
        Ok(StreamId(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<StreamId, E> {
        Ok(StreamId(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<StreamId, E> {
        Ok(StreamId(v.to_string()))
    }
}

impl<'de> Deserialize<'de> for StreamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StreamIdVisitor)
    }
}

/// Describes which device, sensor and server-side function a stream carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamHeader {
    /// Id used to key this stream's values inside rows.
    pub id: StreamId,
    /// Device the stream belongs to. Its sensor list is usually empty.
    pub device: Device,
    /// Sensor the stream reads.
    pub sensor: Sensor,
    /// Derived function applied server-side, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// One timestamp of a multi-stream read response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Row time.
    #[serde(rename = "t")]
    pub timestamp: DateTime<FixedOffset>,
    /// Values present at this timestamp, keyed by stream id. Streams with no
    /// sample at this time are absent.
    #[serde(rename = "data", default)]
    pub values: BTreeMap<StreamId, Value>,
}

impl Row {
    /// Get the value recorded for a stream.
    pub fn get(&self, id: &StreamId) -> Option<&Value> {
        self.values.get(id)
    }
}

/// Opaque token that makes the server return one specific page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(serde_json::Value);

impl ContinuationToken {
    /// Wrap a raw token.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The raw token, sent back to the server as a request body.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Pointer to the page following the current one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NextPage {
    /// Query that fetches the next page.
    pub next_query: ContinuationToken,
}

/// One page of a paginated response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageData<T = Row> {
    /// Items on this page.
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    /// Stream header block. Present on the first page of a read response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streams: Option<Vec<StreamHeader>>,
    /// Absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page: Option<NextPage>,
}

impl<T> PageData<T> {
    /// Create a page with no stream headers.
    pub fn new(data: Vec<T>, next: Option<ContinuationToken>) -> Self {
        Self {
            data,
            streams: None,
            next_page: next.map(|next_query| NextPage { next_query }),
        }
    }

    /// Attach a stream header block.
    pub fn with_streams(mut self, streams: Vec<StreamHeader>) -> Self {
        self.streams = Some(streams);
        self
    }

    /// Token for the following page, if any.
    pub fn next_token(&self) -> Option<&ContinuationToken> {
        self.next_page.as_ref().map(|n| &n.next_query)
    }
}

/// Points to write, grouped by device key then sensor key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteRequest {
    points: BTreeMap<String, BTreeMap<String, Vec<Point>>>,
}

impl WriteRequest {
    /// Create an empty write request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a point for a device/sensor pair.
    pub fn add(
        mut self,
        device: impl Into<String>,
        sensor: impl Into<String>,
        point: Point,
    ) -> Self {
        self.points
            .entry(device.into())
            .or_default()
            .entry(sensor.into())
            .or_default()
            .push(point);
        self
    }

    /// Number of queued points.
    pub fn len(&self) -> usize {
        self.points
            .values()
            .flat_map(|sensors| sensors.values())
            .map(Vec::len)
            .sum()
    }

    /// Returns true if no point is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
