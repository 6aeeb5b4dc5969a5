//! Fluent construction of searches and reads.

use chrono::{DateTime, FixedOffset};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::selection::{ObjectType, Search, Selector, Target};

/// Server-side transformation applied to read results.
#[derive(Clone, Debug, PartialEq)]
pub enum Function {
    /// Combine all selected streams with one function, e.g. `mean`.
    Aggregation {
        /// Aggregation function name.
        function: String,
    },
    /// Downsample each stream into fixed periods.
    Rollup {
        /// Rollup function name.
        function: String,
        /// ISO-8601 period, e.g. `PT1H`.
        period: String,
    },
    /// Several rollups at once.
    MultiRollup {
        /// Rollup function names.
        functions: Vec<String>,
        /// ISO-8601 period.
        period: String,
    },
    /// Pick one point per period, e.g. `max`.
    Find {
        /// Selection function name.
        function: String,
        /// ISO-8601 period.
        period: String,
    },
    /// Fill gaps at a fixed period.
    Interpolation {
        /// Interpolation function, e.g. `linear`.
        function: String,
        /// ISO-8601 period.
        period: String,
    },
    /// Shift timestamps into a timezone.
    ConvertTz {
        /// IANA timezone name.
        tz: String,
    },
}

impl Function {
    /// Wire name of the function.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Aggregation { .. } => "aggregation",
            Function::Rollup { .. } => "rollup",
            Function::MultiRollup { .. } => "multi_rollup",
            Function::Find { .. } => "find",
            Function::Interpolation { .. } => "interpolate",
            Function::ConvertTz { .. } => "convert_tz",
        }
    }

    /// Positional arguments in wire order.
    pub fn arguments(&self) -> Vec<serde_json::Value> {
        match self {
            Function::Aggregation { function } => vec![json!(function)],
            Function::Rollup { function, period }
            | Function::Find { function, period }
            | Function::Interpolation { function, period } => {
                vec![json!(function), json!(period)]
            }
            Function::MultiRollup { functions, period } => vec![json!(functions), json!(period)],
            Function::ConvertTz { tz } => vec![json!(tz)],
        }
    }
}

impl Serialize for Function {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Function", 2)?;
        s.serialize_field("name", self.name())?;
        s.serialize_field("arguments", &self.arguments())?;
        s.end()
    }
}

/// Time range of a read.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReadRange {
    /// Inclusive start.
    pub start: DateTime<FixedOffset>,
    /// Exclusive end.
    pub stop: DateTime<FixedOffset>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
struct Pipeline {
    functions: Vec<Function>,
}

/// A complete read request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReadQuery {
    /// Which streams to read.
    pub search: Search,
    /// Time range.
    pub read: ReadRange,
    #[serde(rename = "fold", skip_serializing_if = "Option::is_none")]
    pipeline: Option<Pipeline>,
}

impl ReadQuery {
    /// Functions applied server-side, in order.
    pub fn functions(&self) -> &[Function] {
        self.pipeline.as_ref().map(|p| p.functions.as_slice()).unwrap_or_default()
    }
}

/// Fluent builder for searches and reads.
///
/// # Example
///
/// ```
/// use tempoiq_client::query::{Function, QueryBuilder};
/// use tempoiq_client::selection::{device, equals, sensor};
///
/// # fn main() -> tempoiq_client::Result<()> {
/// let start = chrono::DateTime::parse_from_rfc3339("2014-01-01T00:00:00Z").unwrap();
/// let stop = chrono::DateTime::parse_from_rfc3339("2014-01-02T00:00:00Z").unwrap();
/// let query = QueryBuilder::devices()
///     .filter(equals(device::attribute("building"), "4"))?
///     .filter(equals(sensor::key(), "temperature"))?
///     .pipeline(Function::Rollup { function: "mean".into(), period: "PT1H".into() })
///     .read(start, stop);
/// assert_eq!(query.functions().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct QueryBuilder {
    search: Search,
    functions: Vec<Function>,
}

impl QueryBuilder {
    /// Start a query selecting objects of `select`.
    pub fn new(select: ObjectType) -> Self {
        Self {
            search: Search::new(select),
            functions: Vec::new(),
        }
    }

    /// Start a device query.
    pub fn devices() -> Self {
        Self::new(ObjectType::Devices)
    }

    /// Start a sensor query.
    pub fn sensors() -> Self {
        Self::new(ObjectType::Sensors)
    }

    /// Add a selector to the devices or sensors side, chosen by its target.
    ///
    /// A selector mixing targets, an empty clause, or a stream-only selector
    /// cannot be placed on either side and is rejected.
    pub fn filter(mut self, selector: Selector) -> Result<Self> {
        match selector.target() {
            Some(Target::Devices) => self.search.filters.devices.add(selector),
            Some(Target::Sensors) => self.search.filters.sensors.add(selector),
            Some(Target::Streams) | None => {
                return Err(Error::Config(format!(
                    "selector cannot filter devices or sensors: {:?}",
                    selector
                )));
            }
        }
        Ok(self)
    }

    /// Append a server-side function.
    pub fn pipeline(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Finish as a search (device lookup or delete).
    pub fn search(self) -> Search {
        self.search
    }

    /// Finish as a read over `[start, stop)`.
    pub fn read(self, start: DateTime<FixedOffset>, stop: DateTime<FixedOffset>) -> ReadQuery {
        let pipeline = (!self.functions.is_empty()).then_some(Pipeline {
            functions: self.functions,
        });
        ReadQuery {
            search: self.search,
            read: ReadRange { start, stop },
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{and, device, equals, or, sensor, stream};

    fn t(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_query_builder_scalar_filter() {
        let search = QueryBuilder::devices()
            .filter(equals(device::key(), "foo"))
            .unwrap()
            .search();
        assert_eq!(search.filters.devices.selectors(), &[equals(device::key(), "foo")]);
        assert!(search.filters.sensors.is_all());
    }

    #[test]
    fn test_query_builder_chained_filters_route_by_target() {
        let search = QueryBuilder::devices()
            .filter(equals(device::key(), "foo"))
            .unwrap()
            .filter(equals(sensor::key(), "bar"))
            .unwrap()
            .filter(equals(device::name(), "baz"))
            .unwrap()
            .search();
        assert_eq!(search.filters.devices.selectors().len(), 2);
        assert_eq!(search.filters.sensors.selectors(), &[equals(sensor::key(), "bar")]);
    }

    #[test]
    fn test_query_builder_or_clause() {
        let clause = or([equals(device::key(), "foo"), equals(device::key(), "bar")]);
        let search = QueryBuilder::devices().filter(clause.clone()).unwrap().search();
        assert_eq!(search.filters.devices.selectors(), &[clause]);
    }

    #[test]
    fn test_query_builder_rejects_mixed_and_stream_selectors() {
        let mixed = and([equals(device::key(), "foo"), equals(sensor::key(), "bar")]);
        assert!(matches!(
            QueryBuilder::devices().filter(mixed),
            Err(Error::Config(_))
        ));
        assert!(QueryBuilder::devices()
            .filter(equals(stream::function(), "mean"))
            .is_err());
    }

    #[test]
    fn test_read_query_encoding() {
        let query = QueryBuilder::devices()
            .filter(equals(device::key(), "d1"))
            .unwrap()
            .pipeline(Function::Rollup {
                function: "max".to_string(),
                period: "PT1M".to_string(),
            })
            .pipeline(Function::ConvertTz { tz: "America/Chicago".to_string() })
            .read(t("2014-01-01T00:00:00Z"), t("2014-01-02T00:00:00Z"));

        let encoded = serde_json::to_value(&query).unwrap();
        assert_eq!(encoded["search"]["select"], "devices");
        assert_eq!(encoded["search"]["filters"]["devices"], json!({"and": [{"key": "d1"}]}));
        assert_eq!(encoded["search"]["filters"]["sensors"], "all");
        assert_eq!(
            encoded["fold"]["functions"],
            json!([
                {"name": "rollup", "arguments": ["max", "PT1M"]},
                {"name": "convert_tz", "arguments": ["America/Chicago"]}
            ])
        );
        assert!(encoded["read"]["start"].as_str().unwrap().starts_with("2014-01-01T00:00:00"));
    }

    #[test]
    fn test_read_query_without_pipeline_omits_fold() {
        let query = QueryBuilder::sensors().read(t("2014-01-01T00:00:00Z"), t("2014-01-02T00:00:00Z"));
        let encoded = serde_json::to_value(&query).unwrap();
        assert!(encoded.get("fold").is_none());
        assert!(query.functions().is_empty());
    }

    #[test]
    fn test_function_arguments() {
        let f = Function::MultiRollup {
            functions: vec!["min".to_string(), "max".to_string()],
            period: "PT1H".to_string(),
        };
        assert_eq!(f.name(), "multi_rollup");
        assert_eq!(f.arguments(), vec![json!(["min", "max"]), json!("PT1H")]);
        assert_eq!(
            Function::Interpolation { function: "linear".into(), period: "PT5M".into() }.name(),
            "interpolate"
        );
    }
}
