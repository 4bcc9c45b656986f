// Metric points handed from the scrape pipeline to the Influx writer

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which channel table a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Downstream,
    Upstream,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Downstream, ChannelKind::Upstream];

    /// Influx measurement name for this table.
    pub fn measurement(self) -> &'static str {
        match self {
            ChannelKind::Downstream => "downstream_channels",
            ChannelKind::Upstream => "upstream_channels",
        }
    }
}

/// Typed field value; serializes as a bare JSON string or number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

/// One channel row of one scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub measurement: &'static str,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Capture time of the scrape; shared by every point of a cycle.
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    pub fn new(measurement: &'static str, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Points from the most recent successful cycle, served by the status routes.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestScrape {
    pub captured_at: Option<DateTime<Utc>>,
    pub points: Vec<MetricPoint>,
}
