//! Point model and InfluxDB line-protocol encoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A single field value. Registry fields the poller does not interpret
/// (status, last-updated) pass through as whatever scalar the API sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One timestamped record bound for a bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub measurement: String,
    /// Tag pairs in insertion order.
    pub tags: Vec<(String, String)>,
    /// Field pairs in insertion order. Must be non-empty to encode.
    pub fields: Vec<(String, FieldValue)>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetricPoint {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Adds the field only when a value is present; line protocol has no null.
    pub fn field_opt(self, key: impl Into<String>, value: Option<FieldValue>) -> Self {
        match value {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn field_value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Encode as one line of InfluxDB line protocol (nanosecond precision).
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);

        for (k, v) in &self.tags {
            // empty tag values are not representable
            if v.is_empty() {
                continue;
            }
            let _ = write!(line, ",{}={}", escape(k, &[',', '=', ' ']), escape(v, &[',', '=', ' ']));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={}", escape(k, &[',', '=', ' ']), encode_field(v)))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));

        if let Some(ts) = self.timestamp.and_then(|t| t.timestamp_nanos_opt()) {
            let _ = write!(line, " {ts}");
        }
        line
    }
}

fn encode_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::Integer(i) => format!("{i}i"),
        FieldValue::Float(f) => f.to_string(),
        FieldValue::Text(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
