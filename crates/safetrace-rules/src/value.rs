//! # Product Data Values
//!
//! Upstream product payloads are untrusted, loosely typed key-value maps.
//! They are narrowed once, on entry, into [`ProductData`]: a map from field
//! name to the closed [`FieldValue`] variant. The evaluator only ever sees
//! these four shapes, which keeps every comparison total.
//!
//! JSON `null` becomes [`FieldValue::Absent`] (the key is present, the value
//! is not). Nested objects and arrays are not addressable by a condition and
//! are narrowed to `Absent` as well.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use safetrace_core::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single product attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Any JSON number, held as `f64`.
    Number(f64),
    /// Text.
    Text(String),
    /// Boolean.
    Bool(bool),
    /// Present key with a null or non-scalar value.
    Absent,
}

impl FieldValue {
    /// Short name of the variant, used in evaluation traces.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Bool(_) => "boolean",
            Self::Absent => "absent",
        }
    }

    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret text as a point in time.
    ///
    /// Accepts RFC 3339 (any offset), `YYYY-MM-DD HH:MM:SS` (read as UTC),
    /// and `YYYY-MM-DD` (midnight UTC).
    pub fn as_instant(&self) -> Option<Timestamp> {
        let s = self.as_text()?.trim();
        if let Ok(ts) = Timestamp::parse_lenient(s) {
            return Some(ts);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Some(Timestamp::from_utc(dt.and_utc()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Timestamp::from_utc(dt.and_utc()))
    }

    /// Narrow a JSON value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Absent),
            Value::String(s) => Self::Text(s.clone()),
            Value::Bool(b) => Self::Bool(*b),
            Value::Null | Value::Array(_) | Value::Object(_) => Self::Absent,
        }
    }

    /// Back to JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::Bool(b) => Value::Bool(*b),
            Self::Absent => Value::Null,
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(|v| Self::from_json(&v))
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Absent => f.write_str("null"),
        }
    }
}

/// Narrowed product attributes keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProductData(BTreeMap<String, FieldValue>);

impl ProductData {
    /// Empty product data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow a JSON object.
    pub fn from_json_map(map: &serde_json::Map<String, Value>) -> Self {
        Self(
            map.iter()
                .map(|(k, v)| (k.clone(), FieldValue::from_json(v)))
                .collect(),
        )
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.0.insert(field.into(), value);
    }

    /// The value of `field`, or `None` when the key is missing.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Whether the key is present (with any value, including null).
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// The text value of `field`, if present and text.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for ProductData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => Ok(Self::from_json_map(&map)),
            other => Err(serde::de::Error::custom(format!(
                "product_data must be an object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
