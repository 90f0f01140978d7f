//! Static attribute values.
//!
//! Attributes declared on handlers are attached to spans as typed
//! OpenTelemetry values and to metrics as string labels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An ordered set of static attributes keyed by name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
}

impl AttrValue {
    /// Converts the value into an OpenTelemetry attribute value.
    #[must_use]
    pub fn to_otel(&self) -> opentelemetry::Value {
        match self {
            Self::Bool(b) => opentelemetry::Value::Bool(*b),
            Self::Int(i) => opentelemetry::Value::I64(*i),
            Self::Float(f) => opentelemetry::Value::F64(*f),
            Self::String(s) => opentelemetry::Value::from(s.clone()),
        }
    }

    /// Builds an OpenTelemetry key-value pair.
    #[must_use]
    pub fn key_value(key: &str, value: &Self) -> opentelemetry::KeyValue {
        opentelemetry::KeyValue::new(key.to_string(), value.to_otel())
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Merges `overrides` on top of `base`, key by key.
///
/// Keys present in both maps take the value from `overrides`.
#[must_use]
pub fn merge_attributes(base: &Attributes, overrides: &Attributes) -> Attributes {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
