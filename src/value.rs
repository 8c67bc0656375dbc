//! The JSON-tree value type stored against every key.
//!
//! `Value` is a thin newtype over [`serde_json::Value`] rather than a
//! hand-rolled tagged union: the wire format is JSON, so there is no reason
//! to duplicate `serde_json`'s tree. The newtype exists to give nanokv's
//! public API its own type identity and a handful of ergonomic conversions.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// An arbitrary JSON-serializable tree: the unit of value nanokv stores.
#[derive(Debug, Clone, PartialEq)]
pub struct Value(pub(crate) Json);

impl Value {
    /// The JSON `null` value.
    pub fn null() -> Self {
        Value(Json::Null)
    }

    /// Builds a `Value` from anything `Serialize`.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Value)
            .map_err(|e| Error::Type(e.to_string()))
    }

    /// Deserializes this value into a concrete Rust type.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        serde_json::from_value(self.0).map_err(|e| Error::Type(e.to_string()))
    }

    /// Parses a `Value` from its serialized JSON text form.
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map(Value)
            .map_err(|e| Error::Type(e.to_string()))
    }

    /// Serializes this value to JSON text (UTF-8, no ASCII-escaping — this is
    /// `serde_json`'s default behavior, matching the Python backend's
    /// `ensure_ascii=False`).
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&self.0).map_err(|e| Error::Type(e.to_string()))
    }

    /// Returns the inner object as a `BTreeMap<String, Value>`, if this value
    /// is a JSON object.
    pub fn as_object(&self) -> Option<BTreeMap<String, Value>> {
        self.0.as_object().map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), Value(v.clone())))
                .collect()
        })
    }
}

impl From<Json> for Value {
    fn from(v: Json) -> Self {
        Value(v)
    }
}

impl From<Value> for Json {
    fn from(v: Value) -> Self {
        v.0
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(Json::String(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(Json::String(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value(Json::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value(Json::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value(Json::from(b))
    }
}
