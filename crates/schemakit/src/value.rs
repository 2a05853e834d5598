//! Attribute values - the tagged-union tree every layer operates on
//!
//! The persisted form is a flat `path -> string` map (see [`crate::flatmap`]);
//! in memory we work on a typed tree so handlers and the diff engine never
//! touch stringly-typed data directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value.
///
/// Sets are keyed by the element hash so that element identity is stable
/// across runs; lists are ordinal; maps and objects are keyed by name.
/// `BTreeMap` keeps iteration deterministic, which the diff engine relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<AttrValue>),
    Set(BTreeMap<i32, AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    Object(BTreeMap<String, AttrValue>),
}

/// A top-level attribute map: attribute name to value.
pub type AttrMap = BTreeMap<String, AttrValue>;

impl AttrValue {
    /// Name of the value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Number of elements for collection values, `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::List(v) => Some(v.len()),
            Self::Set(m) => Some(m.len()),
            Self::Map(m) | Self::Object(m) => Some(m.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Render a scalar as its flat string form.
    ///
    /// This is the historical on-disk representation and must stay stable:
    /// bools are `true`/`false`, numbers use their shortest decimal form.
    pub fn to_flat_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(format_float(*f)),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Convert to a JSON value, mainly for remote-service inputs.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::List(v) => serde_json::Value::Array(v.iter().map(Self::to_json).collect()),
            Self::Set(m) => serde_json::Value::Array(m.values().map(Self::to_json).collect()),
            Self::Map(m) | Self::Object(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_flat_string() {
            Some(s) => f.write_str(&s),
            None => write!(f, "<{}[{}]>", self.kind_name(), self.len().unwrap_or(0)),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Format a float the way the flat codec expects.
///
/// Integral floats keep a trailing `0` (`1.0` not `1`) so the string form
/// round-trips through the codec unambiguously.
fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.is_finite() {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_string_scalars() {
        assert_eq!(AttrValue::from("x").to_flat_string().unwrap(), "x");
        assert_eq!(AttrValue::from(42i64).to_flat_string().unwrap(), "42");
        assert_eq!(AttrValue::from(true).to_flat_string().unwrap(), "true");
        assert_eq!(AttrValue::from(1.5).to_flat_string().unwrap(), "1.5");
        assert_eq!(AttrValue::from(2.0).to_flat_string().unwrap(), "2.0");
    }

    #[test]
    fn test_flat_string_collections_are_none() {
        assert!(AttrValue::List(vec![]).to_flat_string().is_none());
        assert!(AttrValue::Map(BTreeMap::new()).to_flat_string().is_none());
    }

    #[test]
    fn test_len() {
        let list = AttrValue::List(vec![AttrValue::from(1i64), AttrValue::from(2i64)]);
        assert_eq!(list.len(), Some(2));
        assert_eq!(AttrValue::from("x").len(), None);
    }

    #[test]
    fn test_to_json_set_is_array() {
        let mut set = BTreeMap::new();
        set.insert(42, AttrValue::from("a"));
        set.insert(7, AttrValue::from("b"));
        let json = AttrValue::Set(set).to_json();
        // Iteration order is by hash, deterministic
        assert_eq!(json, serde_json::json!(["b", "a"]));
    }
}
