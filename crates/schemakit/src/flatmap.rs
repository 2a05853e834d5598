//! Flat state codec
//!
//! The persisted attribute form is a flat `path -> string` map with `#`
//! cardinality markers for lists and sets, `%` for map lengths, and set
//! children keyed by element hash:
//!
//! ```text
//! block_device.#            = "1"
//! block_device.0.volume_size = "100"
//! tags.%                    = "2"
//! tags.Name                 = "web"
//! ```
//!
//! This form is historical and must be preserved bit-exact; everything in
//! memory goes through [`flatten`] / [`expand`]. An empty collection
//! flattens to nothing, so empty and absent are indistinguishable on disk
//! and in diffs.

use crate::attribute::{AttrKind, AttrSchema, Schema};
use crate::value::{AttrMap, AttrValue};
use std::collections::BTreeMap;
use thiserror::Error;

/// The flat on-disk attribute map.
pub type FlatMap = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum FlatError {
    #[error("malformed value for {key}: expected {expected}, got {value:?}")]
    Malformed {
        key: String,
        expected: &'static str,
        value: String,
    },
    #[error("malformed child key under {prefix}: {key}")]
    BadChildKey { prefix: String, key: String },
}

/// Flatten a typed attribute tree into the flat form.
pub fn flatten(schema: &Schema, attrs: &AttrMap) -> FlatMap {
    let mut out = FlatMap::new();
    for (name, value) in attrs {
        if let Some(attr) = schema.get(name) {
            flatten_value(name, attr, value, &mut out);
        }
    }
    out
}

fn flatten_value(prefix: &str, attr: &AttrSchema, value: &AttrValue, out: &mut FlatMap) {
    match (&attr.kind, value) {
        (AttrKind::List(elem), AttrValue::List(items)) => {
            if items.is_empty() {
                return;
            }
            out.insert(format!("{prefix}.#"), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                flatten_value(&format!("{prefix}.{i}"), elem, item, out);
            }
        }
        (AttrKind::Set(elem), AttrValue::Set(elems)) => {
            if elems.is_empty() {
                return;
            }
            out.insert(format!("{prefix}.#"), elems.len().to_string());
            for (hash, item) in elems {
                flatten_value(&format!("{prefix}.{hash}"), elem, item, out);
            }
        }
        // A set arriving in list form (raw config) is keyed by element hash.
        (AttrKind::Set(elem), AttrValue::List(items)) => {
            if items.is_empty() {
                return;
            }
            out.insert(format!("{prefix}.#"), items.len().to_string());
            for item in items {
                let hash = attr.hash_element(item);
                flatten_value(&format!("{prefix}.{hash}"), elem, item, out);
            }
        }
        (AttrKind::Map(elem), AttrValue::Map(entries)) => {
            if entries.is_empty() {
                return;
            }
            out.insert(format!("{prefix}.%"), entries.len().to_string());
            for (key, item) in entries {
                flatten_value(&format!("{prefix}.{key}"), elem, item, out);
            }
        }
        (AttrKind::Object(nested), AttrValue::Object(fields)) => {
            for (field, item) in fields {
                if let Some(field_attr) = nested.get(field) {
                    flatten_value(&format!("{prefix}.{field}"), field_attr, item, out);
                }
            }
        }
        _ => {
            if let Some(s) = value.to_flat_string() {
                out.insert(prefix.to_string(), s);
            }
        }
    }
}

/// Expand the flat form back into a typed attribute tree, schema-directed.
///
/// Attributes with no keys in the flat map are absent from the result,
/// which keeps `GetOk` able to distinguish unset from zero.
pub fn expand(schema: &Schema, flat: &FlatMap) -> Result<AttrMap, FlatError> {
    let mut out = AttrMap::new();
    for (name, attr) in schema.iter() {
        if let Some(value) = expand_value(name, attr, flat)? {
            out.insert(name.clone(), value);
        }
    }
    Ok(out)
}

fn expand_value(
    prefix: &str,
    attr: &AttrSchema,
    flat: &FlatMap,
) -> Result<Option<AttrValue>, FlatError> {
    match &attr.kind {
        AttrKind::String => Ok(flat.get(prefix).map(|s| AttrValue::String(s.clone()))),
        AttrKind::Int => flat
            .get(prefix)
            .map(|s| parse_scalar(prefix, s, "int", |s| s.parse().map(AttrValue::Int)))
            .transpose(),
        AttrKind::Float => flat
            .get(prefix)
            .map(|s| parse_scalar(prefix, s, "float", |s| s.parse().map(AttrValue::Float)))
            .transpose(),
        AttrKind::Bool => flat
            .get(prefix)
            .map(|s| parse_scalar(prefix, s, "bool", |s| s.parse().map(AttrValue::Bool)))
            .transpose(),
        AttrKind::List(elem) => {
            let Some(indices) = child_segments(prefix, flat) else {
                return Ok(None);
            };
            let mut ordinals: Vec<usize> = Vec::with_capacity(indices.len());
            for seg in &indices {
                ordinals.push(seg.parse().map_err(|_| FlatError::BadChildKey {
                    prefix: prefix.to_string(),
                    key: seg.clone(),
                })?);
            }
            ordinals.sort_unstable();
            let mut items = Vec::with_capacity(ordinals.len());
            for i in ordinals {
                if let Some(item) = expand_value(&format!("{prefix}.{i}"), elem, flat)? {
                    items.push(item);
                }
            }
            Ok(Some(AttrValue::List(items)))
        }
        AttrKind::Set(elem) => {
            let Some(hashes) = child_segments(prefix, flat) else {
                return Ok(None);
            };
            let mut elems = BTreeMap::new();
            for seg in hashes {
                let hash: i32 = seg.parse().map_err(|_| FlatError::BadChildKey {
                    prefix: prefix.to_string(),
                    key: seg.clone(),
                })?;
                if let Some(item) = expand_value(&format!("{prefix}.{hash}"), elem, flat)? {
                    elems.insert(hash, item);
                }
            }
            Ok(Some(AttrValue::Set(elems)))
        }
        AttrKind::Map(elem) => {
            let Some(keys) = child_segments(prefix, flat) else {
                return Ok(None);
            };
            let mut entries = BTreeMap::new();
            for key in keys {
                if let Some(item) = expand_value(&format!("{prefix}.{key}"), elem, flat)? {
                    entries.insert(key, item);
                }
            }
            Ok(Some(AttrValue::Map(entries)))
        }
        AttrKind::Object(nested) => {
            let mut fields = AttrMap::new();
            for (field, field_attr) in nested.iter() {
                if let Some(item) = expand_value(&format!("{prefix}.{field}"), field_attr, flat)? {
                    fields.insert(field.clone(), item);
                }
            }
            if fields.is_empty() {
                Ok(None)
            } else {
                Ok(Some(AttrValue::Object(fields)))
            }
        }
    }
}

fn parse_scalar<E>(
    key: &str,
    raw: &str,
    expected: &'static str,
    parse: impl Fn(&str) -> Result<AttrValue, E>,
) -> Result<AttrValue, FlatError> {
    parse(raw).map_err(|_| FlatError::Malformed {
        key: key.to_string(),
        expected,
        value: raw.to_string(),
    })
}

/// Distinct first segments below `prefix.`, excluding the `#`/`%` markers.
/// `None` when no key mentions the prefix at all (attribute absent).
fn child_segments(prefix: &str, flat: &FlatMap) -> Option<Vec<String>> {
    let dotted = format!("{prefix}.");
    let mut segments: Vec<String> = Vec::new();
    let mut seen = false;
    for key in flat.keys() {
        if let Some(rest) = key.strip_prefix(&dotted) {
            seen = true;
            let seg = rest.split('.').next().unwrap_or(rest);
            if seg == "#" || seg == "%" {
                continue;
            }
            if segments.last().map(String::as_str) != Some(seg) {
                segments.push(seg.to_string());
            }
        }
    }
    if seen {
        segments.dedup();
        Some(segments)
    } else {
        None
    }
}
