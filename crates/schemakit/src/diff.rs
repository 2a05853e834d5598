//! Plan computation
//!
//! Compares prior state against the (normalized) configuration and produces
//! an ordered set of per-attribute change entries. The comparison happens on
//! the flat form so set/list/map addressing falls out of the path scheme:
//! set membership changes surface as hash-keyed adds/removes, list length
//! changes as explicit `.#` entries, map key removals as removal entries.
//!
//! Determinism is the primary contract here: planning against the state a
//! successful apply produced must yield an empty plan.

use crate::attribute::{AttrKind, AttrSchema, Schema};
use crate::flatmap::{FlatMap, flatten};
use crate::path::AttrPath;
use crate::validate::{ValidateError, Validation, validate};
use crate::value::{AttrMap, AttrValue};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// One attribute-level change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub path: String,
    pub old: Option<String>,
    pub new: Option<String>,
    pub forces_replacement: bool,
    pub sensitive: bool,
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (old, new) = if self.sensitive {
            ("(sensitive)", "(sensitive)")
        } else {
            (
                self.old.as_deref().unwrap_or("<absent>"),
                self.new.as_deref().unwrap_or("<absent>"),
            )
        };
        write!(f, "{}: {old} => {new}", self.path)?;
        if self.forces_replacement {
            f.write_str(" (forces replacement)")?;
        }
        Ok(())
    }
}

/// The ordered set of changes for one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    /// Any entry marked ForceNew turns the whole plan into a replacement:
    /// destroy of the prior instance, then create with the new config.
    pub fn requires_replacement(&self) -> bool {
        self.entries.iter().any(|e| e.forces_replacement)
    }

    /// Whether any entry touches the given top-level attribute.
    pub fn touches(&self, attr: &str) -> bool {
        let dotted = format!("{attr}.");
        self.entries
            .iter()
            .any(|e| e.path == attr || e.path.starts_with(&dotted))
    }

    /// Drop an entry, used by handler-supplied diff customization.
    pub fn remove(&mut self, path: &str) {
        self.entries.retain(|e| e.path != path);
    }

    pub fn push(&mut self, entry: PlanEntry) {
        self.entries.push(entry);
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Apply the plan over a flat prior state, yielding the planned state.
    pub fn apply_to(&self, prior: &FlatMap) -> FlatMap {
        let mut out = prior.clone();
        for entry in &self.entries {
            match &entry.new {
                Some(v) => {
                    // Zero-cardinality markers mean the collection is gone.
                    if v == "0" && (entry.path.ends_with(".#") || entry.path.ends_with(".%")) {
                        out.remove(&entry.path);
                    } else {
                        out.insert(entry.path.clone(), v.clone());
                    }
                }
                None => {
                    out.remove(&entry.path);
                }
            }
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("configuration is invalid: {0:?}")]
    Validation(Vec<ValidateError>),
}

/// Compute the plan for one resource instance.
///
/// Validation failures abort before any entry is produced. Warnings are
/// returned alongside the plan.
pub fn plan(schema: &Schema, prior: &AttrMap, config: &AttrMap) -> Result<(Plan, Vec<String>), PlanError> {
    let Validation { warnings, errors } = validate(schema, config);
    if !errors.is_empty() {
        return Err(PlanError::Validation(errors));
    }

    let normalized = normalize_config(schema, config);
    let flat_prior = flatten(schema, prior);
    let flat_config = flatten(schema, &normalized);

    let mut entries = Vec::new();
    let keys: BTreeSet<&String> = flat_prior.keys().chain(flat_config.keys()).collect();

    for key in keys {
        let Ok(path) = AttrPath::parse(key) else {
            continue;
        };
        let Some(root_name) = path.root() else {
            continue;
        };
        let Some(root_attr) = schema.get(root_name) else {
            continue;
        };
        let leaf = schema.lookup_path(&path).unwrap_or(root_attr);

        let old = flat_prior.get(key);
        let new = flat_config.get(key);

        // Server-supplied attributes keep their prior value when the config
        // does not mention them.
        if new.is_none()
            && root_attr.presence.is_computed()
            && !normalized.contains_key(root_name)
        {
            continue;
        }

        let is_marker = key.ends_with(".#") || key.ends_with(".%");
        let (old_s, new_s) = if is_marker {
            // A missing cardinality marker on one side means zero elements.
            (
                Some(old.cloned().unwrap_or_else(|| "0".to_string())),
                Some(new.cloned().unwrap_or_else(|| "0".to_string())),
            )
        } else {
            (old.cloned(), new.cloned())
        };

        if old_s == new_s {
            continue;
        }

        if let Some(suppress) = leaf.diff_suppress.as_ref().or(root_attr.diff_suppress.as_ref()) {
            let old_str = old_s.as_deref().unwrap_or("");
            let new_str = new_s.as_deref().unwrap_or("");
            if suppress(key, old_str, new_str, &normalized) {
                log::debug!("diff suppressed for {key}: {old_str:?} => {new_str:?}");
                continue;
            }
        }

        entries.push(PlanEntry {
            path: key.clone(),
            old: old_s,
            new: new_s,
            forces_replacement: leaf.force_new || root_attr.force_new,
            sensitive: leaf.sensitive || root_attr.sensitive,
        });
    }

    Ok((Plan { entries }, warnings))
}

/// Normalize a raw configuration: fill Optional defaults, run StateFn on
/// every leaf, and key set elements by their hash.
pub fn normalize_config(schema: &Schema, config: &AttrMap) -> AttrMap {
    let mut out = AttrMap::new();
    for (name, attr) in schema.iter() {
        let value = match config.get(name) {
            Some(v) => Some(normalize_value(attr, v)),
            None => attr.default.clone(),
        };
        if let Some(v) = value {
            out.insert(name.clone(), v);
        }
    }
    out
}

fn normalize_value(attr: &AttrSchema, value: &AttrValue) -> AttrValue {
    let value = attr.normalize(value);
    match (&attr.kind, value) {
        (AttrKind::List(elem), AttrValue::List(items)) => {
            AttrValue::List(items.iter().map(|v| normalize_value(elem, v)).collect())
        }
        // Sets in list form are hashed after element normalization.
        (AttrKind::Set(elem), AttrValue::List(items)) => {
            let mut set = std::collections::BTreeMap::new();
            for item in &items {
                let normalized = normalize_value(elem, item);
                set.insert(attr.hash_element(&normalized), normalized);
            }
            AttrValue::Set(set)
        }
        (AttrKind::Set(elem), AttrValue::Set(elems)) => AttrValue::Set(
            elems
                .values()
                .map(|v| {
                    let normalized = normalize_value(elem, v);
                    (attr.hash_element(&normalized), normalized)
                })
                .collect(),
        ),
        (AttrKind::Map(elem), AttrValue::Map(entries)) => AttrValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), normalize_value(elem, v)))
                .collect(),
        ),
        (AttrKind::Object(nested), AttrValue::Object(fields)) => {
            let mut out = AttrMap::new();
            for (field, item) in &fields {
                match nested.get(field) {
                    Some(field_attr) => {
                        out.insert(field.clone(), normalize_value(field_attr, item));
                    }
                    None => {
                        out.insert(field.clone(), item.clone());
                    }
                }
            }
            for (field, field_attr) in nested.iter() {
                if !out.contains_key(field)
                    && let Some(default) = &field_attr.default
                {
                    out.insert(field.clone(), default.clone());
                }
            }
            AttrValue::Object(out)
        }
        (_, v) => v,
    }
}
