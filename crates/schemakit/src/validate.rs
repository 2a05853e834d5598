//! Configuration validation against a schema
//!
//! Runs once per plan, before any diff entries are computed. Errors block
//! the plan; warnings are carried through to the host untouched.

use crate::attribute::{AttrKind, AttrSchema, Schema};
use crate::value::{AttrMap, AttrValue};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("{key}: required attribute is not set")]
    MissingRequired { key: String },
    #[error("{key}: expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{key}: conflicts with {other}")]
    Conflict { key: String, other: String },
    #[error("{key}: attribute is read-only and cannot be configured")]
    ComputedInConfig { key: String },
    #[error("{key}: too many items, max {max} but config has {actual}")]
    TooManyItems {
        key: String,
        max: usize,
        actual: usize,
    },
    #[error("{key}: too few items, min {min} but config has {actual}")]
    TooFewItems {
        key: String,
        min: usize,
        actual: usize,
    },
    #[error("{key}: unknown attribute")]
    UnknownAttribute { key: String },
    #[error("{key}: {message}")]
    Custom { key: String, message: String },
}

/// Result of validating one configuration.
#[derive(Debug, Default, Clone)]
pub struct Validation {
    pub warnings: Vec<String>,
    pub errors: Vec<ValidateError>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a user configuration against the schema.
pub fn validate(schema: &Schema, config: &AttrMap) -> Validation {
    let mut out = Validation::default();

    for key in config.keys() {
        if !schema.contains(key) {
            out.errors.push(ValidateError::UnknownAttribute { key: key.clone() });
        }
    }

    for (name, attr) in schema.iter() {
        let value = config.get(name);

        match value {
            None => {
                if matches!(attr.presence, crate::attribute::Presence::Required) {
                    out.errors
                        .push(ValidateError::MissingRequired { key: name.clone() });
                }
            }
            Some(v) => {
                if !attr.presence.allows_config() {
                    out.errors
                        .push(ValidateError::ComputedInConfig { key: name.clone() });
                    continue;
                }
                validate_value(name, attr, v, config, &mut out);
            }
        }
    }

    out
}

fn validate_value(
    key: &str,
    attr: &AttrSchema,
    value: &AttrValue,
    config: &AttrMap,
    out: &mut Validation,
) {
    if !attr.kind.accepts(value) {
        out.errors.push(ValidateError::TypeMismatch {
            key: key.to_string(),
            expected: attr.kind.name(),
            actual: value.kind_name(),
        });
        return;
    }

    for other in &attr.conflicts_with {
        if config.contains_key(other) {
            out.errors.push(ValidateError::Conflict {
                key: key.to_string(),
                other: other.clone(),
            });
        }
    }

    if let Some(len) = value.len()
        && matches!(attr.kind, AttrKind::List(_) | AttrKind::Set(_))
    {
        if let Some(max) = attr.max_items
            && len > max
        {
            out.errors.push(ValidateError::TooManyItems {
                key: key.to_string(),
                max,
                actual: len,
            });
        }
        if let Some(min) = attr.min_items
            && len < min
        {
            out.errors.push(ValidateError::TooFewItems {
                key: key.to_string(),
                min,
                actual: len,
            });
        }
    }

    if let Some(validate) = &attr.validate {
        let outcome = validate(key, value);
        out.warnings.extend(outcome.warnings);
        out.errors.extend(
            outcome
                .errors
                .into_iter()
                .map(|message| ValidateError::Custom {
                    key: key.to_string(),
                    message,
                }),
        );
    }

    // Recurse into nested structure.
    match (&attr.kind, value) {
        (AttrKind::List(elem) | AttrKind::Set(elem), AttrValue::List(items)) => {
            for (i, item) in items.iter().enumerate() {
                validate_value(&format!("{key}.{i}"), elem, item, config, out);
            }
        }
        (AttrKind::Set(elem), AttrValue::Set(elems)) => {
            for (hash, item) in elems {
                validate_value(&format!("{key}.{hash}"), elem, item, config, out);
            }
        }
        (AttrKind::Map(elem), AttrValue::Map(entries)) => {
            for (k, item) in entries {
                validate_value(&format!("{key}.{k}"), elem, item, config, out);
            }
        }
        (AttrKind::Object(nested), AttrValue::Object(fields)) => {
            for (field, field_attr) in nested.iter() {
                match fields.get(field) {
                    Some(item) => validate_value(
                        &format!("{key}.{field}"),
                        field_attr,
                        item,
                        config,
                        out,
                    ),
                    None => {
                        if matches!(field_attr.presence, crate::attribute::Presence::Required) {
                            out.errors.push(ValidateError::MissingRequired {
                                key: format!("{key}.{field}"),
                            });
                        }
                    }
                }
            }
        }
        _ => {}
    }
}
