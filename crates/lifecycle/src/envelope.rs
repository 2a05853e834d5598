//! The persisted state envelope.
//!
//! On disk an instance is `(schema_version, id, attributes, meta)` where
//! `attributes` is the flat `path -> string` map. The flat form and the
//! meta key for timeouts are historical and preserved bit-exact.

use crate::timeouts::Timeouts;
use schemakit::FlatMap;
use serde::{Deserialize, Serialize};

/// Historical meta key under which per-instance timeouts are persisted.
pub const TIMEOUTS_META_KEY: &str = "e2bmod5";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(
        rename = "e2bmod5",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub timeouts: Option<Timeouts>,
}

impl Meta {
    pub fn is_empty(&self) -> bool {
        self.timeouts.is_none()
    }
}

/// One persisted resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEnvelope {
    pub schema_version: u64,
    /// Empty means the instance does not exist.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: FlatMap,
    #[serde(default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}

impl StateEnvelope {
    pub fn new(schema_version: u64, id: impl Into<String>, attributes: FlatMap) -> Self {
        let id = id.into();
        let mut attributes = attributes;
        if !id.is_empty() {
            attributes.insert("id".to_string(), id.clone());
        }
        Self {
            schema_version,
            id,
            attributes,
            meta: Meta::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        if !timeouts.is_default() {
            self.meta.timeouts = Some(timeouts);
        }
        self
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    /// Timeouts persisted with this instance, if any.
    pub fn timeouts(&self) -> Option<&Timeouts> {
        self.meta.timeouts.as_ref()
    }
}
