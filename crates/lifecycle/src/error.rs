//! Error types for the lifecycle engine.
//!
//! Every surfaced error names the resource type, the instance id when one
//! exists, and the operation, so host output is actionable. Sensitive
//! attribute values never appear here; they only live in plan entries,
//! which redact themselves.

use crate::envelope::StateEnvelope;
use schemakit::ValidateError;
use std::fmt;
use thiserror::Error;

/// The CRUD operation being executed when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("unknown resource type {type_name:?}")]
    UnknownType { type_name: String },

    #[error("{type_name}: configuration is invalid: {}", format_errors(errors))]
    Validation {
        type_name: String,
        errors: Vec<ValidateError>,
    },

    #[error("{type_name} ({id}): {op} failed: {source}")]
    Handler {
        type_name: String,
        /// Empty when the instance never got an id.
        id: String,
        op: Op,
        #[source]
        source: anyhow::Error,
    },

    #[error("{type_name}: cannot upgrade state from schema version {from}: {message}")]
    Migration {
        type_name: String,
        from: u64,
        message: String,
    },

    #[error("{type_name}: update is not supported by this resource")]
    UpdateUnsupported { type_name: String },

    #[error("{type_name}: create completed without assigning an id")]
    MissingId { type_name: String },

    #[error("state decode failed: {0}")]
    Flat(#[from] schemakit::FlatError),

    #[error("operation cancelled by host")]
    Cancelled,
}

fn format_errors(errors: &[ValidateError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A failed apply, together with the state that must still be persisted:
/// a create that assigned an id before failing leaves a partially-created
/// remote object the next plan has to reconcile.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ApplyFailure {
    #[source]
    pub error: LifecycleError,
    pub state: Option<StateEnvelope>,
}

impl ApplyFailure {
    pub fn bare(error: LifecycleError) -> Self {
        Self { error, state: None }
    }

    pub fn with_state(error: LifecycleError, state: StateEnvelope) -> Self {
        Self {
            error,
            state: Some(state),
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
