//! # remote
//!
//! The abstract remote API surface the reconciliation core calls into.
//!
//! The core never speaks a wire protocol; every cloud operation goes through
//! [`RemoteService::call`] and every failure is classified into a
//! [`RemoteError`] kind. Retry discipline lives entirely on top of
//! `is_retryable`; the core never interprets raw service messages except
//! through the classifier and caller-supplied predicates like
//! [`RemoteError::matches`].

use serde_json::Value;
use thiserror::Error;

/// Classified failure of a remote operation.
///
/// The categories drive retry policy: `Throttling`, `Retryable` and
/// `InvalidState` are transient and absorbed by the retry framework;
/// `NotFound` maps to success-with-absence in Read/Delete; everything else
/// is terminal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The remote object does not exist.
    #[error("resource not found")]
    NotFound,

    /// The object exists but is in a state that rejects the operation.
    #[error("invalid state: {state}")]
    InvalidState {
        /// The state the service reported
        state: String,
    },

    /// The service is rate limiting this client.
    #[error("request throttled")]
    Throttling,

    /// The request was rejected as malformed or semantically invalid.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A transient failure the caller asserts may succeed on retry,
    /// typically eventual consistency.
    #[error("{message}")]
    Retryable { message: String },

    /// A service error carrying the provider's error code verbatim, for
    /// caller-supplied predicates. Not retryable by itself.
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// A permanent failure; retrying cannot help.
    #[error("{message}")]
    Terminal { message: String },
}

impl RemoteError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    pub fn invalid_state(state: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.into(),
        }
    }

    /// Whether the error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttling | Self::Retryable { .. } | Self::InvalidState { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Caller-supplied classification: "error code = X and message contains Y".
    pub fn matches(&self, code: &str, needle: &str) -> bool {
        match self {
            Self::Service {
                code: c,
                message: m,
            } => c == code && m.contains(needle),
            _ => false,
        }
    }
}

/// An abstract family of typed operations against one cloud service.
///
/// Implementations adapt a concrete SDK client; the core and the resource
/// handlers only see `input -> output | RemoteError`. Adapters are expected
/// to back off internally on throttling only as far as classifying the
/// error; absorption happens in the retry framework.
pub trait RemoteService: Send + Sync {
    /// Invoke a named operation.
    fn call(&self, op: &str, input: &Value) -> Result<Value>;
}

/// Result type for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;
