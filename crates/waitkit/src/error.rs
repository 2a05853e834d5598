//! Wait and retry failure modes.

use remote::RemoteError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaitError {
    /// The retry or wait budget elapsed. Carries the last retryable error
    /// (or last observed state) so callers can branch on the underlying
    /// cause without issuing one more direct call.
    #[error("timeout after {elapsed:?}: {last}")]
    Timeout {
        elapsed: Duration,
        #[source]
        last: RemoteError,
    },

    /// The host cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A refresh observed a state that is neither pending nor target.
    #[error("unexpected state {state:?}, wanted one of [{wanted}]")]
    UnexpectedState { state: String, wanted: String },

    /// The object stayed absent past the not-found budget.
    #[error("resource not found after {checks} refresh attempts")]
    NotFound { checks: u32 },

    /// A non-retryable remote failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl WaitError {
    /// Whether the failure was a budget timeout rather than a hard error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The underlying remote error, when there is one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Timeout { last, .. } => Some(last),
            Self::Remote(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for retry and wait operations.
pub type Result<T> = std::result::Result<T, WaitError>;
