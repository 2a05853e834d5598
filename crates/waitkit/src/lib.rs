//! # waitkit
//!
//! Retry and state-change polling for eventually-consistent remote APIs.
//!
//! Two primitives:
//!
//! - [`retry`]: bounded retry with exponential backoff and jitter; transient
//!   errors are absorbed until the time budget runs out, and timeouts carry
//!   the last underlying error so callers can branch on the cause.
//! - [`StateChange`]: a polling loop with Pending/Target/NotFound semantics
//!   for asynchronous remote state transitions ("pending" -> "available").
//!
//! Both are single-threaded and cooperative: no thread is spawned per poll,
//! and a host-provided [`CancelToken`] is observed between iterations.

pub mod cancel;
pub mod error;
pub mod retry;
pub mod wait;

// Re-export main types at crate root
pub use cancel::CancelToken;
pub use error::{Result, WaitError};
pub use retry::{Backoff, Recoverable, retry, retry_with};
pub use wait::{RefreshFn, StateChange};
