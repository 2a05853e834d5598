//! # converge
//!
//! A reconciliation core for declarative infrastructure providers: typed
//! schemas and plans, a CRUD lifecycle engine with state migration, retry
//! and wait primitives tuned for eventually-consistent services, and tag
//! reconciliation.
//!
//! The host drives one instance at a time through the [`Provider`] surface:
//!
//! ```no_run
//! use converge::{Provider, ProviderConfig};
//! use lifecycle::HandlerRegistry;
//! use std::sync::Arc;
//! # struct Null;
//! # impl remote::RemoteService for Null {
//! #     fn call(&self, _: &str, _: &serde_json::Value)
//! #         -> Result<serde_json::Value, remote::RemoteError> {
//! #         Ok(serde_json::Value::Null)
//! #     }
//! # }
//! # fn remote() -> Arc<dyn remote::RemoteService> { Arc::new(Null) }
//! # fn handlers() -> HandlerRegistry { HandlerRegistry::new() }
//!
//! let provider = Provider::configure(
//!     ProviderConfig::new("us-east-1"),
//!     remote(),
//!     handlers(),
//! );
//! let (plan, warnings) = provider
//!     .diff("aws_instance", None, &Default::default())
//!     .unwrap();
//! ```
//!
//! Resource behavior lives in [`lifecycle::ResourceHandler`]
//! implementations; the engine owns sequencing, failure-state persistence
//! and schema-version upgrades.

pub mod naming;
pub mod provider;

pub use provider::{Provider, ProviderConfig};

// The building blocks, re-exported for handler authors.
pub use lifecycle::{
    ApplyFailure, Engine, HandlerRegistry, LifecycleError, MutexRegistry, Op, Phase,
    ProviderContext, ResourceData, ResourceHandler, StateEnvelope, Timeouts,
};
pub use remote::{RemoteError, RemoteService};
pub use schemakit::{
    AttrKind, AttrMap, AttrPath, AttrSchema, AttrValue, FlatMap, Plan, PlanEntry, Presence,
    Schema, Validation, expand, flatten, hash_string,
};
pub use tagkit::{IgnoreFilter, TagDiff, TagMap, TagService, diff_tags, reconcile};
pub use waitkit::{Backoff, CancelToken, StateChange, WaitError, retry, retry_with};
