//! # lifecycle
//!
//! The CRUD lifecycle engine for declarative resources:
//!
//! - **Engine**: validate, plan, apply, refresh, destroy, import; decides
//!   create vs update vs replace and owns failure-state persistence
//!   ([`engine`])
//! - **ResourceData**: the layered attribute view handlers read and write
//!   ([`data`])
//! - **Handlers**: the per-type trait and registry ([`handler`])
//! - **State envelope**: the persisted `(version, id, attributes, meta)`
//!   form ([`envelope`])
//! - **Migration**: stepwise schema-version upgrades ([`migrate`])
//! - **Timeouts**: per-phase budgets with persisted overrides
//!   ([`timeouts`])
//! - **Mutexes**: string-keyed serialization of conflicting remote calls
//!   ([`mutex`])

pub mod data;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod migrate;
pub mod mutex;
pub mod timeouts;

// Re-export main types at crate root
pub use data::ResourceData;
pub use engine::Engine;
pub use envelope::{Meta, StateEnvelope, TIMEOUTS_META_KEY};
pub use error::{ApplyFailure, LifecycleError, Op};
pub use handler::{HandlerRegistry, ProviderContext, ResourceHandler};
pub use migrate::upgrade;
pub use mutex::MutexRegistry;
pub use timeouts::{Phase, Timeouts, TimeoutsMeta};
