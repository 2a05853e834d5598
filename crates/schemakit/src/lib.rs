//! # schemakit
//!
//! Typed attribute schemas and plan computation for declarative resources.
//!
//! This crate is the pure, side-effect-free half of the reconciliation core:
//!
//! - **Schema**: a declarative description of a resource type's attributes -
//!   kinds, presence (Required/Optional/Computed), defaults, validators,
//!   diff suppressors, set hash functions ([`attribute`])
//! - **Values**: the tagged-union tree handlers operate on ([`value`])
//! - **Paths**: dot-separated addressing with numeric and hash indices
//!   ([`path`])
//! - **Flat codec**: the historical `path -> string` persisted form, with
//!   `#`/`%` cardinality markers ([`flatmap`])
//! - **Validation**: configuration checks that run once per plan
//!   ([`validate`])
//! - **Diff**: the plan of per-attribute changes between prior state and
//!   configuration ([`diff`])
//! - **Hashing**: stable set-element and composite identifier hashes
//!   ([`hash`])

pub mod attribute;
pub mod diff;
pub mod flatmap;
pub mod hash;
pub mod path;
pub mod validate;
pub mod value;

// Re-export main types at crate root
pub use attribute::{
    AttrKind, AttrSchema, DiffSuppressFn, Presence, Schema, SchemaRegistry, SetHashFn, StateFn,
    ValidateFn, ValidateOutcome,
};
pub use diff::{Plan, PlanEntry, PlanError, normalize_config, plan};
pub use flatmap::{FlatError, FlatMap, expand, flatten};
pub use hash::{CompositeHasher, default_element_hash, hash_string};
pub use path::{AttrPath, PathError, Segment};
pub use validate::{ValidateError, Validation, validate};
pub use value::{AttrMap, AttrValue};
