//! Attribute schemas - the declarative description of a resource type
//!
//! A schema is a tree: `Object` and `List`/`Set` of `Object` nest
//! sub-schemas arbitrarily deep. Presence is exactly one of Required,
//! Optional, Computed, or Optional+Computed, enforced by construction.

use crate::hash::default_element_hash;
use crate::value::AttrValue;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of a custom validator: warnings do not block, errors do.
#[derive(Debug, Default, Clone)]
pub struct ValidateOutcome {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidateOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            warnings: Vec::new(),
            errors: vec![message.into()],
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warnings: vec![message.into()],
            errors: Vec::new(),
        }
    }
}

/// Pure validator over a configured value: `(key, value) -> outcome`.
pub type ValidateFn = Arc<dyn Fn(&str, &AttrValue) -> ValidateOutcome + Send + Sync>;

/// Masks a spurious diff: `(key, old, new, config) -> suppress`.
pub type DiffSuppressFn = Arc<dyn Fn(&str, &str, &str, &BTreeMap<String, AttrValue>) -> bool + Send + Sync>;

/// Normalizes a user-supplied value before it enters state.
pub type StateFn = Arc<dyn Fn(&AttrValue) -> AttrValue + Send + Sync>;

/// Stable integer hash of a set element.
pub type SetHashFn = Arc<dyn Fn(&AttrValue) -> i32 + Send + Sync>;

/// Presence class of an attribute. Exactly one applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Must be present in configuration.
    Required,
    /// May be present; a default may fill it in.
    Optional,
    /// Server-supplied only; cannot appear in configuration.
    Computed,
    /// User may set it, otherwise the server supplies it.
    OptionalComputed,
}

impl Presence {
    pub fn is_computed(self) -> bool {
        matches!(self, Self::Computed | Self::OptionalComputed)
    }

    pub fn allows_config(self) -> bool {
        !matches!(self, Self::Computed)
    }
}

/// Kind of an attribute, carrying element schemas for collections.
#[derive(Clone)]
pub enum AttrKind {
    String,
    Int,
    Float,
    Bool,
    /// Ordered collection; elements addressed by ordinal index.
    List(Box<AttrSchema>),
    /// Unordered collection; elements addressed by hash.
    Set(Box<AttrSchema>),
    /// String-keyed map of a single value kind.
    Map(Box<AttrSchema>),
    /// Nested block with its own named attributes.
    Object(Schema),
}

impl AttrKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
        }
    }

    /// Zero value of this kind, returned by reads of unset attributes.
    pub fn zero(&self) -> AttrValue {
        match self {
            Self::String => AttrValue::String(String::new()),
            Self::Int => AttrValue::Int(0),
            Self::Float => AttrValue::Float(0.0),
            Self::Bool => AttrValue::Bool(false),
            Self::List(_) => AttrValue::List(Vec::new()),
            Self::Set(_) => AttrValue::Set(BTreeMap::new()),
            Self::Map(_) => AttrValue::Map(BTreeMap::new()),
            Self::Object(_) => AttrValue::Object(BTreeMap::new()),
        }
    }

    /// Whether a value structurally matches this kind.
    pub fn accepts(&self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (Self::String, AttrValue::String(_))
                | (Self::Int, AttrValue::Int(_))
                | (Self::Float, AttrValue::Float(_) | AttrValue::Int(_))
                | (Self::Bool, AttrValue::Bool(_))
                | (Self::List(_), AttrValue::List(_))
                | (Self::Set(_), AttrValue::Set(_) | AttrValue::List(_))
                | (Self::Map(_), AttrValue::Map(_))
                | (Self::Object(_), AttrValue::Object(_))
        )
    }
}

impl fmt::Debug for AttrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Schema for a single attribute.
#[derive(Clone)]
pub struct AttrSchema {
    pub kind: AttrKind,
    pub presence: Presence,
    pub default: Option<AttrValue>,
    pub force_new: bool,
    pub sensitive: bool,
    pub validate: Option<ValidateFn>,
    pub diff_suppress: Option<DiffSuppressFn>,
    pub state_fn: Option<StateFn>,
    pub set_hash: Option<SetHashFn>,
    pub conflicts_with: Vec<String>,
    pub max_items: Option<usize>,
    pub min_items: Option<usize>,
}

impl AttrSchema {
    fn new(kind: AttrKind, presence: Presence) -> Self {
        Self {
            kind,
            presence,
            default: None,
            force_new: false,
            sensitive: false,
            validate: None,
            diff_suppress: None,
            state_fn: None,
            set_hash: None,
            conflicts_with: Vec::new(),
            max_items: None,
            min_items: None,
        }
    }

    pub fn required(kind: AttrKind) -> Self {
        Self::new(kind, Presence::Required)
    }

    pub fn optional(kind: AttrKind) -> Self {
        Self::new(kind, Presence::Optional)
    }

    pub fn computed(kind: AttrKind) -> Self {
        Self::new(kind, Presence::Computed)
    }

    pub fn optional_computed(kind: AttrKind) -> Self {
        Self::new(kind, Presence::OptionalComputed)
    }

    /// Element-only schema for collection members; presence is irrelevant
    /// below the top level.
    pub fn element(kind: AttrKind) -> Self {
        Self::new(kind, Presence::Optional)
    }

    /// Default value, legal on Optional attributes only.
    pub fn with_default(mut self, value: impl Into<AttrValue>) -> Self {
        debug_assert!(
            matches!(self.presence, Presence::Optional | Presence::OptionalComputed),
            "default on non-optional attribute"
        );
        self.default = Some(value.into());
        self
    }

    /// A change to this attribute triggers destroy+recreate.
    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Value is redacted in logs and plan output.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_validate(
        mut self,
        f: impl Fn(&str, &AttrValue) -> ValidateOutcome + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(f));
        self
    }

    pub fn with_diff_suppress(
        mut self,
        f: impl Fn(&str, &str, &str, &BTreeMap<String, AttrValue>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.diff_suppress = Some(Arc::new(f));
        self
    }

    pub fn with_state_fn(
        mut self,
        f: impl Fn(&AttrValue) -> AttrValue + Send + Sync + 'static,
    ) -> Self {
        self.state_fn = Some(Arc::new(f));
        self
    }

    pub fn with_set_hash(mut self, f: impl Fn(&AttrValue) -> i32 + Send + Sync + 'static) -> Self {
        self.set_hash = Some(Arc::new(f));
        self
    }

    pub fn conflicts_with(mut self, peers: &[&str]) -> Self {
        self.conflicts_with = peers.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn with_max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    pub fn with_min_items(mut self, min: usize) -> Self {
        self.min_items = Some(min);
        self
    }

    /// Hash a set element with the declared hash function, falling back to
    /// the canonical default.
    pub fn hash_element(&self, value: &AttrValue) -> i32 {
        match &self.set_hash {
            Some(f) => f(value),
            None => default_element_hash(value),
        }
    }

    /// Apply the state normalization function, if any.
    pub fn normalize(&self, value: &AttrValue) -> AttrValue {
        match &self.state_fn {
            Some(f) => f(value),
            None => value.clone(),
        }
    }
}

impl fmt::Debug for AttrSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttrSchema")
            .field("kind", &self.kind)
            .field("presence", &self.presence)
            .field("force_new", &self.force_new)
            .field("sensitive", &self.sensitive)
            .field("conflicts_with", &self.conflicts_with)
            .finish_non_exhaustive()
    }
}

/// A named map of attribute schemas for one resource type.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attrs: BTreeMap<String, AttrSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style: add an attribute.
    pub fn attr(mut self, name: &str, schema: AttrSchema) -> Self {
        self.attrs.insert(name.to_string(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrSchema> {
        self.attrs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrSchema)> {
        self.attrs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Resolve the schema of the attribute a flat path addresses, walking
    /// nested element schemas. `#` and `%` resolve to the collection itself.
    pub fn lookup_path(&self, path: &crate::path::AttrPath) -> Option<&AttrSchema> {
        use crate::path::Segment;

        let mut segs = path.segments().iter();
        let root = match segs.next() {
            Some(Segment::Field(s)) => s,
            _ => return None,
        };
        let mut current = self.get(root)?;

        for seg in segs {
            match seg {
                Segment::Count | Segment::MapLen => return Some(current),
                Segment::Num(_) => match &current.kind {
                    AttrKind::List(elem) | AttrKind::Set(elem) => current = elem,
                    _ => return None,
                },
                Segment::Field(name) => match &current.kind {
                    AttrKind::Object(nested) => current = nested.get(name)?,
                    // Map values share one schema regardless of key.
                    AttrKind::Map(elem) => current = elem,
                    _ => return None,
                },
            }
        }
        Some(current)
    }
}

/// Immutable lookup from resource type name to schema.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    types: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, type_name: &str, schema: Schema) -> Self {
        self.types.insert(type_name.to_string(), schema);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Schema> {
        self.types.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }
}
