//! The handler's view of one resource instance.
//!
//! [`ResourceData`] layers three attribute maps: the prior state, the
//! planned state (prior with the plan applied), and values the handler
//! wrote during this operation. Reads resolve newest-first and fall back
//! to the schema zero value, so handler code never branches on absence.

use crate::timeouts::{Phase, Timeouts};
use anyhow::{anyhow, bail};
use schemakit::{
    AttrKind, AttrMap, AttrPath, AttrValue, FlatError, FlatMap, Plan, Schema, Segment, expand,
    flatten,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Typed attribute access for a single instance during one CRUD operation.
#[derive(Debug)]
pub struct ResourceData {
    schema: Schema,
    prior: AttrMap,
    planned: AttrMap,
    plan: Plan,
    new: AttrMap,
    id: String,
    partial: bool,
    partial_keys: BTreeSet<String>,
    is_new: bool,
    timeouts: Timeouts,
}

impl ResourceData {
    /// Build the layered view for one operation. `planned` is derived by
    /// applying the plan to the flattened prior state and expanding back,
    /// so it covers both configured and surviving server-set attributes.
    pub fn new(
        schema: Schema,
        prior: AttrMap,
        plan: Plan,
        id: impl Into<String>,
        timeouts: Timeouts,
    ) -> Result<Self, FlatError> {
        let flat_planned = plan.apply_to(&flatten(&schema, &prior));
        let planned = expand(&schema, &flat_planned)?;
        Ok(Self {
            schema,
            prior,
            planned,
            plan,
            new: AttrMap::new(),
            id: id.into(),
            partial: false,
            partial_keys: BTreeSet::new(),
            is_new: false,
            timeouts,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// The current value at a dot-separated path: handler writes win over
    /// the planned state, which wins over the prior state. `#` and `%`
    /// leaves resolve to the collection length. Unset paths read as the
    /// schema zero value (`Int(0)` for cardinality markers); unknown ones
    /// as `String("")`.
    pub fn get(&self, key: &str) -> AttrValue {
        if let Some(v) = self.resolve(key, |name| self.lookup(name)) {
            return v;
        }
        self.zero_for(key)
    }

    /// Like [`get`](Self::get), but `None` when the path is unset in every
    /// layer. An explicitly written zero value is still `Some`.
    pub fn get_ok(&self, key: &str) -> Option<AttrValue> {
        self.resolve(key, |name| self.lookup(name))
    }

    /// The value before and after this operation's plan.
    pub fn get_change(&self, key: &str) -> (AttrValue, AttrValue) {
        let old = self
            .resolve(key, |name| self.prior.get(name))
            .unwrap_or_else(|| self.zero_for(key));
        let new = self.get(key);
        (old, new)
    }

    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        old != new
    }

    /// Record a value observed from or sent to the remote service.
    ///
    /// Unknown attribute names are an error: a typo here would otherwise
    /// silently drop state. Lists written to set attributes are re-keyed by
    /// element hash.
    pub fn set(&mut self, name: &str, value: impl Into<AttrValue>) -> anyhow::Result<()> {
        let attr = self
            .schema
            .get(name)
            .ok_or_else(|| anyhow!("set of unknown attribute {name:?}"))?;
        let value = value.into();
        let value = match (&attr.kind, value) {
            (AttrKind::Set(_), AttrValue::List(items)) => {
                let mut set = BTreeMap::new();
                for item in items {
                    let item = attr.normalize(&item);
                    set.insert(attr.hash_element(&item), item);
                }
                AttrValue::Set(set)
            }
            (_, v) => attr.normalize(&v),
        };
        if !attr.kind.accepts(&value) {
            bail!(
                "attribute {name:?} expects {}, got {}",
                attr.kind.name(),
                value.kind_name()
            );
        }
        self.new.insert(name.to_string(), value);
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Assign (or clear) the remote identifier. Clearing the id marks the
    /// instance as gone.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Once partial mode has been on, only attributes whitelisted through
    /// [`set_partial`](Self::set_partial) survive a failed operation; every
    /// other write is discarded on failure.
    pub fn partial(&mut self, on: bool) {
        self.partial = on;
    }

    /// Whitelist one attribute to persist even if the operation fails.
    pub fn set_partial(&mut self, name: &str) {
        self.partial_keys.insert(name.to_string());
    }

    /// True during the create that brought this instance into existence,
    /// including the post-create read.
    pub fn is_new_resource(&self) -> bool {
        self.is_new
    }

    pub(crate) fn mark_new(&mut self) {
        self.is_new = true;
    }

    pub fn timeout(&self, phase: Phase) -> Duration {
        self.timeouts.effective(phase)
    }

    /// The attribute map to persist once the operation finishes.
    ///
    /// On success the planned state is overlaid with everything the handler
    /// wrote. On failure with partial mode in play only whitelisted writes
    /// survive on top of the prior state; without partial mode every write
    /// survives, since each reflects a remote mutation that really happened.
    pub(crate) fn final_attributes(&self, succeeded: bool) -> FlatMap {
        let mut merged = if succeeded {
            self.planned.clone()
        } else {
            self.prior.clone()
        };
        for (name, value) in &self.new {
            if succeeded || !self.partial_was_used() || self.partial_keys.contains(name) {
                merged.insert(name.clone(), value.clone());
            }
        }
        flatten(&self.schema, &merged)
    }

    fn partial_was_used(&self) -> bool {
        self.partial || !self.partial_keys.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&AttrValue> {
        self.new
            .get(name)
            .or_else(|| self.planned.get(name))
            .or_else(|| self.prior.get(name))
    }

    /// Resolve a possibly-nested path against one layer stack, where
    /// `root_of` picks the top-level value.
    fn resolve<'a>(
        &'a self,
        key: &str,
        root_of: impl FnOnce(&str) -> Option<&'a AttrValue>,
    ) -> Option<AttrValue> {
        let path = AttrPath::parse(key).ok()?;
        let root = path.root()?;
        let root_val = root_of(root)?;
        if path.segments().len() == 1 {
            return Some(root_val.clone());
        }
        let mut map = AttrMap::new();
        map.insert(root.to_string(), root_val.clone());
        path.lookup(&map).map(std::borrow::Cow::into_owned)
    }

    /// Schema zero value for an unset path. Cardinality markers read as
    /// `Int(0)`; paths outside the schema read as the empty string.
    fn zero_for(&self, key: &str) -> AttrValue {
        let Ok(path) = AttrPath::parse(key) else {
            return AttrValue::String(String::new());
        };
        if matches!(
            path.segments().last(),
            Some(Segment::Count | Segment::MapLen)
        ) {
            return AttrValue::Int(0);
        }
        self.schema
            .lookup_path(&path)
            .map(|attr| attr.kind.zero())
            .unwrap_or_else(|| AttrValue::String(String::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemakit::{AttrSchema, plan};

    fn schema() -> Schema {
        Schema::new()
            .attr("ami", AttrSchema::required(AttrKind::String).force_new())
            .attr("instance_type", AttrSchema::required(AttrKind::String))
            .attr("private_ip", AttrSchema::computed(AttrKind::String))
            .attr("size", AttrSchema::optional(AttrKind::Int))
            .attr(
                "security_groups",
                AttrSchema::optional(AttrKind::Set(Box::new(AttrSchema::element(
                    AttrKind::String,
                )))),
            )
    }

    fn attrs(pairs: &[(&str, AttrValue)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn data_for(prior: AttrMap, config: AttrMap) -> ResourceData {
        let schema = schema();
        let (plan, _) = plan(&schema, &prior, &config).unwrap();
        ResourceData::new(schema, prior, plan, "i-123", Timeouts::default()).unwrap()
    }

    #[test]
    fn test_get_prefers_planned_over_prior() {
        let prior = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.micro")),
        ]);
        let config = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.large")),
        ]);
        let data = data_for(prior, config);
        assert_eq!(data.get("instance_type").as_str(), Some("t2.large"));
    }

    #[test]
    fn test_get_zero_fallback() {
        let data = data_for(AttrMap::new(), AttrMap::new());
        assert_eq!(data.get("size"), AttrValue::Int(0));
        assert_eq!(data.get("ami"), AttrValue::String(String::new()));
    }

    #[test]
    fn test_get_ok_distinguishes_unset_from_zero() {
        let mut data = data_for(AttrMap::new(), AttrMap::new());
        assert!(data.get_ok("size").is_none());
        data.set("size", 0i64).unwrap();
        assert_eq!(data.get_ok("size"), Some(AttrValue::Int(0)));
    }

    #[test]
    fn test_handler_write_wins() {
        let prior = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.micro")),
        ]);
        let mut data = data_for(prior.clone(), prior);
        data.set("private_ip", "10.0.0.5").unwrap();
        assert_eq!(data.get("private_ip").as_str(), Some("10.0.0.5"));
    }

    #[test]
    fn test_set_unknown_attribute_errors() {
        let mut data = data_for(AttrMap::new(), AttrMap::new());
        assert!(data.set("no_such_attr", "x").is_err());
    }

    #[test]
    fn test_set_type_mismatch_errors() {
        let mut data = data_for(AttrMap::new(), AttrMap::new());
        assert!(data.set("size", "not-an-int").is_err());
    }

    #[test]
    fn test_set_list_into_set_is_hashed() {
        let mut data = data_for(AttrMap::new(), AttrMap::new());
        data.set(
            "security_groups",
            AttrValue::List(vec![AttrValue::from("sg-1")]),
        )
        .unwrap();
        let AttrValue::Set(elems) = data.get("security_groups") else {
            panic!("expected set");
        };
        assert_eq!(elems.len(), 1);
    }

    #[test]
    fn test_get_nested_paths() {
        let mut data = data_for(AttrMap::new(), AttrMap::new());
        data.set(
            "security_groups",
            AttrValue::List(vec![AttrValue::from("sg-1"), AttrValue::from("sg-2")]),
        )
        .unwrap();
        // Cardinality marker resolves to the element count.
        assert_eq!(data.get("security_groups.#"), AttrValue::Int(2));
        // Unset collections read zero cardinality, not an error.
        let empty = data_for(AttrMap::new(), AttrMap::new());
        assert_eq!(empty.get("security_groups.#"), AttrValue::Int(0));
        assert!(empty.get_ok("security_groups.#").is_none());
    }

    #[test]
    fn test_get_change() {
        let prior = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.micro")),
        ]);
        let config = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.large")),
        ]);
        let data = data_for(prior, config);
        let (old, new) = data.get_change("instance_type");
        assert_eq!(old.as_str(), Some("t2.micro"));
        assert_eq!(new.as_str(), Some("t2.large"));
        assert!(data.has_change("instance_type"));
        assert!(!data.has_change("ami"));
    }

    #[test]
    fn test_final_attributes_success_merges_writes() {
        let config = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.micro")),
        ]);
        let mut data = data_for(AttrMap::new(), config);
        data.set("private_ip", "10.0.0.5").unwrap();
        let flat = data.final_attributes(true);
        assert_eq!(flat.get("ami").map(String::as_str), Some("ami-1"));
        assert_eq!(flat.get("private_ip").map(String::as_str), Some("10.0.0.5"));
    }

    #[test]
    fn test_final_attributes_failure_partial_keeps_only_marked() {
        let prior = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.micro")),
        ]);
        let config = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.large")),
        ]);
        let mut data = data_for(prior, config);
        data.partial(true);
        data.set("size", 5i64).unwrap();
        data.set_partial("size");
        data.set("private_ip", "10.0.0.5").unwrap();

        let flat = data.final_attributes(false);
        // Only the whitelisted write survives; a plain set under partial
        // mode is discarded on failure.
        assert_eq!(flat.get("size").map(String::as_str), Some("5"));
        assert!(!flat.contains_key("private_ip"));
        // Planned-but-unapplied changes roll back to prior.
        assert_eq!(
            flat.get("instance_type").map(String::as_str),
            Some("t2.micro")
        );
    }

    #[test]
    fn test_final_attributes_failure_without_partial_keeps_writes() {
        let config = attrs(&[
            ("ami", AttrValue::from("ami-1")),
            ("instance_type", AttrValue::from("t2.micro")),
        ]);
        let mut data = data_for(AttrMap::new(), config);
        data.set("private_ip", "10.0.0.5").unwrap();
        let flat = data.final_attributes(false);
        assert_eq!(flat.get("private_ip").map(String::as_str), Some("10.0.0.5"));
    }

    #[test]
    fn test_timeout_passthrough() {
        let schema = schema();
        let timeouts = Timeouts::new().with_create(Duration::from_secs(1800));
        let data =
            ResourceData::new(schema, AttrMap::new(), Plan::default(), "", timeouts).unwrap();
        assert_eq!(data.timeout(Phase::Create), Duration::from_secs(1800));
        assert_eq!(data.timeout(Phase::Delete), Duration::from_secs(600));
    }
}
