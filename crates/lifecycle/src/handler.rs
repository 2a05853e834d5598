//! The per-resource-type handler surface.
//!
//! A handler owns one resource type: its schema, its schema version and
//! upgrade path, and the CRUD operations against the remote service. The
//! engine drives handlers; handlers never touch the state envelope.

use crate::data::ResourceData;
use crate::mutex::MutexRegistry;
use crate::timeouts::Timeouts;
use anyhow::bail;
use remote::RemoteService;
use schemakit::{FlatMap, Plan, Schema};
use std::collections::BTreeMap;
use std::sync::Arc;
use waitkit::CancelToken;

/// Everything a handler needs beyond its own ResourceData: the remote
/// service client, caller identity, and cooperative-cancellation plumbing.
#[derive(Clone)]
pub struct ProviderContext {
    pub remote: Arc<dyn RemoteService>,
    pub account_id: String,
    pub region: String,
    pub partition: String,
    pub cancel: CancelToken,
    pub mutexes: Arc<MutexRegistry>,
}

impl ProviderContext {
    pub fn new(remote: Arc<dyn RemoteService>, region: impl Into<String>) -> Self {
        Self {
            remote,
            account_id: String::new(),
            region: region.into(),
            partition: "aws".to_string(),
            cancel: CancelToken::new(),
            mutexes: Arc::new(MutexRegistry::new()),
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = partition.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One resource type's behavior. `read` doubles as the refresh and the
/// post-create/post-update state sync; it clears the id (or the engine maps
/// a NotFound error) when the remote object is gone.
///
/// Phase timeouts are cooperative: the engine hands the merged budgets to
/// each operation through `ResourceData::timeout`, but it is the handler
/// that must pass them to its retry and wait loops. A handler that never
/// consults `data.timeout(phase)` runs unbounded.
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &str;

    fn schema(&self) -> &Schema;

    /// Version of the persisted attribute layout. Bump it when the flat
    /// form changes shape and handle the step in [`migrate`](Self::migrate).
    fn schema_version(&self) -> u64 {
        0
    }

    /// Upgrade a flat attribute map one version step, from `from` to
    /// `from + 1`. Called once per step until the persisted state reaches
    /// [`schema_version`](Self::schema_version).
    fn migrate(&self, from: u64, attributes: FlatMap) -> anyhow::Result<FlatMap> {
        let _ = from;
        Ok(attributes)
    }

    /// Declared per-phase timeout budgets; persisted overrides win.
    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Adjust the computed plan before execution: drop entries the service
    /// will reconcile itself, or veto changes that cannot apply.
    fn customize_diff(&self, plan: &mut Plan, ctx: &ProviderContext) -> anyhow::Result<()> {
        let _ = (plan, ctx);
        Ok(())
    }

    fn create(&self, data: &mut ResourceData, ctx: &ProviderContext) -> anyhow::Result<()>;

    fn read(&self, data: &mut ResourceData, ctx: &ProviderContext) -> anyhow::Result<()>;

    /// In-place update. The default refuses, which routes every change
    /// through replacement for types that only override `create`/`delete`.
    fn update(&self, data: &mut ResourceData, ctx: &ProviderContext) -> anyhow::Result<()> {
        let _ = (data, ctx);
        bail!("update not supported")
    }

    /// Whether this type supports in-place update at all. The engine turns
    /// `false` into a typed error before calling [`update`](Self::update).
    fn can_update(&self) -> bool {
        false
    }

    fn delete(&self, data: &mut ResourceData, ctx: &ProviderContext) -> anyhow::Result<()>;

    /// Seed state for `import`. The default passes the id through and lets
    /// the subsequent read fill the attributes.
    fn import_state(&self, data: &mut ResourceData, ctx: &ProviderContext) -> anyhow::Result<()> {
        let _ = (data, ctx);
        Ok(())
    }
}

/// Resource handlers by type name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.handlers
            .insert(handler.type_name().to_string(), handler);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn ResourceHandler>> {
        self.handlers.get(type_name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.handlers.keys()
    }
}
