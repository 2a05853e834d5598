//! The host-facing provider surface.
//!
//! A [`Provider`] is configured once per process with the remote service
//! client and the handler registry, then serves validate, diff, apply,
//! refresh, destroy and import calls per resource instance. All state
//! envelopes pass through the migrator before use, so hosts never see a
//! stale schema version.

use lifecycle::{
    ApplyFailure, Engine, HandlerRegistry, LifecycleError, MutexRegistry, ProviderContext,
    StateEnvelope, Timeouts,
};
use remote::RemoteService;
use schemakit::{AttrMap, Plan, Validation};
use std::sync::Arc;
use waitkit::CancelToken;

/// Provider-level configuration, supplied once at [`Provider::configure`].
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub region: String,
    pub account_id: String,
    pub partition: String,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: String::new(),
            partition: "aws".to_string(),
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
}

/// The configured client bundle plus the engine driving all handlers.
pub struct Provider {
    engine: Engine,
    ctx: ProviderContext,
}

impl Provider {
    /// Build the provider: one client bundle, one cancellation token, one
    /// mutex registry, shared by every subsequent call.
    pub fn configure(
        config: ProviderConfig,
        remote: Arc<dyn RemoteService>,
        handlers: HandlerRegistry,
    ) -> Self {
        log::debug!(
            "configuring provider for region {} (partition {})",
            config.region,
            config.partition
        );
        let ctx = ProviderContext {
            remote,
            account_id: config.account_id,
            region: config.region,
            partition: config.partition,
            cancel: CancelToken::new(),
            mutexes: Arc::new(MutexRegistry::new()),
        };
        Self {
            engine: Engine::new(handlers),
            ctx,
        }
    }

    /// The cancellation token hosts trip to wind down in-flight operations.
    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel.clone()
    }

    pub fn context(&self) -> &ProviderContext {
        &self.ctx
    }

    /// Check a raw configuration against the type's schema.
    pub fn validate(
        &self,
        type_name: &str,
        config: &AttrMap,
    ) -> Result<Validation, LifecycleError> {
        self.engine.validate(type_name, config)
    }

    /// Compute the plan for one instance; `(plan, warnings)`.
    pub fn diff(
        &self,
        type_name: &str,
        prior: Option<&StateEnvelope>,
        config: &AttrMap,
    ) -> Result<(Plan, Vec<String>), LifecycleError> {
        self.engine.plan(type_name, prior, config, &self.ctx)
    }

    /// Reconcile one instance toward its configuration. On failure the
    /// returned state, if any, must still be persisted by the host.
    pub fn apply(
        &self,
        type_name: &str,
        prior: Option<StateEnvelope>,
        config: &AttrMap,
    ) -> Result<Option<StateEnvelope>, ApplyFailure> {
        self.engine.apply(type_name, prior, config, &self.ctx)
    }

    /// [`apply`](Self::apply) with per-instance timeout overrides, which
    /// are persisted with the instance.
    pub fn apply_with_timeouts(
        &self,
        type_name: &str,
        prior: Option<StateEnvelope>,
        config: &AttrMap,
        timeouts: Option<Timeouts>,
    ) -> Result<Option<StateEnvelope>, ApplyFailure> {
        self.engine
            .apply_with_timeouts(type_name, prior, config, timeouts, &self.ctx)
    }

    /// Re-read one instance; `Ok(None)` when it no longer exists remotely.
    pub fn refresh(
        &self,
        type_name: &str,
        prior: StateEnvelope,
    ) -> Result<Option<StateEnvelope>, LifecycleError> {
        self.engine.refresh(type_name, prior, &self.ctx)
    }

    /// Remove one instance; tolerant of the remote object already being
    /// gone.
    pub fn destroy(
        &self,
        type_name: &str,
        prior: StateEnvelope,
    ) -> Result<Option<StateEnvelope>, ApplyFailure> {
        self.engine.destroy(type_name, prior, &self.ctx)
    }

    /// Adopt existing remote objects into state by id.
    pub fn import_state(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Vec<StateEnvelope>, LifecycleError> {
        self.engine.import_state(type_name, id, &self.ctx)
    }
}
