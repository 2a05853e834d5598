//! The CRUD lifecycle engine.
//!
//! The engine is the only code that touches the state envelope. For each
//! operation it upgrades persisted state to the current schema version,
//! computes the plan, picks the path (create, update, replace, delete),
//! drives the handler, and decides what state the host must persist -
//! including after failures, where a half-created remote object must not
//! be forgotten.

use crate::data::ResourceData;
use crate::envelope::StateEnvelope;
use crate::error::{ApplyFailure, LifecycleError, Op, Result};
use crate::handler::{HandlerRegistry, ProviderContext, ResourceHandler};
use crate::migrate::upgrade;
use crate::timeouts::Timeouts;
use remote::RemoteError;
use schemakit::{AttrMap, Plan, PlanError, Validation, expand, validate};
use std::sync::Arc;

/// Drives resource handlers through validate, plan, apply, refresh,
/// destroy, and import.
#[derive(Default)]
pub struct Engine {
    handlers: HandlerRegistry,
}

impl Engine {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    fn handler(&self, type_name: &str) -> Result<&Arc<dyn ResourceHandler>> {
        self.handlers
            .get(type_name)
            .ok_or_else(|| LifecycleError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    /// Check a configuration against the type's schema without planning.
    pub fn validate(&self, type_name: &str, config: &AttrMap) -> Result<Validation> {
        let handler = self.handler(type_name)?;
        Ok(validate(handler.schema(), config))
    }

    /// Compute the plan for one instance. The prior state is upgraded to
    /// the current schema version first, and the handler gets a chance to
    /// customize the result.
    pub fn plan(
        &self,
        type_name: &str,
        prior: Option<&StateEnvelope>,
        config: &AttrMap,
        ctx: &ProviderContext,
    ) -> Result<(Plan, Vec<String>)> {
        let handler = self.handler(type_name)?;
        let prior_attrs = match prior {
            Some(env) => {
                let upgraded = upgrade(handler.as_ref(), env.clone())?;
                expand(handler.schema(), &upgraded.attributes)?
            }
            None => AttrMap::new(),
        };
        let (mut plan, warnings) = schemakit::plan(handler.schema(), &prior_attrs, config)
            .map_err(|PlanError::Validation(errors)| LifecycleError::Validation {
                type_name: type_name.to_string(),
                errors,
            })?;
        handler
            .customize_diff(&mut plan, ctx)
            .map_err(|source| LifecycleError::Handler {
                type_name: type_name.to_string(),
                id: prior.map(|e| e.id.clone()).unwrap_or_default(),
                op: Op::Read,
                source,
            })?;
        Ok((plan, warnings))
    }

    /// Reconcile one instance toward its configuration.
    ///
    /// Returns the state to persist: `Some` while the instance exists,
    /// `None` once it is gone. On failure the accompanying state (if any)
    /// must still be persisted by the host.
    pub fn apply(
        &self,
        type_name: &str,
        prior: Option<StateEnvelope>,
        config: &AttrMap,
        ctx: &ProviderContext,
    ) -> std::result::Result<Option<StateEnvelope>, ApplyFailure> {
        self.apply_with_timeouts(type_name, prior, config, None, ctx)
    }

    /// Like [`apply`](Self::apply), with explicit per-instance timeout
    /// overrides. Overrides are persisted with the instance and win over
    /// values persisted earlier.
    pub fn apply_with_timeouts(
        &self,
        type_name: &str,
        prior: Option<StateEnvelope>,
        config: &AttrMap,
        requested_timeouts: Option<Timeouts>,
        ctx: &ProviderContext,
    ) -> std::result::Result<Option<StateEnvelope>, ApplyFailure> {
        let handler = self.handler(type_name).map_err(ApplyFailure::bare)?;

        let prior = match prior {
            Some(env) => Some(upgrade(handler.as_ref(), env).map_err(ApplyFailure::bare)?),
            None => None,
        };
        let persisted_timeouts = requested_timeouts
            .or_else(|| prior.as_ref().and_then(|e| e.timeouts().copied()));
        let effective_timeouts = persisted_timeouts
            .map(|t| handler.timeouts().merged_with(&t))
            .unwrap_or_else(|| handler.timeouts());

        let (plan, _) = self
            .plan(type_name, prior.as_ref(), config, ctx)
            .map_err(ApplyFailure::bare)?;

        match prior {
            Some(prior_env) if prior_env.exists() => {
                if plan.is_empty() {
                    log::debug!("{type_name} ({}): no changes", prior_env.id);
                    return Ok(Some(prior_env));
                }
                if plan.requires_replacement() {
                    // Destroy the prior instance, then create fresh.
                    log::debug!("{type_name} ({}): plan forces replacement", prior_env.id);
                    self.run_delete(
                        handler.as_ref(),
                        type_name,
                        &prior_env,
                        effective_timeouts,
                        ctx,
                    )?;
                    let (create_plan, _) = self
                        .plan(type_name, None, config, ctx)
                        .map_err(ApplyFailure::bare)?;
                    self.run_create(
                        handler.as_ref(),
                        type_name,
                        create_plan,
                        effective_timeouts,
                        persisted_timeouts,
                        ctx,
                    )
                } else {
                    self.run_update(
                        handler.as_ref(),
                        type_name,
                        prior_env,
                        plan,
                        effective_timeouts,
                        persisted_timeouts,
                        ctx,
                    )
                }
            }
            _ => {
                if plan.is_empty() {
                    return Ok(None);
                }
                self.run_create(
                    handler.as_ref(),
                    type_name,
                    plan,
                    effective_timeouts,
                    persisted_timeouts,
                    ctx,
                )
            }
        }
    }

    /// Remove one instance. `Ok(None)` on success, including when the
    /// remote object was already gone.
    pub fn destroy(
        &self,
        type_name: &str,
        prior: StateEnvelope,
        ctx: &ProviderContext,
    ) -> std::result::Result<Option<StateEnvelope>, ApplyFailure> {
        let handler = self.handler(type_name).map_err(ApplyFailure::bare)?;
        let prior = upgrade(handler.as_ref(), prior).map_err(ApplyFailure::bare)?;
        if !prior.exists() {
            return Ok(None);
        }
        let timeouts = prior
            .timeouts()
            .map(|t| handler.timeouts().merged_with(t))
            .unwrap_or_else(|| handler.timeouts());
        self.run_delete(handler.as_ref(), type_name, &prior, timeouts, ctx)?;
        Ok(None)
    }

    /// Re-read one instance from the remote service. `Ok(None)` when it no
    /// longer exists.
    pub fn refresh(
        &self,
        type_name: &str,
        prior: StateEnvelope,
        ctx: &ProviderContext,
    ) -> Result<Option<StateEnvelope>> {
        let handler = self.handler(type_name)?;
        let prior = upgrade(handler.as_ref(), prior)?;
        if !prior.exists() {
            return Ok(None);
        }
        let persisted = prior.timeouts().copied();
        let timeouts = persisted
            .map(|t| handler.timeouts().merged_with(&t))
            .unwrap_or_else(|| handler.timeouts());
        let attrs = expand(handler.schema(), &prior.attributes)?;
        let mut data = ResourceData::new(
            handler.schema().clone(),
            attrs,
            Plan::default(),
            prior.id.clone(),
            timeouts,
        )?;
        match self.run_read(handler.as_ref(), type_name, &mut data, ctx) {
            Ok(true) => Ok(Some(self.envelope(handler.as_ref(), &data, persisted, true))),
            Ok(false) => {
                log::debug!("{type_name} ({}): gone on refresh", prior.id);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Adopt an existing remote object into state by id.
    pub fn import_state(
        &self,
        type_name: &str,
        id: &str,
        ctx: &ProviderContext,
    ) -> Result<Vec<StateEnvelope>> {
        let handler = self.handler(type_name)?;
        let mut data = ResourceData::new(
            handler.schema().clone(),
            AttrMap::new(),
            Plan::default(),
            id,
            handler.timeouts(),
        )?;
        handler
            .import_state(&mut data, ctx)
            .map_err(|source| LifecycleError::Handler {
                type_name: type_name.to_string(),
                id: id.to_string(),
                op: Op::Import,
                source,
            })?;
        if !self.run_read(handler.as_ref(), type_name, &mut data, ctx)? {
            return Err(LifecycleError::Handler {
                type_name: type_name.to_string(),
                id: id.to_string(),
                op: Op::Import,
                source: anyhow::anyhow!("resource does not exist"),
            });
        }
        Ok(vec![self.envelope(handler.as_ref(), &data, None, true)])
    }

    fn run_create(
        &self,
        handler: &dyn ResourceHandler,
        type_name: &str,
        plan: Plan,
        timeouts: Timeouts,
        persisted_timeouts: Option<Timeouts>,
        ctx: &ProviderContext,
    ) -> std::result::Result<Option<StateEnvelope>, ApplyFailure> {
        self.check_cancel(ctx).map_err(ApplyFailure::bare)?;

        let mut data =
            ResourceData::new(handler.schema().clone(), AttrMap::new(), plan, "", timeouts)
                .map_err(|e| ApplyFailure::bare(e.into()))?;

        log::debug!("{type_name}: creating");
        if let Err(source) = handler.create(&mut data, ctx) {
            let error = LifecycleError::Handler {
                type_name: type_name.to_string(),
                id: data.id().to_string(),
                op: Op::Create,
                source,
            };
            // An id means the remote object exists; the host must keep it.
            if data.id().is_empty() {
                return Err(ApplyFailure::bare(error));
            }
            let state = self.envelope(handler, &data, persisted_timeouts, false);
            return Err(ApplyFailure::with_state(error, state));
        }
        if data.id().is_empty() {
            return Err(ApplyFailure::bare(LifecycleError::MissingId {
                type_name: type_name.to_string(),
            }));
        }
        data.mark_new();
        log::debug!("{type_name} ({}): created", data.id());

        match self.run_read(handler, type_name, &mut data, ctx) {
            Ok(true) => Ok(Some(self.envelope(handler, &data, persisted_timeouts, true))),
            // Created but already gone again: report absence, not an
            // envelope with an empty id.
            Ok(false) => Ok(None),
            Err(error) => {
                // The object was created; persist what we have.
                let state = self.envelope(handler, &data, persisted_timeouts, true);
                Err(ApplyFailure::with_state(error, state))
            }
        }
    }

    fn run_update(
        &self,
        handler: &dyn ResourceHandler,
        type_name: &str,
        prior: StateEnvelope,
        plan: Plan,
        timeouts: Timeouts,
        persisted_timeouts: Option<Timeouts>,
        ctx: &ProviderContext,
    ) -> std::result::Result<Option<StateEnvelope>, ApplyFailure> {
        self.check_cancel(ctx).map_err(ApplyFailure::bare)?;

        if !handler.can_update() {
            return Err(ApplyFailure::bare(LifecycleError::UpdateUnsupported {
                type_name: type_name.to_string(),
            }));
        }
        let attrs = expand(handler.schema(), &prior.attributes)
            .map_err(|e| ApplyFailure::bare(e.into()))?;
        let mut data = ResourceData::new(
            handler.schema().clone(),
            attrs,
            plan,
            prior.id.clone(),
            timeouts,
        )
        .map_err(|e| ApplyFailure::bare(e.into()))?;

        log::debug!("{type_name} ({}): updating", prior.id);
        if let Err(source) = handler.update(&mut data, ctx) {
            let error = LifecycleError::Handler {
                type_name: type_name.to_string(),
                id: data.id().to_string(),
                op: Op::Update,
                source,
            };
            // Partial-mode writes record which steps really happened.
            let state = self.envelope(handler, &data, persisted_timeouts, false);
            return Err(ApplyFailure::with_state(error, state));
        }

        match self.run_read(handler, type_name, &mut data, ctx) {
            Ok(true) => Ok(Some(self.envelope(handler, &data, persisted_timeouts, true))),
            Ok(false) => Ok(None),
            Err(error) => {
                let state = self.envelope(handler, &data, persisted_timeouts, true);
                Err(ApplyFailure::with_state(error, state))
            }
        }
    }

    fn run_delete(
        &self,
        handler: &dyn ResourceHandler,
        type_name: &str,
        prior: &StateEnvelope,
        timeouts: Timeouts,
        ctx: &ProviderContext,
    ) -> std::result::Result<(), ApplyFailure> {
        self.check_cancel(ctx)
            .map_err(|e| ApplyFailure::with_state(e, prior.clone()))?;

        let attrs = expand(handler.schema(), &prior.attributes)
            .map_err(|e| ApplyFailure::bare(e.into()))?;
        let mut data = ResourceData::new(
            handler.schema().clone(),
            attrs,
            Plan::default(),
            prior.id.clone(),
            timeouts,
        )
        .map_err(|e| ApplyFailure::bare(e.into()))?;

        log::debug!("{type_name} ({}): deleting", prior.id);
        match handler.delete(&mut data, ctx) {
            Ok(()) => Ok(()),
            // Already gone counts as deleted.
            Err(err) if is_not_found(&err) => {
                log::debug!("{type_name} ({}): already gone", prior.id);
                Ok(())
            }
            Err(source) => {
                let error = LifecycleError::Handler {
                    type_name: type_name.to_string(),
                    id: prior.id.clone(),
                    op: Op::Delete,
                    source,
                };
                Err(ApplyFailure::with_state(error, prior.clone()))
            }
        }
    }

    /// Run the handler's read and report whether the instance still exists.
    /// A cleared id or a NotFound error both mean gone.
    fn run_read(
        &self,
        handler: &dyn ResourceHandler,
        type_name: &str,
        data: &mut ResourceData,
        ctx: &ProviderContext,
    ) -> Result<bool> {
        self.check_cancel(ctx)?;
        match handler.read(data, ctx) {
            Ok(()) => Ok(!data.id().is_empty()),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(source) => Err(LifecycleError::Handler {
                type_name: type_name.to_string(),
                id: data.id().to_string(),
                op: Op::Read,
                source,
            }),
        }
    }

    fn envelope(
        &self,
        handler: &dyn ResourceHandler,
        data: &ResourceData,
        persisted_timeouts: Option<Timeouts>,
        succeeded: bool,
    ) -> StateEnvelope {
        let env = StateEnvelope::new(
            handler.schema_version(),
            data.id(),
            data.final_attributes(succeeded),
        );
        match persisted_timeouts {
            Some(t) => env.with_timeouts(t),
            None => env,
        }
    }

    fn check_cancel(&self, ctx: &ProviderContext) -> Result<()> {
        if ctx.cancel.is_cancelled() {
            Err(LifecycleError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<RemoteError>()
        .is_some_and(RemoteError::is_not_found)
}
