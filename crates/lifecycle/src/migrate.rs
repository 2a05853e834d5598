//! Stepwise state upgrades.
//!
//! Persisted state carries the schema version that wrote it. Before any
//! plan or operation, the engine walks the state forward one version at a
//! time through the handler's `migrate` hook. Upgrades are all-or-nothing:
//! a failed step leaves the persisted state untouched.

use crate::envelope::StateEnvelope;
use crate::error::{LifecycleError, Result};
use crate::handler::ResourceHandler;

/// Bring `envelope` up to the handler's current schema version.
pub fn upgrade(handler: &dyn ResourceHandler, envelope: StateEnvelope) -> Result<StateEnvelope> {
    let current = handler.schema_version();
    if envelope.schema_version == current {
        return Ok(envelope);
    }
    if envelope.schema_version > current {
        return Err(LifecycleError::Migration {
            type_name: handler.type_name().to_string(),
            from: envelope.schema_version,
            message: format!(
                "state was written by schema version {}, newer than supported version {current}",
                envelope.schema_version
            ),
        });
    }

    let mut attributes = envelope.attributes;
    for from in envelope.schema_version..current {
        log::debug!(
            "{}: upgrading state {} from schema version {from}",
            handler.type_name(),
            envelope.id
        );
        attributes =
            handler
                .migrate(from, attributes)
                .map_err(|err| LifecycleError::Migration {
                    type_name: handler.type_name().to_string(),
                    from,
                    message: err.to_string(),
                })?;
    }

    let mut upgraded = StateEnvelope::new(current, envelope.id, attributes);
    upgraded.meta = envelope.meta;
    Ok(upgraded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ResourceData;
    use crate::handler::ProviderContext;
    use anyhow::bail;
    use schemakit::{AttrKind, AttrSchema, FlatMap, Schema};
    use std::sync::OnceLock;

    struct VersionedHandler {
        version: u64,
        fail_at: Option<u64>,
    }

    impl ResourceHandler for VersionedHandler {
        fn type_name(&self) -> &str {
            "aws_key_pair"
        }

        fn schema(&self) -> &Schema {
            static SCHEMA: OnceLock<Schema> = OnceLock::new();
            SCHEMA.get_or_init(|| {
                Schema::new().attr("public_key", AttrSchema::optional(AttrKind::String))
            })
        }

        fn schema_version(&self) -> u64 {
            self.version
        }

        fn migrate(&self, from: u64, mut attributes: FlatMap) -> anyhow::Result<FlatMap> {
            if self.fail_at == Some(from) {
                bail!("cannot parse legacy field");
            }
            attributes.insert(format!("migrated_{from}"), "yes".to_string());
            Ok(attributes)
        }

        fn create(&self, _: &mut ResourceData, _: &ProviderContext) -> anyhow::Result<()> {
            Ok(())
        }

        fn read(&self, _: &mut ResourceData, _: &ProviderContext) -> anyhow::Result<()> {
            Ok(())
        }

        fn delete(&self, _: &mut ResourceData, _: &ProviderContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_current_version_is_untouched() {
        let handler = VersionedHandler {
            version: 2,
            fail_at: None,
        };
        let env = StateEnvelope::new(2, "key-1", FlatMap::new());
        let out = upgrade(&handler, env.clone()).unwrap();
        assert_eq!(out, env);
    }

    #[test]
    fn test_stepwise_upgrade_runs_every_version() {
        let handler = VersionedHandler {
            version: 3,
            fail_at: None,
        };
        let env = StateEnvelope::new(1, "key-1", FlatMap::new());
        let out = upgrade(&handler, env).unwrap();
        assert_eq!(out.schema_version, 3);
        assert!(out.attributes.contains_key("migrated_1"));
        assert!(out.attributes.contains_key("migrated_2"));
        assert!(!out.attributes.contains_key("migrated_0"));
    }

    #[test]
    fn test_failed_step_is_an_error() {
        let handler = VersionedHandler {
            version: 3,
            fail_at: Some(2),
        };
        let env = StateEnvelope::new(1, "key-1", FlatMap::new());
        let err = upgrade(&handler, env).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Migration { from: 2, .. }
        ));
    }

    #[test]
    fn test_newer_than_supported_is_an_error() {
        let handler = VersionedHandler {
            version: 1,
            fail_at: None,
        };
        let env = StateEnvelope::new(5, "key-1", FlatMap::new());
        assert!(matches!(
            upgrade(&handler, env),
            Err(LifecycleError::Migration { from: 5, .. })
        ));
    }

    #[test]
    fn test_meta_survives_upgrade() {
        use crate::timeouts::Timeouts;
        use std::time::Duration;
        let handler = VersionedHandler {
            version: 2,
            fail_at: None,
        };
        let env = StateEnvelope::new(0, "key-1", FlatMap::new())
            .with_timeouts(Timeouts::new().with_create(Duration::from_secs(900)));
        let out = upgrade(&handler, env).unwrap();
        assert!(out.timeouts().is_some());
    }
}
