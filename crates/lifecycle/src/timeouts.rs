//! Per-phase operation timeouts.
//!
//! Each CRUD phase has a default budget which resources may override; the
//! effective value also honors timeouts persisted with the instance, so a
//! resource created with a long create budget keeps it across upgrades.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A lifecycle phase with a timeout budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Read,
    Update,
    Delete,
    /// Fallback used when no phase-specific value is configured.
    Default,
}

const DEFAULT_CREATE: Duration = Duration::from_secs(10 * 60);
const DEFAULT_READ: Duration = Duration::from_secs(20 * 60);
const DEFAULT_UPDATE: Duration = Duration::from_secs(10 * 60);
const DEFAULT_DELETE: Duration = Duration::from_secs(10 * 60);

/// Per-resource timeout overrides. Unset phases fall back to `default`,
/// then to the built-in phase defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
    pub default: Option<Duration>,
}

impl Timeouts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = Some(d);
        self
    }

    pub fn with_read(mut self, d: Duration) -> Self {
        self.read = Some(d);
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = Some(d);
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = Some(d);
        self
    }

    pub fn with_default(mut self, d: Duration) -> Self {
        self.default = Some(d);
        self
    }

    /// The effective budget for one phase.
    pub fn effective(&self, phase: Phase) -> Duration {
        let (configured, fallback) = match phase {
            Phase::Create => (self.create, DEFAULT_CREATE),
            Phase::Read => (self.read, DEFAULT_READ),
            Phase::Update => (self.update, DEFAULT_UPDATE),
            Phase::Delete => (self.delete, DEFAULT_DELETE),
            Phase::Default => (self.default, DEFAULT_CREATE),
        };
        configured.or(self.default).unwrap_or(fallback)
    }

    /// Overlay persisted per-instance values over the handler's declared
    /// timeouts; the persisted values win.
    pub fn merged_with(&self, persisted: &Timeouts) -> Timeouts {
        Timeouts {
            create: persisted.create.or(self.create),
            read: persisted.read.or(self.read),
            update: persisted.update.or(self.update),
            delete: persisted.delete.or(self.delete),
            default: persisted.default.or(self.default),
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// The persisted wire form: phase name to whole seconds.
pub type TimeoutsMeta = BTreeMap<String, u64>;

impl Timeouts {
    pub fn to_meta(&self) -> TimeoutsMeta {
        let mut meta = TimeoutsMeta::new();
        for (name, value) in [
            ("create", self.create),
            ("read", self.read),
            ("update", self.update),
            ("delete", self.delete),
            ("default", self.default),
        ] {
            if let Some(d) = value {
                meta.insert(name.to_string(), d.as_secs());
            }
        }
        meta
    }

    pub fn from_meta(meta: &TimeoutsMeta) -> Self {
        let get = |name: &str| meta.get(name).map(|s| Duration::from_secs(*s));
        Self {
            create: get("create"),
            read: get("read"),
            update: get("update"),
            delete: get("delete"),
            default: get("default"),
        }
    }
}

// Serde goes through the meta form so the persisted shape stays flat.
impl Serialize for Timeouts {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_meta().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Timeouts {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let meta = TimeoutsMeta::deserialize(deserializer)?;
        Ok(Self::from_meta(&meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let t = Timeouts::default();
        assert_eq!(t.effective(Phase::Create), Duration::from_secs(600));
        assert_eq!(t.effective(Phase::Update), Duration::from_secs(600));
        assert_eq!(t.effective(Phase::Delete), Duration::from_secs(600));
        assert_eq!(t.effective(Phase::Read), Duration::from_secs(1200));
    }

    #[test]
    fn test_default_phase_fallback() {
        let t = Timeouts::new().with_default(Duration::from_secs(60));
        assert_eq!(t.effective(Phase::Create), Duration::from_secs(60));
        assert_eq!(t.effective(Phase::Delete), Duration::from_secs(60));
    }

    #[test]
    fn test_phase_override_beats_default() {
        let t = Timeouts::new()
            .with_default(Duration::from_secs(60))
            .with_create(Duration::from_secs(1800));
        assert_eq!(t.effective(Phase::Create), Duration::from_secs(1800));
        assert_eq!(t.effective(Phase::Read), Duration::from_secs(60));
    }

    #[test]
    fn test_persisted_wins_on_merge() {
        let declared = Timeouts::new().with_create(Duration::from_secs(600));
        let persisted = Timeouts::new().with_create(Duration::from_secs(1800));
        let merged = declared.merged_with(&persisted);
        assert_eq!(merged.effective(Phase::Create), Duration::from_secs(1800));
    }

    #[test]
    fn test_meta_roundtrip() {
        let t = Timeouts::new()
            .with_create(Duration::from_secs(900))
            .with_delete(Duration::from_secs(300));
        let meta = t.to_meta();
        assert_eq!(meta.get("create"), Some(&900));
        assert_eq!(Timeouts::from_meta(&meta), t);
    }
}
