//! # tagkit
//!
//! Tag reconciliation shared across resource families.
//!
//! Computes add/remove diffs over `{key -> value}` tag maps and applies them
//! through per-service adapters, filtering server-owned keys (by default
//! anything matching `^aws:`). Tagging APIs are widely eventually
//! consistent, so every mutation runs through the retry framework.

use remote::RemoteError;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use waitkit::{CancelToken, Recoverable, WaitError, retry};

/// An ordered tag map with unique keys. The wire form differs per service;
/// every service uses this shape in the core.
pub type TagMap = BTreeMap<String, String>;

/// Default budget for one tag reconcile.
const DEFAULT_BUDGET: Duration = Duration::from_secs(2 * 60);

/// The changes one reconcile must apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    pub to_add: TagMap,
    pub to_remove: BTreeSet<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the tag diff assuming overwrite-on-tag semantics: a key present
/// in both with a different value appears in `to_add` only.
pub fn diff_tags(old: &TagMap, new: &TagMap) -> TagDiff {
    let mut diff = TagDiff::default();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            diff.to_add.insert(key.clone(), value.clone());
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            diff.to_remove.insert(key.clone());
        }
    }
    diff
}

/// Tag diff for services without overwrite semantics: a changed key appears
/// in both sets, and callers must apply removes before adds.
pub fn diff_tags_no_overwrite(old: &TagMap, new: &TagMap) -> TagDiff {
    let mut diff = diff_tags(old, new);
    for key in diff.to_add.keys() {
        if old.contains_key(key) {
            diff.to_remove.insert(key.clone());
        }
    }
    diff
}

/// Filter for server-owned tag keys that must never be added or removed.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    pattern: regex::Regex,
}

impl Default for IgnoreFilter {
    fn default() -> Self {
        // The `aws:` prefix is reserved for service-owned tags.
        Self::new("^aws:").expect("default ignore pattern is valid")
    }
}

impl IgnoreFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: regex::Regex::new(pattern)?,
        })
    }

    pub fn is_ignored(&self, key: &str) -> bool {
        self.pattern.is_match(key)
    }

    /// Drop ignored keys from both directions of a diff.
    pub fn apply(&self, diff: TagDiff) -> TagDiff {
        TagDiff {
            to_add: diff
                .to_add
                .into_iter()
                .filter(|(k, _)| !self.is_ignored(k))
                .collect(),
            to_remove: diff
                .to_remove
                .into_iter()
                .filter(|k| !self.is_ignored(k))
                .collect(),
        }
    }

    /// Drop ignored keys from a tag map, e.g. before writing tags to state.
    pub fn filter_map(&self, tags: &TagMap) -> TagMap {
        tags.iter()
            .filter(|(k, _)| !self.is_ignored(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Per-service tagging adapter. One batched call per direction.
pub trait TagService {
    fn add_tags(&self, resource_id: &str, tags: &TagMap) -> Result<(), RemoteError>;
    fn remove_tags(&self, resource_id: &str, keys: &BTreeSet<String>) -> Result<(), RemoteError>;
}

/// Reconcile one resource's tags: compute the filtered diff and apply it,
/// removes first, each direction as a single batched call through retry.
pub fn reconcile(
    service: &dyn TagService,
    resource_id: &str,
    old: &TagMap,
    new: &TagMap,
    filter: &IgnoreFilter,
    cancel: &CancelToken,
) -> Result<(), WaitError> {
    let diff = filter.apply(diff_tags(old, new));
    apply_diff(service, resource_id, &diff, cancel)
}

/// Replicate the same tag diff across a collection of related resource ids,
/// e.g. every volume attached to an instance.
pub fn reconcile_all<'a>(
    service: &dyn TagService,
    resource_ids: impl IntoIterator<Item = &'a str>,
    old: &TagMap,
    new: &TagMap,
    filter: &IgnoreFilter,
    cancel: &CancelToken,
) -> Result<(), WaitError> {
    let diff = filter.apply(diff_tags(old, new));
    for id in resource_ids {
        apply_diff(service, id, &diff, cancel)?;
    }
    Ok(())
}

fn apply_diff(
    service: &dyn TagService,
    resource_id: &str,
    diff: &TagDiff,
    cancel: &CancelToken,
) -> Result<(), WaitError> {
    if diff.is_empty() {
        return Ok(());
    }

    if !diff.to_remove.is_empty() {
        log::debug!("removing tags {:?} from {resource_id}", diff.to_remove);
        retry(DEFAULT_BUDGET, cancel, || {
            service
                .remove_tags(resource_id, &diff.to_remove)
                .map_err(Recoverable::classify)
        })?;
    }

    if !diff.to_add.is_empty() {
        log::debug!("setting tags {:?} on {resource_id}", diff.to_add);
        retry(DEFAULT_BUDGET, cancel, || {
            service
                .add_tags(resource_id, &diff.to_add)
                .map_err(Recoverable::classify)
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_diff_add_change_remove() {
        let old = tags(&[("Name", "web"), ("Stage", "dev")]);
        let new = tags(&[("Name", "api"), ("Env", "prod")]);
        let diff = diff_tags(&old, &new);
        assert_eq!(diff.to_add, tags(&[("Name", "api"), ("Env", "prod")]));
        assert_eq!(
            diff.to_remove,
            BTreeSet::from(["Stage".to_string()])
        );
        // Overwrite semantics: the changed key is not removed.
        assert!(!diff.to_remove.contains("Name"));
    }

    #[test]
    fn test_diff_no_overwrite_emits_both() {
        let old = tags(&[("Name", "web")]);
        let new = tags(&[("Name", "api")]);
        let diff = diff_tags_no_overwrite(&old, &new);
        assert!(diff.to_add.contains_key("Name"));
        assert!(diff.to_remove.contains("Name"));
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let t = tags(&[("Name", "web")]);
        assert!(diff_tags(&t, &t).is_empty());
    }

    #[test]
    fn test_ignore_filter_default() {
        let filter = IgnoreFilter::default();
        assert!(filter.is_ignored("aws:cloudformation:stack-name"));
        assert!(!filter.is_ignored("Name"));
        // Only a prefix match counts.
        assert!(!filter.is_ignored("my-aws:thing"));
    }

    #[test]
    fn test_ignored_keys_never_emitted() {
        let old = tags(&[("Name", "web"), ("aws:cloudformation:stack-name", "s")]);
        let new = tags(&[("Name", "api"), ("Env", "prod")]);
        let diff = IgnoreFilter::default().apply(diff_tags(&old, &new));
        assert_eq!(diff.to_add, tags(&[("Name", "api"), ("Env", "prod")]));
        assert!(diff.to_remove.is_empty());
    }

    /// In-memory tag store; fails transiently for a configurable number of
    /// calls to exercise the retry path.
    struct MemoryTags {
        store: Mutex<TagMap>,
        failures_left: Mutex<u32>,
    }

    impl MemoryTags {
        fn with_tags(initial: TagMap) -> Self {
            Self {
                store: Mutex::new(initial),
                failures_left: Mutex::new(0),
            }
        }

        fn failing(initial: TagMap, failures: u32) -> Self {
            Self {
                store: Mutex::new(initial),
                failures_left: Mutex::new(failures),
            }
        }

        fn maybe_fail(&self) -> Result<(), RemoteError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(RemoteError::Throttling);
            }
            Ok(())
        }
    }

    impl TagService for MemoryTags {
        fn add_tags(&self, _id: &str, tags: &TagMap) -> Result<(), RemoteError> {
            self.maybe_fail()?;
            self.store.lock().unwrap().extend(tags.clone());
            Ok(())
        }

        fn remove_tags(&self, _id: &str, keys: &BTreeSet<String>) -> Result<(), RemoteError> {
            self.maybe_fail()?;
            let mut store = self.store.lock().unwrap();
            for key in keys {
                store.remove(key);
            }
            Ok(())
        }
    }

    #[test]
    fn test_reconcile_applies_remove_then_add() {
        let svc = MemoryTags::with_tags(tags(&[
            ("Name", "web"),
            ("Stage", "dev"),
            ("aws:cloudformation:stack-name", "s"),
        ]));
        let old = tags(&[
            ("Name", "web"),
            ("Stage", "dev"),
            ("aws:cloudformation:stack-name", "s"),
        ]);
        let new = tags(&[("Name", "api"), ("Env", "prod")]);

        reconcile(
            &svc,
            "i-123",
            &old,
            &new,
            &IgnoreFilter::default(),
            &CancelToken::new(),
        )
        .unwrap();

        // Server-owned key survives untouched.
        let store = svc.store.lock().unwrap();
        assert_eq!(
            *store,
            tags(&[
                ("Name", "api"),
                ("Env", "prod"),
                ("aws:cloudformation:stack-name", "s"),
            ])
        );
    }

    #[test]
    fn test_reconcile_retries_throttling() {
        let svc = MemoryTags::failing(TagMap::new(), 2);
        let new = tags(&[("Name", "api")]);
        reconcile(
            &svc,
            "i-123",
            &TagMap::new(),
            &new,
            &IgnoreFilter::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(*svc.store.lock().unwrap(), new);
    }

    #[test]
    fn test_reconcile_all_replicates_diff() {
        let svc = MemoryTags::with_tags(TagMap::new());
        let new = tags(&[("Name", "api")]);
        reconcile_all(
            &svc,
            ["vol-1", "vol-2"],
            &TagMap::new(),
            &new,
            &IgnoreFilter::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(*svc.store.lock().unwrap(), new);
    }

    #[test]
    fn test_apply_remove_then_add_yields_new() {
        // Property: applying to_remove then to_add over old yields exactly
        // new restricted to non-ignored keys, ignored keys unchanged.
        let filter = IgnoreFilter::default();
        let old = tags(&[("A", "1"), ("B", "2"), ("aws:owned", "x")]);
        let new = tags(&[("A", "9"), ("C", "3"), ("aws:owned", "y")]);
        let diff = filter.apply(diff_tags(&old, &new));

        let mut result = old.clone();
        for key in &diff.to_remove {
            result.remove(key);
        }
        result.extend(diff.to_add.clone());

        let mut expected = filter.filter_map(&new);
        expected.insert("aws:owned".to_string(), "x".to_string());
        assert_eq!(result, expected);
    }
}
