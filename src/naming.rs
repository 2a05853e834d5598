//! Name and name_prefix resolution.
//!
//! Many resource types accept either an explicit `name` or a `name_prefix`
//! to which a unique suffix is appended. Precedence is explicit name over
//! prefix over a fully generated name, codified here once instead of per
//! resource.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix used when neither a name nor a name_prefix is configured.
pub const DEFAULT_NAME_PREFIX: &str = "converge-";

/// A process-unique, time-sortable suffix: milliseconds since the epoch
/// followed by a per-process counter, both zero-padded so lexicographic
/// order matches creation order.
pub fn unique_suffix() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{millis:014}{count:08}")
}

/// Resolve the effective resource name: explicit `name` wins, then
/// `name_prefix` with a unique suffix, then a fully generated name.
pub fn resolve_name(name: Option<&str>, name_prefix: Option<&str>) -> String {
    match (name, name_prefix) {
        (Some(name), _) if !name.is_empty() => name.to_string(),
        (_, Some(prefix)) if !prefix.is_empty() => format!("{prefix}{}", unique_suffix()),
        _ => format!("{DEFAULT_NAME_PREFIX}{}", unique_suffix()),
    }
}
