//! Named-mutex registry.
//!
//! Some remote resources reject concurrent mutation by the same client
//! (attach/detach on one instance, rule edits on one security group).
//! Handlers serialize those through a process-wide registry of string-keyed
//! exclusive locks. Acquisition is scoped: the lock is released on every
//! exit path because the critical section is a closure.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

/// String-keyed, non-reentrant exclusive locks.
///
/// Tests construct their own registries; production code shares
/// [`MutexRegistry::global`].
#[derive(Debug, Default)]
pub struct MutexRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<MutexRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Run `f` while holding the named lock, blocking until it is free.
    ///
    /// Non-reentrant: calling `with_lock` for the same key from inside `f`
    /// deadlocks.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        log::debug!("acquiring lock {key:?}");
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f();
        drop(guard);
        log::debug!("released lock {key:?}");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn test_lock_serializes_same_key() {
        let registry = Arc::new(MutexRegistry::new());
        let active = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let active = Arc::clone(&active);
            let max_seen = Arc::clone(&max_seen);
            handles.push(std::thread::spawn(move || {
                registry.with_lock("ec2-i-123", || {
                    let n = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(n, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_different_keys_do_not_block() {
        let registry = MutexRegistry::new();
        registry.with_lock("a", || {
            // A nested acquisition of a different key must not deadlock.
            registry.with_lock("b", || {});
        });
    }

    #[test]
    fn test_returns_closure_value() {
        let registry = MutexRegistry::new();
        let value = registry.with_lock("k", || 42);
        assert_eq!(value, 42);
    }
}
