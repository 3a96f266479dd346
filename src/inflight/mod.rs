//! In-flight registry: at most one orchestration run per cache key.
//!
//! Acquisition never waits. A second run for a busy key is refused and the
//! caller reports `AlreadyProcessing` instead of queueing behind the first.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::fingerprint::CacheKey;

/// The set of keys that currently have a run in progress.
///
/// The lock is only held for the map operation itself, never across an
/// `.await`.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    slots: Mutex<Slots>,
}

/// Each acquisition gets a fresh generation so a guard can tell whether the
/// key it claimed is still its own.
#[derive(Debug, Default)]
struct Slots {
    owners: HashMap<CacheKey, u64>,
    next_generation: u64,
}

impl InFlightRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `key`.
    ///
    /// Returns a guard that releases the key, or `None` if another run
    /// already holds it.
    pub fn try_acquire(self: &Arc<Self>, key: &CacheKey) -> Option<InFlightGuard> {
        let generation = {
            let mut slots = self.slots.lock();
            if slots.owners.contains_key(key) {
                trace!(%key, "key already in flight");
                return None;
            }
            slots.next_generation += 1;
            let generation = slots.next_generation;
            slots.owners.insert(key.clone(), generation);
            generation
        };
        trace!(%key, generation, "key acquired");
        Some(InFlightGuard {
            registry: Arc::clone(self),
            key: key.clone(),
            generation,
            released: false,
        })
    }

    /// Removes `key` whoever holds it. Idempotent; returns whether the key
    /// was present.
    ///
    /// The guard that held the key is left unaware; once it is done, its own
    /// release does not touch a later owner of the same key.
    pub fn release(&self, key: &CacheKey) -> bool {
        let removed = self.slots.lock().owners.remove(key).is_some();
        if removed {
            trace!(%key, "key released");
        }
        removed
    }

    /// Removes `key` only if it is still held by `generation`.
    fn release_owned(&self, key: &CacheKey, generation: u64) -> bool {
        let mut slots = self.slots.lock();
        if slots.owners.get(key) != Some(&generation) {
            return false;
        }
        slots.owners.remove(key);
        trace!(%key, generation, "key released");
        true
    }

    /// Returns `true` if a run currently holds `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.lock().owners.contains_key(key)
    }

    /// Returns the number of keys in flight.
    pub fn len(&self) -> usize {
        self.slots.lock().owners.len()
    }

    /// Returns `true` if no run is in flight.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().owners.is_empty()
    }
}

/// Ownership of one in-flight key.
///
/// Call [`release`](Self::release) at the terminal step of a run. Dropping an
/// unreleased guard also releases the key, so a panicking run cannot leave
/// its key stuck. Either way only this guard's own claim is removed.
#[derive(Debug)]
pub struct InFlightGuard {
    registry: Arc<InFlightRegistry>,
    key: CacheKey,
    generation: u64,
    released: bool,
}

impl InFlightGuard {
    /// The key this guard holds.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Releases the key now.
    pub fn release(mut self) {
        self.registry.release_owned(&self.key, self.generation);
        self.released = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.released {
            self.registry.release_owned(&self.key, self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn key(s: &str) -> CacheKey {
        CacheKey::from_raw(s)
    }

    #[test]
    fn second_acquire_is_refused() {
        let registry = Arc::new(InFlightRegistry::new());
        let guard = registry.try_acquire(&key("a")).unwrap();
        assert!(registry.try_acquire(&key("a")).is_none());
        assert!(registry.try_acquire(&key("b")).is_some());
        guard.release();
        assert!(registry.try_acquire(&key("a")).is_some());
    }

    #[test]
    fn release_is_idempotent() {
        let registry = Arc::new(InFlightRegistry::new());
        let guard = registry.try_acquire(&key("a")).unwrap();
        assert!(registry.release(guard.key()));
        assert!(!registry.release(&key("a")));
        assert!(!registry.contains(&key("a")));
        // The guard's own release after a manual one is a no-op too.
        guard.release();
        assert!(registry.is_empty());
    }

    #[test]
    fn dropping_guard_releases() {
        let registry = Arc::new(InFlightRegistry::new());
        {
            let _guard = registry.try_acquire(&key("a")).unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn key_can_be_reacquired_after_release() {
        let registry = Arc::new(InFlightRegistry::new());
        registry.try_acquire(&key("a")).unwrap().release();
        let second = registry.try_acquire(&key("a")).unwrap();
        assert!(registry.contains(second.key()));
    }

    #[test]
    fn stale_guard_does_not_free_a_new_owner() {
        let registry = Arc::new(InFlightRegistry::new());
        let first = registry.try_acquire(&key("a")).unwrap();
        assert!(registry.release(&key("a")));
        let second = registry.try_acquire(&key("a")).unwrap();

        first.release();
        assert!(registry.contains(&key("a")));
        assert!(registry.try_acquire(&key("a")).is_none());

        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_guard_drop_does_not_free_a_new_owner() {
        let registry = Arc::new(InFlightRegistry::new());
        let first = registry.try_acquire(&key("a")).unwrap();
        registry.release(&key("a"));
        let _second = registry.try_acquire(&key("a")).unwrap();

        drop(first);
        assert!(registry.contains(&key("a")));
    }

    #[test]
    fn concurrent_acquire_has_one_winner() {
        let registry = Arc::new(InFlightRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.try_acquire(&key("hot")).map(std::mem::forget))
            })
            .collect();
        let winners = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(winners, 1);
        assert!(registry.contains(&key("hot")));
    }
}
