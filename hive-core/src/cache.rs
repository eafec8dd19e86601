//! # Cache Shell
//!
//! One mutex around one lazily-built engine. Every engine touch, including
//! the read-side reorder a policy makes on `get`, happens under the lock,
//! which is what lets the engines themselves stay single-threaded.

use hive_engine::{build_engine, CacheEngine, EngineError, Policy};
use parking_lot::Mutex;

use crate::byteview::ByteView;

/// Concurrency-safe wrapper around one eviction engine.
///
/// The engine is built on the first `add` so that a group which only ever
/// proxies to remote owners never pays for an engine at all.
pub(crate) struct LocalCache {
    engine: Mutex<Option<Box<dyn CacheEngine<ByteView>>>>,
    max_bytes: usize,
    policy: Policy,
}

impl LocalCache {
    pub(crate) fn new(max_bytes: usize, policy: Policy) -> Self {
        LocalCache {
            engine: Mutex::new(None),
            max_bytes,
            policy,
        }
    }

    /// Returns a view on hit; `None` both on miss and before the first add.
    pub(crate) fn get(&self, key: &str) -> Option<ByteView> {
        let mut engine = self.engine.lock();
        engine.as_mut()?.get(key).cloned()
    }

    /// Inserts a view, building the engine on first use.
    pub(crate) fn add(&self, key: &str, value: ByteView) -> Result<(), EngineError> {
        let mut engine = self.engine.lock();
        engine
            .get_or_insert_with(|| build_engine(self.max_bytes, None, self.policy))
            .add(key, value)
    }

    /// Entry count and charged bytes; zeros before the engine exists.
    pub(crate) fn stats(&self) -> (usize, usize) {
        let engine = self.engine.lock();
        engine
            .as_ref()
            .map(|engine| (engine.len(), engine.size()))
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_before_first_add_misses() {
        let cache = LocalCache::new(0, Policy::Lru);
        assert!(cache.get("anything").is_none());
        assert_eq!(cache.stats(), (0, 0));
    }

    #[test]
    fn add_builds_engine_lazily() {
        let cache = LocalCache::new(0, Policy::Lru);
        cache.add("alpha", ByteView::from("value")).unwrap();
        assert_eq!(cache.get("alpha"), Some(ByteView::from("value")));
        assert_eq!(cache.stats(), (1, "alpha".len() + "value".len()));
    }

    #[test]
    fn configured_budget_reaches_the_engine() {
        let cache = LocalCache::new(10, Policy::Lru);
        let err = cache.add("key", ByteView::from(vec![0u8; 64])).unwrap_err();
        assert!(matches!(err, EngineError::EntryTooLarge { .. }));
    }

    #[test]
    fn lfu_policy_charges_frequency_overhead() {
        let cache = LocalCache::new(0, Policy::Lfu);
        cache.add("k", ByteView::from("v")).unwrap();
        assert_eq!(cache.stats(), (1, 1 + 1 + 4));
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;
        use std::thread;

        let cache = Arc::new(LocalCache::new(0, Policy::Lru));
        let mut handles = Vec::new();
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    let key = format!("t{t}-{i}");
                    cache.add(&key, ByteView::from("x")).unwrap();
                    assert!(cache.get(&key).is_some());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.stats().0, 400);
    }
}
