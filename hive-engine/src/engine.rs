//! # Engine Contract
//!
//! Define the policy-agnostic engine trait, the eviction hook, and the
//! factory that builds a concrete engine from a policy code.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: Policies hide behind one trait so the shell and
//!    the group layer stay policy-agnostic.
//! 2. **Byte Accounting**: Every entry is charged `key length + value size +
//!    policy overhead`; `size()` is always the exact sum over live entries.
//! 3. **No Hidden Locking**: Engines are plain `&mut self` structures; the
//!    caller owns serialization.

use crate::lfu::LfuEngine;
use crate::lru::LruEngine;

/// A value that reports its own byte size for budget accounting.
pub trait Measured {
    /// Number of bytes charged for this value.
    fn size(&self) -> usize;
}

impl Measured for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Measured for String {
    fn size(&self) -> usize {
        self.len()
    }
}

/// Eviction policy selector for [`build_engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Evict the least recently touched entry.
    #[default]
    Lru,
    /// Evict the least frequently used entry, oldest first within a tie.
    Lfu,
}

/// Hook fired with the owned entry after it has been removed from every
/// index. Runs synchronously inside `evict` and must not re-enter the
/// engine it is attached to.
pub type EvictHook<V> = Box<dyn FnMut(String, V) + Send>;

/// Errors surfaced by engine mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A single entry's charged size exceeds the whole byte budget.
    #[error("entry of {charged} bytes exceeds the cache budget of {max} bytes")]
    EntryTooLarge { charged: usize, max: usize },
}

/// Policy-agnostic in-memory cache engine.
///
/// Not safe for concurrent access; `get` mutates policy bookkeeping, so
/// even reads need exclusive access.
pub trait CacheEngine<V: Measured>: Send {
    /// Returns the value for `key`, touching policy bookkeeping on a hit.
    fn get(&mut self, key: &str) -> Option<&V>;

    /// Inserts or updates `key`, then evicts until the byte budget holds.
    ///
    /// With a non-zero budget, an entry whose charged size alone exceeds
    /// the budget is rejected with [`EngineError::EntryTooLarge`] and the
    /// engine is left untouched.
    fn add(&mut self, key: &str, value: V) -> Result<(), EngineError>;

    /// Removes the one entry chosen by the policy. No-op when empty.
    fn evict(&mut self);

    /// Number of live entries.
    fn len(&self) -> usize;

    /// Returns `true` when the engine holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Charged bytes across all live entries.
    fn size(&self) -> usize;
}

/// Builds a boxed engine for the requested policy.
///
/// A zero `max_bytes` disables the byte budget entirely.
pub fn build_engine<V: Measured + Send + 'static>(
    max_bytes: usize,
    on_evict: Option<EvictHook<V>>,
    policy: Policy,
) -> Box<dyn CacheEngine<V>> {
    match policy {
        Policy::Lru => Box::new(LruEngine::new(max_bytes, on_evict)),
        Policy::Lfu => Box::new(LfuEngine::new(max_bytes, on_evict)),
    }
}
