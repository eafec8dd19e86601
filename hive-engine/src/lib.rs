//! # Hive Engine
//!
//! Byte-budgeted in-memory eviction engines for the cache mesh. Two
//! policies share one contract: LRU (recency) and LFU (frequency), both
//! built as index-linked node arenas with O(1) lookup and eviction.
//!
//! Engines are single-threaded; callers serialize access through a
//! mutex-guarded shell one level up.

mod engine;
mod lfu;
mod lru;

pub use engine::{build_engine, CacheEngine, EngineError, EvictHook, Measured, Policy};
pub use lfu::LfuEngine;
pub use lru::LruEngine;
