//! # LRU Engine
//!
//! Least-recently-used store with byte-based eviction. Uses an index-linked
//! node arena (no heap pointers, no unsafe) plus a hash map for O(1)
//! lookup, promotion, and eviction.
//!
//! ```text
//! LruEngine
//!   ├── map: HashMap<String, usize>
//!   └── nodes: Vec<Option<Node>>
//!         └── Node { key, value, prev, next }
//!               head (oldest) ◀──▶ ... ◀──▶ tail (most recent)
//! ```
//!
//! After every insert the engine evicts from the head while
//! `used_bytes >= max_bytes`, which drives usage strictly below the cap
//! rather than merely back to it.

use ahash::RandomState;
use hashbrown::HashMap;

use crate::engine::{CacheEngine, EngineError, EvictHook, Measured};

/// Single key/value entry with its recency links.
struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Byte-budgeted LRU cache engine.
pub struct LruEngine<V> {
    /// Key -> node index for O(1) lookup.
    map: HashMap<String, usize, RandomState>,
    /// Dense node storage; recency links are indices into this arena.
    nodes: Vec<Option<Node<V>>>,
    /// Free-list for recycling node slots under churn.
    free: Vec<usize>,
    /// Least recently used node.
    head: Option<usize>,
    /// Most recently used node.
    tail: Option<usize>,
    /// Byte budget; zero disables the bound.
    max_bytes: usize,
    /// Charged bytes across live entries.
    used_bytes: usize,
    on_evict: Option<EvictHook<V>>,
}

impl<V: Measured> LruEngine<V> {
    /// Creates an engine with the given budget and optional eviction hook.
    pub fn new(max_bytes: usize, on_evict: Option<EvictHook<V>>) -> Self {
        LruEngine {
            map: HashMap::default(),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            max_bytes,
            used_bytes: 0,
            on_evict,
        }
    }

    /// Detaches `idx` from the recency list.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.nodes[idx].as_ref().expect("live node");
            (node.prev, node.next)
        };

        if let Some(prev_idx) = prev {
            if let Some(prev_node) = self.nodes[prev_idx].as_mut() {
                prev_node.next = next;
            }
        } else {
            self.head = next;
        }

        if let Some(next_idx) = next {
            if let Some(next_node) = self.nodes[next_idx].as_mut() {
                next_node.prev = prev;
            }
        } else {
            self.tail = prev;
        }

        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    /// Appends `idx` at the tail (most recently used).
    fn push_back(&mut self, idx: usize) {
        let tail = self.tail;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = tail;
            node.next = None;
        }

        if let Some(tail_idx) = tail {
            if let Some(tail_node) = self.nodes[tail_idx].as_mut() {
                tail_node.next = Some(idx);
            }
        } else {
            self.head = Some(idx);
        }

        self.tail = Some(idx);
    }

    /// Marks `idx` as most recently used; skips relinking when already tail.
    fn touch(&mut self, idx: usize) {
        if self.tail == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_back(idx);
    }

    /// Inserts a fresh node at the tail, reusing a free slot if available.
    fn insert_new(&mut self, key: String, value: V) {
        let idx = self.free.pop().unwrap_or_else(|| {
            self.nodes.push(None);
            self.nodes.len() - 1
        });

        self.nodes[idx] = Some(Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        });
        self.push_back(idx);
        self.map.insert(key, idx);
    }

    /// Removes the least recently used entry, returning it owned.
    fn pop_head(&mut self) -> Option<(String, V)> {
        let idx = self.head?;
        self.unlink(idx);
        let node = self.nodes[idx].take().expect("live node");
        self.map.remove(&node.key);
        self.free.push(idx);
        Some((node.key, node.value))
    }

    /// Evicts one entry and fires the hook. Returns `false` when empty.
    fn evict_one(&mut self) -> bool {
        let Some((key, value)) = self.pop_head() else {
            return false;
        };
        self.used_bytes -= key.len() + value.size();
        if let Some(hook) = self.on_evict.as_mut() {
            hook(key, value);
        }
        true
    }
}

impl<V: Measured + Send> CacheEngine<V> for LruEngine<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.touch(idx);
        self.nodes[idx].as_ref().map(|node| &node.value)
    }

    fn add(&mut self, key: &str, value: V) -> Result<(), EngineError> {
        let charged = key.len() + value.size();
        if self.max_bytes != 0 && charged > self.max_bytes {
            return Err(EngineError::EntryTooLarge {
                charged,
                max: self.max_bytes,
            });
        }

        if let Some(&idx) = self.map.get(key) {
            let old_size = self.nodes[idx].as_ref().expect("live node").value.size();
            self.used_bytes = self.used_bytes - old_size + value.size();
            if let Some(node) = self.nodes[idx].as_mut() {
                node.value = value;
            }
            self.touch(idx);
        } else {
            self.insert_new(key.to_owned(), value);
            self.used_bytes += charged;
        }

        while self.max_bytes != 0 && self.used_bytes >= self.max_bytes {
            if !self.evict_one() {
                break;
            }
        }
        Ok(())
    }

    fn evict(&mut self) {
        self.evict_one();
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn size(&self) -> usize {
        self.used_bytes
    }
}
