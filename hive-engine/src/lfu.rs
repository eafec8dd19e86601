//! # LFU Engine
//!
//! Least-frequently-used store with byte-based eviction. Entries live in
//! frequency buckets kept in ascending order; within a bucket the front
//! entry is the oldest arrival at that frequency and is the eviction
//! target, so ties break FIFO.
//!
//! ```text
//! LfuEngine
//!   ├── map: HashMap<String, usize>          (key -> entry slot)
//!   ├── freq_index: HashMap<u64, usize>      (frequency -> bucket slot)
//!   └── bucket list, ascending frequency:
//!         [freq=1: e4 ◀──▶ e7] ◀──▶ [freq=3: e1] ◀──▶ [freq=9: e2]
//!          ▲ eviction side
//! ```
//!
//! Both the bucket list and the per-bucket entry lists are index-linked
//! arenas, mirroring the recency arena of the LRU engine.

use ahash::RandomState;
use hashbrown::HashMap;

use crate::engine::{CacheEngine, EngineError, EvictHook, Measured};

/// Bytes charged per entry for its frequency counter.
const FREQ_COST: usize = 4;

/// One key/value entry with its position in a frequency bucket.
struct Slot<V> {
    key: String,
    value: V,
    freq: u64,
    bucket: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

/// One frequency bucket: a FIFO list of entries sharing a frequency.
struct Bucket {
    freq: u64,
    head: Option<usize>,
    tail: Option<usize>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Byte-budgeted LFU cache engine.
pub struct LfuEngine<V> {
    /// Key -> entry slot for O(1) lookup.
    map: HashMap<String, usize, RandomState>,
    /// Frequency -> bucket slot for O(1) bucket lookup.
    freq_index: HashMap<u64, usize, RandomState>,
    /// Dense entry storage; list links are indices into this arena.
    slots: Vec<Option<Slot<V>>>,
    slot_free: Vec<usize>,
    /// Dense bucket storage, linked in ascending frequency order.
    buckets: Vec<Option<Bucket>>,
    bucket_free: Vec<usize>,
    /// Lowest-frequency bucket (eviction side).
    bucket_head: Option<usize>,
    /// Byte budget; zero disables the bound.
    max_bytes: usize,
    /// Charged bytes across live entries.
    used_bytes: usize,
    on_evict: Option<EvictHook<V>>,
}

impl<V: Measured> LfuEngine<V> {
    /// Creates an engine with the given budget and optional eviction hook.
    pub fn new(max_bytes: usize, on_evict: Option<EvictHook<V>>) -> Self {
        LfuEngine {
            map: HashMap::default(),
            freq_index: HashMap::default(),
            slots: Vec::new(),
            slot_free: Vec::new(),
            buckets: Vec::new(),
            bucket_free: Vec::new(),
            bucket_head: None,
            max_bytes,
            used_bytes: 0,
            on_evict,
        }
    }

    fn alloc_slot(&mut self, slot: Slot<V>) -> usize {
        let idx = self.slot_free.pop().unwrap_or_else(|| {
            self.slots.push(None);
            self.slots.len() - 1
        });
        self.slots[idx] = Some(slot);
        idx
    }

    fn alloc_bucket(&mut self, freq: u64) -> usize {
        let idx = self.bucket_free.pop().unwrap_or_else(|| {
            self.buckets.push(None);
            self.buckets.len() - 1
        });
        self.buckets[idx] = Some(Bucket {
            freq,
            head: None,
            tail: None,
            prev: None,
            next: None,
        });
        idx
    }

    /// Links a fresh bucket into the frequency list, either at the front
    /// (`after = None`) or immediately after an existing bucket.
    fn link_bucket(&mut self, idx: usize, after: Option<usize>) {
        match after {
            None => {
                let old_head = self.bucket_head;
                if let Some(bucket) = self.buckets[idx].as_mut() {
                    bucket.prev = None;
                    bucket.next = old_head;
                }
                if let Some(head_idx) = old_head {
                    if let Some(head) = self.buckets[head_idx].as_mut() {
                        head.prev = Some(idx);
                    }
                }
                self.bucket_head = Some(idx);
            }
            Some(after_idx) => {
                let after_next = self.buckets[after_idx].as_ref().expect("live bucket").next;
                if let Some(bucket) = self.buckets[idx].as_mut() {
                    bucket.prev = Some(after_idx);
                    bucket.next = after_next;
                }
                if let Some(after_bucket) = self.buckets[after_idx].as_mut() {
                    after_bucket.next = Some(idx);
                }
                if let Some(next_idx) = after_next {
                    if let Some(next_bucket) = self.buckets[next_idx].as_mut() {
                        next_bucket.prev = Some(idx);
                    }
                }
            }
        }
    }

    /// Unlinks and frees a bucket that has become empty.
    fn drop_bucket_if_empty(&mut self, idx: usize) {
        let (empty, freq, prev, next) = {
            let bucket = self.buckets[idx].as_ref().expect("live bucket");
            (bucket.head.is_none(), bucket.freq, bucket.prev, bucket.next)
        };
        if !empty {
            return;
        }

        if let Some(prev_idx) = prev {
            if let Some(prev_bucket) = self.buckets[prev_idx].as_mut() {
                prev_bucket.next = next;
            }
        } else {
            self.bucket_head = next;
        }

        if let Some(next_idx) = next {
            if let Some(next_bucket) = self.buckets[next_idx].as_mut() {
                next_bucket.prev = prev;
            }
        }

        self.freq_index.remove(&freq);
        self.buckets[idx] = None;
        self.bucket_free.push(idx);
    }

    /// Detaches an entry from its bucket's list without freeing it.
    fn detach_slot(&mut self, idx: usize) {
        let (bucket, prev, next) = {
            let slot = self.slots[idx].as_ref().expect("live slot");
            (slot.bucket, slot.prev, slot.next)
        };

        if let Some(prev_idx) = prev {
            if let Some(prev_slot) = self.slots[prev_idx].as_mut() {
                prev_slot.next = next;
            }
        } else if let Some(owner) = self.buckets[bucket].as_mut() {
            owner.head = next;
        }

        if let Some(next_idx) = next {
            if let Some(next_slot) = self.slots[next_idx].as_mut() {
                next_slot.prev = prev;
            }
        } else if let Some(owner) = self.buckets[bucket].as_mut() {
            owner.tail = prev;
        }

        if let Some(slot) = self.slots[idx].as_mut() {
            slot.prev = None;
            slot.next = None;
        }
    }

    /// Appends an entry at the tail of a bucket (newest at that frequency).
    fn append_slot(&mut self, bucket_idx: usize, idx: usize) {
        let old_tail = self.buckets[bucket_idx].as_ref().expect("live bucket").tail;
        if let Some(slot) = self.slots[idx].as_mut() {
            slot.bucket = bucket_idx;
            slot.prev = old_tail;
            slot.next = None;
        }

        if let Some(tail_idx) = old_tail {
            if let Some(tail_slot) = self.slots[tail_idx].as_mut() {
                tail_slot.next = Some(idx);
            }
        } else if let Some(bucket) = self.buckets[bucket_idx].as_mut() {
            bucket.head = Some(idx);
        }

        if let Some(bucket) = self.buckets[bucket_idx].as_mut() {
            bucket.tail = Some(idx);
        }
    }

    /// Moves an entry into the bucket for `freq + 1`, creating that bucket
    /// right after the current one when missing. Frequencies never go down.
    fn increase_freq(&mut self, idx: usize) {
        let (old_bucket, old_freq) = {
            let slot = self.slots[idx].as_ref().expect("live slot");
            (slot.bucket, slot.freq)
        };
        let new_freq = old_freq + 1;

        self.detach_slot(idx);

        let target = match self.freq_index.get(&new_freq) {
            Some(&bucket_idx) => bucket_idx,
            None => {
                let bucket_idx = self.alloc_bucket(new_freq);
                self.link_bucket(bucket_idx, Some(old_bucket));
                self.freq_index.insert(new_freq, bucket_idx);
                bucket_idx
            }
        };

        if let Some(slot) = self.slots[idx].as_mut() {
            slot.freq = new_freq;
        }
        self.append_slot(target, idx);
        self.drop_bucket_if_empty(old_bucket);
    }

    /// Inserts a brand-new entry at frequency 1.
    fn insert_new(&mut self, key: &str, value: V) {
        let charged = key.len() + value.size() + FREQ_COST;
        let bucket_idx = match self.freq_index.get(&1) {
            Some(&bucket_idx) => bucket_idx,
            None => {
                // Frequency 1 is the minimum, so its bucket belongs at the
                // front of the frequency list.
                let bucket_idx = self.alloc_bucket(1);
                self.link_bucket(bucket_idx, None);
                self.freq_index.insert(1, bucket_idx);
                bucket_idx
            }
        };

        let idx = self.alloc_slot(Slot {
            key: key.to_owned(),
            value,
            freq: 1,
            bucket: bucket_idx,
            prev: None,
            next: None,
        });
        self.append_slot(bucket_idx, idx);
        self.map.insert(key.to_owned(), idx);
        self.used_bytes += charged;
    }

    /// Evicts the front entry of the lowest-frequency bucket and fires the
    /// hook. Returns `false` when empty.
    fn evict_one(&mut self) -> bool {
        let Some(bucket_idx) = self.bucket_head else {
            return false;
        };
        let Some(front) = self.buckets[bucket_idx].as_ref().and_then(|b| b.head) else {
            return false;
        };

        self.detach_slot(front);
        let slot = self.slots[front].take().expect("live slot");
        self.slot_free.push(front);
        self.map.remove(&slot.key);
        self.used_bytes -= slot.key.len() + slot.value.size() + FREQ_COST;
        self.drop_bucket_if_empty(bucket_idx);

        if let Some(hook) = self.on_evict.as_mut() {
            hook(slot.key, slot.value);
        }
        true
    }
}

impl<V: Measured + Send> CacheEngine<V> for LfuEngine<V> {
    fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.increase_freq(idx);
        self.slots[idx].as_ref().map(|slot| &slot.value)
    }

    fn add(&mut self, key: &str, value: V) -> Result<(), EngineError> {
        let charged = key.len() + value.size() + FREQ_COST;
        if self.max_bytes != 0 && charged > self.max_bytes {
            return Err(EngineError::EntryTooLarge {
                charged,
                max: self.max_bytes,
            });
        }

        if let Some(&idx) = self.map.get(key) {
            let old_size = self.slots[idx].as_ref().expect("live slot").value.size();
            // Make room against the pre-update usage plus the size delta;
            // rewritten as an addition on both sides to stay in usize.
            while self.max_bytes != 0 && self.used_bytes + value.size() > self.max_bytes + old_size
            {
                if !self.evict_one() {
                    break;
                }
            }
            if !self.map.contains_key(key) {
                // The budget loop took the entry being updated with it;
                // what is left to do is a plain insert.
                while self.max_bytes != 0 && self.used_bytes + charged > self.max_bytes {
                    if !self.evict_one() {
                        break;
                    }
                }
                self.insert_new(key, value);
                return Ok(());
            }
            self.used_bytes = self.used_bytes - old_size + value.size();
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.value = value;
            }
            self.increase_freq(idx);
        } else {
            while self.max_bytes != 0 && self.used_bytes + charged > self.max_bytes {
                if !self.evict_one() {
                    break;
                }
            }
            self.insert_new(key, value);
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
