//! # Consistent Hash Ring
//!
//! Maps a key to the peer that owns it. Every peer is planted at
//! `replicas` virtual slots so load spreads evenly; a lookup walks
//! clockwise to the first slot at or past the key's hash, wrapping at the
//! top of the u32 space. Adding a peer therefore moves only the keys that
//! fall between its slots and their predecessors, roughly `1/N` of the
//! keyspace.

use std::collections::HashMap;
use std::fmt;

/// Virtual slots planted per peer when none is configured explicitly.
pub const DEFAULT_REPLICAS: usize = 50;

/// Hash function mapping bytes onto the u32 ring space.
pub type RingHash = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Consistent-hash ring over peer identities.
pub struct HashRing {
    replicas: usize,
    hash: RingHash,
    /// Sorted virtual slot positions.
    slots: Vec<u32>,
    /// Slot position -> owning peer.
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Creates a ring with the given replica count.
    ///
    /// `hash = None` selects CRC-32/IEEE; replica counts below one are
    /// bumped to one.
    pub fn new(replicas: usize, hash: Option<RingHash>) -> Self {
        HashRing {
            replicas: replicas.max(1),
            hash: hash.unwrap_or_else(|| Box::new(crc32fast::hash)),
            slots: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Returns `true` when no peers have been added.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of virtual slots on the ring.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Plants `replicas` virtual slots for every peer, then re-sorts once.
    ///
    /// Each slot hashes `"{replica}{peer}"`; a slot collision silently
    /// keeps the later peer.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for peer in peers {
            let peer = peer.into();
            for replica in 0..self.replicas {
                let slot = (self.hash)(format!("{replica}{peer}").as_bytes());
                self.slots.push(slot);
                self.owners.insert(slot, peer.clone());
            }
        }
        self.slots.sort_unstable();
    }

    /// Returns the peer owning `key`, or `None` on an empty ring.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.slots.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let idx = match self.slots.binary_search(&hash) {
            Ok(idx) | Err(idx) => idx,
        };
        // Past the last slot wraps around to the first: the ring closes.
        let slot = self.slots[idx % self.slots.len()];
        self.owners.get(&slot).map(String::as_str)
    }
}

impl fmt::Debug for HashRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("slots", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Hash that reads the input as a decimal number, making slot
    /// positions easy to predict: replica i of peer "6" lands at i6.
    fn numeric_hash() -> RingHash {
        Box::new(|data| {
            std::str::from_utf8(data)
                .ok()
                .and_then(|text| text.parse().ok())
                .unwrap_or(0)
        })
    }

    #[test]
    fn empty_ring_owns_nothing() {
        let ring = HashRing::new(3, None);
        assert!(ring.is_empty());
        assert_eq!(ring.get("anything"), None);
    }

    #[test]
    fn clockwise_lookup_with_wraparound() {
        let mut ring = HashRing::new(3, Some(numeric_hash()));
        // Slots: 2, 4, 6, 12, 14, 16, 22, 24, 26.
        ring.add(["6", "4", "2"]);

        assert_eq!(ring.get("2"), Some("2"));
        assert_eq!(ring.get("11"), Some("2"));
        assert_eq!(ring.get("23"), Some("4"));
        assert_eq!(ring.get("27"), Some("2"));

        // A new peer takes over the arc in front of its slots.
        ring.add(["8"]);
        assert_eq!(ring.get("27"), Some("8"));
    }

    #[test]
    fn replica_count_is_at_least_one() {
        let mut ring = HashRing::new(0, Some(numeric_hash()));
        ring.add(["7"]);
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.get("3"), Some("7"));
    }

    #[test]
    fn ownership_ignores_insertion_order() {
        let peers = ["peer-a:7001", "peer-b:7002", "peer-c:7003"];
        let mut forward = HashRing::new(DEFAULT_REPLICAS, None);
        forward.add(peers);
        let mut reverse = HashRing::new(DEFAULT_REPLICAS, None);
        reverse.add(peers.iter().rev().copied());

        for i in 0..200 {
            let key = format!("sample-key-{i}");
            assert_eq!(forward.get(&key), reverse.get(&key));
        }
    }

    #[test]
    fn adding_a_peer_moves_a_bounded_share_of_keys() {
        let mut before = HashRing::new(DEFAULT_REPLICAS, None);
        before.add(["node-a", "node-b", "node-c"]);
        let mut after = HashRing::new(DEFAULT_REPLICAS, None);
        after.add(["node-a", "node-b", "node-c", "node-d"]);

        let total = 2000;
        let mut moved = 0;
        let mut gained: HashMap<&str, usize> = HashMap::new();
        for i in 0..total {
            let key = format!("migration-key-{i}");
            let old = before.get(&key).unwrap().to_owned();
            let new = after.get(&key).unwrap();
            if old != new {
                moved += 1;
                // Every moved key must have moved onto the new peer.
                assert_eq!(new, "node-d");
            }
            *gained.entry(after.get(&key).unwrap()).or_default() += 1;
        }

        // Expect roughly a quarter of the keys to migrate; allow generous
        // slack since this is statistical.
        assert!(moved > total / 10, "only {moved} of {total} keys moved");
        assert!(moved < total / 2, "{moved} of {total} keys moved");
        // And every peer should own a non-trivial share afterwards.
        for peer in ["node-a", "node-b", "node-c", "node-d"] {
            assert!(gained.get(peer).copied().unwrap_or(0) > total / 20);
        }
    }
}
