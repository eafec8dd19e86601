//! # Peer Pool
//!
//! Ring-backed peer picker: plants the known peer addresses on a
//! consistent-hash ring and hands out remote handles for keys this node
//! does not own. The ring and handle map are replaced wholesale on every
//! peer-set change; network I/O never happens under the lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use hive_core::{HashRing, PeerHandler, PeerPicker, DEFAULT_REPLICAS};

use crate::conn::PoolOptions;
use crate::peer::RemotePeer;

/// Tuning for a [`PeerPool`].
#[derive(Debug, Clone)]
pub struct PeerPoolOptions {
    /// Virtual slots per peer on the ring.
    pub replicas: usize,
    /// Connection pool settings applied to every remote handle.
    pub pool: PoolOptions,
}

impl Default for PeerPoolOptions {
    fn default() -> Self {
        PeerPoolOptions {
            replicas: DEFAULT_REPLICAS,
            pool: PoolOptions::default(),
        }
    }
}

struct PickerState {
    ring: HashRing,
    remotes: HashMap<String, Arc<RemotePeer>>,
}

/// Peer router for one node: implements [`PeerPicker`] over a hash ring.
pub struct PeerPool {
    self_addr: String,
    options: PeerPoolOptions,
    state: RwLock<PickerState>,
}

impl PeerPool {
    /// Creates a pool for the node reachable at `self_addr`.
    pub fn new(self_addr: impl Into<String>) -> Self {
        Self::with_options(self_addr, PeerPoolOptions::default())
    }

    /// Creates a pool with explicit ring and connection tuning.
    pub fn with_options(self_addr: impl Into<String>, options: PeerPoolOptions) -> Self {
        let ring = HashRing::new(options.replicas, None);
        PeerPool {
            self_addr: self_addr.into(),
            options,
            state: RwLock::new(PickerState {
                ring,
                remotes: HashMap::new(),
            }),
        }
    }

    /// Replaces the entire peer set.
    ///
    /// The list should include this node's own address so the ring can
    /// assign keys to it; no handle is created for the local address.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = HashRing::new(self.options.replicas, None);
        ring.add(peers.iter().cloned());

        let mut remotes = HashMap::new();
        for peer in peers {
            if peer != self.self_addr {
                remotes.insert(
                    peer.clone(),
                    Arc::new(RemotePeer::with_options(peer, self.options.pool.clone())),
                );
            }
        }

        *self.state.write() = PickerState { ring, remotes };
    }
}

impl PeerPicker for PeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerHandler>> {
        let state = self.state.read();
        let owner = state.ring.get(key)?;
        if owner == self.self_addr {
            return None;
        }
        let remote = state.remotes.get(owner)?;
        debug!(key, owner, "routing to remote owner");
        Some(Arc::clone(remote) as Arc<dyn PeerHandler>)
    }

    fn self_addr(&self) -> &str {
        &self.self_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_peer_set_picks_nobody() {
        let pool = PeerPool::new("127.0.0.1:7001");
        assert!(pool.pick_peer("any-key").is_none());
        assert_eq!(pool.self_addr(), "127.0.0.1:7001");
    }

    #[test]
    fn keys_owned_locally_pick_nobody() {
        let pool = PeerPool::new("127.0.0.1:7001");
        pool.set_peers(["127.0.0.1:7001"]);

        for i in 0..64 {
            assert!(pool.pick_peer(&format!("key-{i}")).is_none());
        }
    }

    #[test]
    fn remote_keys_pick_the_remote_handle() {
        let pool = PeerPool::new("127.0.0.1:7001");
        pool.set_peers(["127.0.0.1:7001", "127.0.0.1:7002"]);

        // With two peers and 50 replicas each, some of these keys must land
        // on the remote node; none of the picks may be the local address.
        let mut remote_picks = 0;
        for i in 0..256 {
            if pool.pick_peer(&format!("spread-key-{i}")).is_some() {
                remote_picks += 1;
            }
        }
        assert!(remote_picks > 0);
        assert!(remote_picks < 256);
    }

    #[test]
    fn set_peers_replaces_the_previous_set() {
        let pool = PeerPool::new("127.0.0.1:7001");
        pool.set_peers(["127.0.0.1:7001", "127.0.0.1:7002"]);
        pool.set_peers(["127.0.0.1:7001"]);

        for i in 0..64 {
            assert!(pool.pick_peer(&format!("key-{i}")).is_none());
        }
    }
}
