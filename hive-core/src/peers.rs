//! # Peer Contracts
//!
//! Interface boundary between a group and whatever transport reaches its
//! remote peers. The picker decides ownership; handlers move bytes. Errors
//! cross the boundary as `anyhow::Error` so transports can surface their
//! own failure types verbatim.

use std::sync::Arc;

/// Transport-side handle to one remote peer.
pub trait PeerHandler: Send + Sync {
    /// Fetches the value for `key` in `group` from the remote peer.
    fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;

    /// Stores a value for `key` in `group` on the remote peer.
    fn add(&self, group: &str, key: &str, value: &[u8]) -> anyhow::Result<()>;
}

/// Routes keys to the peers that own them.
pub trait PeerPicker: Send + Sync {
    /// Returns the handler for the owner of `key`, or `None` when the key
    /// is owned locally or no peers are known.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerHandler>>;

    /// This node's own peer identity.
    fn self_addr(&self) -> &str;
}
