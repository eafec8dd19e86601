//! # Hive Net
//!
//! TCP transport for the cache mesh: the wire framing, the async peer
//! service, the pooled blocking client, and the ring-backed peer picker
//! that plugs into a group as its `PeerPicker`.

mod conn;
pub mod frame;
mod peer;
mod picker;
mod server;

pub use conn::{NetError, PoolOptions};
pub use peer::RemotePeer;
pub use picker::{PeerPool, PeerPoolOptions};
pub use server::{handle_connection, serve};
