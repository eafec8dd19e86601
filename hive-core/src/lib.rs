//! # Hive Core
//!
//! Core of the peer-to-peer cache mesh: the immutable byte view, the
//! mutex-guarded cache shell, the consistent-hash ring, single-flight load
//! coalescing, the peer contracts, and the group orchestrator that ties
//! them together into the local-hit → remote-peer → origin-loader lookup
//! path.

mod byteview;
mod cache;
mod group;
mod peers;
pub mod ring;
pub mod singleflight;

pub use byteview::ByteView;
pub use group::{
    get_group, loader_fn, new_group, Group, GroupError, GroupOptions, Loader, StatsSnapshot,
};
pub use peers::{PeerHandler, PeerPicker};
pub use ring::{HashRing, RingHash, DEFAULT_REPLICAS};
pub use singleflight::Flight;

pub use hive_engine::{EngineError, Measured, Policy};
