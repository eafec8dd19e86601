//! # Remote Peer Handle
//!
//! Blocking [`PeerHandler`] implementation that speaks the wire protocol to
//! one remote node through pooled TCP connections. One command per lease;
//! the pool makes repeated hops to the same owner cheap.

use anyhow::anyhow;

use hive_core::PeerHandler;

use crate::conn::{ConnectionPool, NetError, PoolOptions};
use crate::frame::Frame;

/// Client-side handle to one remote cache node.
pub struct RemotePeer {
    addr: String,
    pool: ConnectionPool,
}

impl RemotePeer {
    /// Creates a handle; connections are dialed lazily on first use.
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_options(addr, PoolOptions::default())
    }

    /// Creates a handle with explicit pool tuning.
    pub fn with_options(addr: impl Into<String>, options: PoolOptions) -> Self {
        let addr = addr.into();
        RemotePeer {
            pool: ConnectionPool::new(addr.clone(), options),
            addr,
        }
    }

    /// The peer address this handle talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn exec(&self, args: &[&[u8]]) -> Result<Frame, NetError> {
        let mut lease = self.pool.lease()?;
        lease.exec(args)
    }

    fn remote_error(&self, message: &[u8]) -> anyhow::Error {
        anyhow!(
            "peer {}: {}",
            self.addr,
            String::from_utf8_lossy(message)
        )
    }
}

impl PeerHandler for RemotePeer {
    fn get(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
        match self.exec(&[b"GET", group.as_bytes(), key.as_bytes()])? {
            Frame::Bulk(Some(data)) => Ok(data),
            Frame::Error(message) => Err(self.remote_error(&message)),
            _ => Err(NetError::UnexpectedFrame.into()),
        }
    }

    fn add(&self, group: &str, key: &str, value: &[u8]) -> anyhow::Result<()> {
        match self.exec(&[b"PUT", group.as_bytes(), key.as_bytes(), value])? {
            Frame::Simple(_) => Ok(()),
            Frame::Error(message) => Err(self.remote_error(&message)),
            _ => Err(NetError::UnexpectedFrame.into()),
        }
    }
}
