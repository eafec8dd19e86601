//! # Demo Cache Node
//!
//! Minimal node that serves the peer protocol for a sample `scores` group
//! backed by a static table. Run several with a shared peer list to get a
//! working mesh:
//!
//! ```text
//! hive-node 127.0.0.1:7001 127.0.0.1:7001 127.0.0.1:7002 127.0.0.1:7003
//! hive-node 127.0.0.1:7002 127.0.0.1:7001 127.0.0.1:7002 127.0.0.1:7003
//! hive-node 127.0.0.1:7003 127.0.0.1:7001 127.0.0.1:7002 127.0.0.1:7003
//! ```
//!
//! The first argument is this node's listen address; the rest is the full
//! peer list, own address included.

use std::env;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hive_core::{loader_fn, new_group, GroupOptions, Policy};
use hive_net::{serve, PeerPool};

const SAMPLE_SCORES: &[(&str, &str)] = &[("Tom", "630"), ("Jack", "589"), ("Sam", "567")];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    let listen = args
        .next()
        .ok_or_else(|| anyhow!("usage: hive-node <listen-addr> [peer-addr ...]"))?;
    let peers: Vec<String> = args.collect();

    let loader = loader_fn(|key: &str| {
        info!(key, "loading from the sample table");
        SAMPLE_SCORES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, score)| score.as_bytes().to_vec())
            .ok_or_else(|| anyhow!("{key} is not in the score table"))
    });

    let group = new_group(
        "scores",
        GroupOptions {
            max_bytes: 2 << 20,
            policy: Policy::Lfu,
        },
        Some(loader),
    );

    let pool = Arc::new(PeerPool::new(listen.clone()));
    if !peers.is_empty() {
        pool.set_peers(peers);
    }
    group.register_peers(pool);

    let listener = TcpListener::bind(&listen).await?;
    serve(listener).await?;
    Ok(())
}
