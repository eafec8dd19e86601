//! # Group Orchestrator
//!
//! A group is a named cache namespace spread over a set of peers. Lookups
//! run the local-hit → owning-peer → origin-loader state machine, with
//! duplicate concurrent loads for one key collapsed into a single flight.
//! Groups register themselves in a process-wide table so transports can
//! resolve a namespace by name.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use hive_engine::{EngineError, Policy};

use crate::byteview::ByteView;
use crate::cache::LocalCache;
use crate::peers::{PeerHandler, PeerPicker};
use crate::singleflight::Flight;

/// Process-wide group table; lookups take the read side, creation writes.
static GROUPS: Lazy<RwLock<HashMap<String, Arc<Group>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Construction options for a group's local cache.
#[derive(Debug, Clone, Copy)]
pub struct GroupOptions {
    /// Byte budget for the local cache; zero disables the bound.
    pub max_bytes: usize,
    /// Eviction policy for the local cache.
    pub policy: Policy,
}

impl Default for GroupOptions {
    fn default() -> Self {
        GroupOptions {
            max_bytes: 0,
            policy: Policy::Lru,
        }
    }
}

/// Loads origin data for keys this node owns.
///
/// Loaders may block for as long as they like; concurrent lookups for the
/// same key share one invocation.
pub trait Loader: Send + Sync {
    /// Produces the bytes for `key`, or an error passed through verbatim.
    fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        self(key)
    }
}

/// Wraps a closure as a shareable [`Loader`].
pub fn loader_fn<F>(f: F) -> Arc<dyn Loader>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Errors surfaced by group lookups and inserts.
///
/// Cloneable because one load result fans out to every caller coalesced
/// onto the same flight.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GroupError {
    /// A local load was attempted with no loader configured.
    #[error("group {0:?} has no loader configured")]
    NoLoader(String),
    /// The remote peer call failed; the transport error passes through.
    #[error("peer request failed: {0}")]
    Peer(Arc<anyhow::Error>),
    /// The origin loader failed; its error passes through.
    #[error("origin load failed: {0}")]
    Origin(Arc<anyhow::Error>),
    /// The local cache rejected the entry.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Point-in-time copy of a group's counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    /// Lookups served, hits and misses alike.
    pub gets: u64,
    /// Lookups answered from the local cache.
    pub hits: u64,
    /// Loads that actually ran (after single-flight dedup).
    pub loads: u64,
    /// Loads answered by the origin loader.
    pub local_loads: u64,
    /// Origin loader failures.
    pub local_load_errors: u64,
    /// Loads answered by a remote peer.
    pub peer_loads: u64,
    /// Remote peer failures.
    pub peer_errors: u64,
}

/// Relaxed atomic counters; no cross-field consistency is promised.
#[derive(Default)]
struct GroupStats {
    gets: AtomicU64,
    hits: AtomicU64,
    loads: AtomicU64,
    local_loads: AtomicU64,
    local_load_errors: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
}

/// A named cache namespace backed by a local cache, an optional peer set,
/// and an optional origin loader.
pub struct Group {
    name: String,
    loader: Option<Arc<dyn Loader>>,
    cache: LocalCache,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    flight: Flight<Result<ByteView, GroupError>>,
    stats: GroupStats,
}

/// Creates and registers a group, or returns the existing one by that name.
///
/// The first registration wins; later calls with the same name ignore their
/// arguments and hand back the original instance.
pub fn new_group(
    name: impl Into<String>,
    opts: GroupOptions,
    loader: Option<Arc<dyn Loader>>,
) -> Arc<Group> {
    let name = name.into();
    let mut groups = GROUPS.write();
    if let Some(existing) = groups.get(&name) {
        return Arc::clone(existing);
    }

    let group = Arc::new(Group {
        cache: LocalCache::new(opts.max_bytes, opts.policy),
        loader,
        peers: OnceLock::new(),
        flight: Flight::new(),
        stats: GroupStats::default(),
        name: name.clone(),
    });
    groups.insert(name, Arc::clone(&group));
    group
}

/// Looks up a previously registered group by name.
pub fn get_group(name: &str) -> Option<Arc<Group>> {
    GROUPS.read().get(name).cloned()
}

impl Group {
    /// The group's registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the peer picker. Must be called at most once.
    ///
    /// # Panics
    ///
    /// Panics when peers were already registered for this group.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) {
        if self.peers.set(picker).is_err() {
            panic!("register_peers called twice for group {:?}", self.name);
        }
    }

    /// Looks up `key`: local cache, then owning peer, then origin loader.
    pub fn get(&self, key: &str) -> Result<ByteView, GroupError> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(view) = self.cache.get(key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            debug!(group = %self.name, key, "cache hit");
            return Ok(view);
        }
        self.load(key)
    }

    /// Stores `key` on its owning peer (when remote) and in the local cache.
    ///
    /// A remote failure short-circuits before the local cache is touched;
    /// the local write keeps serving reads routed here until the ring
    /// settles.
    pub fn add(&self, key: &str, value: ByteView) -> Result<(), GroupError> {
        if let Some(peer) = self.pick_remote(key) {
            peer.add(&self.name, key, &value.to_vec())
                .map_err(|err| GroupError::Peer(Arc::new(err)))?;
        }
        self.cache.add(key, value)?;
        Ok(())
    }

    /// Counter snapshot for telemetry.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.stats.gets.load(Ordering::Relaxed),
            hits: self.stats.hits.load(Ordering::Relaxed),
            loads: self.stats.loads.load(Ordering::Relaxed),
            local_loads: self.stats.local_loads.load(Ordering::Relaxed),
            local_load_errors: self.stats.local_load_errors.load(Ordering::Relaxed),
            peer_loads: self.stats.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.stats.peer_errors.load(Ordering::Relaxed),
        }
    }

    /// Local cache entry count and byte usage.
    pub fn cache_stats(&self) -> (usize, usize) {
        self.cache.stats()
    }

    fn pick_remote(&self, key: &str) -> Option<Arc<dyn PeerHandler>> {
        self.peers.get().and_then(|picker| picker.pick_peer(key))
    }

    fn load(&self, key: &str) -> Result<ByteView, GroupError> {
        self.flight.flight(key, || {
            self.stats.loads.fetch_add(1, Ordering::Relaxed);
            match self.pick_remote(key) {
                Some(peer) => self.load_from_peer(peer.as_ref(), key),
                None => self.load_locally(key),
            }
        })
    }

    fn load_from_peer(
        &self,
        peer: &dyn PeerHandler,
        key: &str,
    ) -> Result<ByteView, GroupError> {
        match peer.get(&self.name, key) {
            Ok(bytes) => {
                self.stats.peer_loads.fetch_add(1, Ordering::Relaxed);
                // The owner caches this key; staying a pass-through keeps
                // exactly one copy in the mesh.
                Ok(ByteView::from(bytes))
            }
            Err(err) => {
                self.stats.peer_errors.fetch_add(1, Ordering::Relaxed);
                warn!(group = %self.name, key, error = %err, "peer load failed");
                Err(GroupError::Peer(Arc::new(err)))
            }
        }
    }

    fn load_locally(&self, key: &str) -> Result<ByteView, GroupError> {
        let Some(loader) = self.loader.as_ref() else {
            return Err(GroupError::NoLoader(self.name.clone()));
        };

        match loader.load(key) {
            Ok(bytes) => {
                self.stats.local_loads.fetch_add(1, Ordering::Relaxed);
                let view = ByteView::from(bytes);
                if let Err(err) = self.cache.add(key, view.clone()) {
                    warn!(group = %self.name, key, error = %err, "cache populate rejected");
                }
                Ok(view)
            }
            Err(err) => {
                self.stats.local_load_errors.fetch_add(1, Ordering::Relaxed);
                Err(GroupError::Origin(Arc::new(err)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn score_loader(calls: Arc<AtomicUsize>) -> Arc<dyn Loader> {
        loader_fn(move |key: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            match key {
                "Tom" => Ok(b"630".to_vec()),
                "Jack" => Ok(b"589".to_vec()),
                _ => Err(anyhow::anyhow!("{key} not in the score table")),
            }
        })
    }

    struct FakePeer {
        gets: AtomicUsize,
        adds: std::sync::Mutex<Vec<(String, String, Vec<u8>)>>,
        fail: bool,
    }

    impl FakePeer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(FakePeer {
                gets: AtomicUsize::new(0),
                adds: std::sync::Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    impl PeerHandler for FakePeer {
        fn get(&self, _group: &str, key: &str) -> anyhow::Result<Vec<u8>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("peer unreachable");
            }
            Ok(format!("remote:{key}").into_bytes())
        }

        fn add(&self, group: &str, key: &str, value: &[u8]) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("peer unreachable");
            }
            self.adds
                .lock()
                .unwrap()
                .push((group.to_owned(), key.to_owned(), value.to_vec()));
            Ok(())
        }
    }

    /// Picker that routes every key to one fixed handler.
    struct FixedPicker {
        peer: Arc<FakePeer>,
    }

    impl PeerPicker for FixedPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerHandler>> {
            Some(Arc::clone(&self.peer) as Arc<dyn PeerHandler>)
        }

        fn self_addr(&self) -> &str {
            "test-node:0"
        }
    }

    #[test]
    fn cold_lookup_loads_once_then_hits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let group = new_group(
            "group-cold",
            GroupOptions::default(),
            Some(score_loader(Arc::clone(&calls))),
        );

        assert_eq!(group.get("Tom").unwrap().to_vec(), b"630");
        assert_eq!(group.get("Tom").unwrap().to_vec(), b"630");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = group.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.local_loads, 1);
    }

    #[test]
    fn concurrent_cold_lookups_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let group = new_group(
            "group-stampede",
            GroupOptions::default(),
            Some(score_loader(Arc::clone(&calls))),
        );

        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let group = Arc::clone(&group);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                group.get("Jack").unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.join().unwrap().to_vec(), b"589");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn loader_errors_propagate_and_do_not_poison() {
        let calls = Arc::new(AtomicUsize::new(0));
        let group = new_group(
            "group-origin-err",
            GroupOptions::default(),
            Some(score_loader(Arc::clone(&calls))),
        );

        assert!(matches!(
            group.get("Nobody").unwrap_err(),
            GroupError::Origin(_)
        ));
        assert!(matches!(
            group.get("Nobody").unwrap_err(),
            GroupError::Origin(_)
        ));
        // The failed key was retried, not served from a poisoned state.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(group.stats().local_load_errors, 2);
    }

    #[test]
    fn lookup_without_loader_or_peers_fails_clearly() {
        let group = new_group("group-bare", GroupOptions::default(), None);
        let err = group.get("anything").unwrap_err();
        assert!(matches!(err, GroupError::NoLoader(_)));
        assert!(err.to_string().contains("group-bare"));
    }

    #[test]
    fn remote_reads_do_not_populate_the_local_cache() {
        let peer = FakePeer::new(false);
        let group = new_group("group-proxy", GroupOptions::default(), None);
        group.register_peers(Arc::new(FixedPicker {
            peer: Arc::clone(&peer),
        }));

        assert_eq!(group.get("k").unwrap().to_vec(), b"remote:k");
        assert_eq!(group.get("k").unwrap().to_vec(), b"remote:k");

        // Both lookups went to the owner; nothing stuck locally.
        assert_eq!(peer.gets.load(Ordering::SeqCst), 2);
        assert_eq!(group.cache_stats(), (0, 0));
        assert_eq!(group.stats().peer_loads, 2);
    }

    #[test]
    fn peer_failures_surface_verbatim() {
        let group = new_group("group-peer-err", GroupOptions::default(), None);
        group.register_peers(Arc::new(FixedPicker {
            peer: FakePeer::new(true),
        }));

        let err = group.get("k").unwrap_err();
        assert!(matches!(err, GroupError::Peer(_)));
        assert!(err.to_string().contains("peer unreachable"));
        assert_eq!(group.stats().peer_errors, 1);
    }

    #[test]
    fn add_forwards_to_the_owner_then_caches_locally() {
        let peer = FakePeer::new(false);
        let group = new_group("group-fwd", GroupOptions::default(), None);
        group.register_peers(Arc::new(FixedPicker {
            peer: Arc::clone(&peer),
        }));

        group.add("color", ByteView::from("orange")).unwrap();

        let forwarded = peer.adds.lock().unwrap();
        assert_eq!(
            forwarded.as_slice(),
            &[(
                String::from("group-fwd"),
                String::from("color"),
                b"orange".to_vec()
            )]
        );
        drop(forwarded);

        // The local copy now serves reads without another peer hop.
        assert_eq!(group.cache_stats().0, 1);
        assert_eq!(group.get("color").unwrap().to_vec(), b"orange");
        assert_eq!(peer.gets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_remote_add_leaves_local_cache_untouched() {
        let group = new_group("group-fwd-err", GroupOptions::default(), None);
        group.register_peers(Arc::new(FixedPicker {
            peer: FakePeer::new(true),
        }));

        let err = group.add("k", ByteView::from("v")).unwrap_err();
        assert!(matches!(err, GroupError::Peer(_)));
        assert_eq!(group.cache_stats(), (0, 0));
    }

    #[test]
    fn registry_returns_the_same_instance() {
        let first = new_group("group-registry", GroupOptions::default(), None);
        let second = new_group(
            "group-registry",
            GroupOptions {
                max_bytes: 1,
                policy: Policy::Lfu,
            },
            None,
        );
        assert!(Arc::ptr_eq(&first, &second));

        let looked_up = get_group("group-registry").unwrap();
        assert!(Arc::ptr_eq(&first, &looked_up));
        assert!(get_group("group-unregistered").is_none());
    }

    #[test]
    #[should_panic(expected = "register_peers called twice")]
    fn double_peer_registration_is_fatal() {
        let group = new_group("group-double-reg", GroupOptions::default(), None);
        let peer = FakePeer::new(false);
        group.register_peers(Arc::new(FixedPicker {
            peer: Arc::clone(&peer),
        }));
        group.register_peers(Arc::new(FixedPicker { peer }));
    }

    #[test]
    fn oversized_local_add_is_rejected() {
        let group = new_group(
            "group-too-large",
            GroupOptions {
                max_bytes: 8,
                policy: Policy::Lru,
            },
            None,
        );
        let err = group.add("key", ByteView::from(vec![0u8; 32])).unwrap_err();
        assert!(matches!(err, GroupError::Engine(_)));
    }
}
