//! The path-addressed directory cache with in-flight fetch deduplication.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::active_op::{ActiveOp, ActiveOpRef, Request};
use crate::opendir::OpenDir;

enum Entry {
    Dir(Arc<OpenDir>),
    Pending(ActiveOpRef),
}

/// The result of [`OpenDirCache::read`].
#[non_exhaustive]
pub enum ReadOutcome {
    /// `path` is already cached.
    Found(Arc<OpenDir>),
    /// Another caller already has a fetch in flight for `path`; attach to
    /// it via the returned ref and call [`ActiveOp::wait_for_completion`].
    ActiveOpExisting(ActiveOpRef),
    /// No entry and no fetch in flight existed; this call created one. The
    /// caller is responsible for enqueueing the request and eventually
    /// calling [`ActiveOp::set_complete`] on it (directly, or via whatever
    /// component processes the queue).
    ActiveOpCreated(ActiveOpRef),
}

/// The result of [`OpenDirCache::read_no_op_creation`].
#[non_exhaustive]
pub enum PeekOutcome {
    /// `path` is already cached.
    Found(Arc<OpenDir>),
    /// A fetch is already in flight for `path`.
    ActiveOpExisting(ActiveOpRef),
    /// Neither a cached entry nor an in-flight fetch exists for `path`.
    NotFound,
}

/// Whether [`OpenDirCache::store`] succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreOutcome {
    /// The entry was stored (replacing any in-flight-op placeholder).
    Stored,
    /// A cached entry for this path already existed; nothing was changed.
    Rejected,
}

/// A `path -> OpenDir` map that deduplicates concurrent fetches.
///
/// The invariant this type exists to hold is: for any given path, at most
/// one [`crate::active_op::ActiveOp`] is ever in flight at a time. That
/// invariant is race-free because op creation happens inside the same
/// write-lock acquisition as the lookup that found nothing — the same
/// technique `tor-chanmgr`'s `ChannelMap::change_state`
/// (`examples/zydou-arti/crates/tor-chanmgr/src/mgr/map.rs`) uses to decide
/// an `Action` for a channel while holding its map's lock.
#[derive(Default)]
pub struct OpenDirCache {
    map: RwLock<HashMap<String, Entry>>,
}

impl OpenDirCache {
    /// A fresh, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `path`; on a miss, atomically create an [`ActiveOp`] for it
    /// using `request`, so no other caller can also create one for the same
    /// path in the interim.
    pub fn read(&self, path: &str, request: Request) -> ReadOutcome {
        let mut map = self.map.write();
        match map.get(path) {
            Some(Entry::Dir(od)) => ReadOutcome::Found(od.clone()),
            Some(Entry::Pending(op)) => ReadOutcome::ActiveOpExisting(op.clone()),
            None => {
                let op = ActiveOp::new(request);
                map.insert(path.to_string(), Entry::Pending(op.clone()));
                ReadOutcome::ActiveOpCreated(op)
            }
        }
    }

    /// Pure lookup: never creates an op.
    pub fn read_no_op_creation(&self, path: &str) -> PeekOutcome {
        let map = self.map.read();
        match map.get(path) {
            Some(Entry::Dir(od)) => PeekOutcome::Found(od.clone()),
            Some(Entry::Pending(op)) => PeekOutcome::ActiveOpExisting(op.clone()),
            None => PeekOutcome::NotFound,
        }
    }

    /// Install `od` as the cached entry for `path`, replacing any in-flight
    /// op placeholder. Rejects if a real entry is already cached (another
    /// thread's store won the race).
    pub fn store(&self, path: &str, od: OpenDir) -> StoreOutcome {
        let mut map = self.map.write();
        if matches!(map.get(path), Some(Entry::Dir(_))) {
            return StoreOutcome::Rejected;
        }
        map.insert(path.to_string(), Entry::Dir(Arc::new(od)));
        StoreOutcome::Stored
    }

    /// Remove a still-pending op placeholder for `path`, e.g. after its
    /// fetch failed to populate the cache. A no-op if `path` already holds
    /// a real entry or nothing at all.
    pub fn remove_active_op(&self, path: &str) {
        let mut map = self.map.write();
        if matches!(map.get(path), Some(Entry::Pending(_))) {
            map.remove(path);
        }
    }

    /// The number of entries (cached or pending) currently tracked.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True if no entries (cached or pending) are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// Inert hook for a future TTL-based eviction policy. The source this
    /// crate is grounded on never evicts cached entries, and no eviction
    /// heuristic was ever exercised, so this call intentionally does
    /// nothing; see `DESIGN.md`.
    pub fn sweep_expired(&self) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::active_op::RequestKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;
    use std::thread;

    fn req(path: &str) -> Request {
        Request {
            path: path.to_string(),
            kind: RequestKind::Initial,
        }
    }

    #[test]
    fn miss_creates_exactly_one_op() {
        let cache = OpenDirCache::new();
        match cache.read("/a", req("/a")) {
            ReadOutcome::ActiveOpCreated(_) => {}
            _ => panic!("expected created"),
        }
        match cache.read("/a", req("/a")) {
            ReadOutcome::ActiveOpExisting(_) => {}
            _ => panic!("expected existing"),
        }
    }

    #[test]
    fn store_then_found() {
        let cache = OpenDirCache::new();
        let _ = cache.read("/a", req("/a"));
        assert_eq!(cache.store("/a", OpenDir::new("/a", None)), StoreOutcome::Stored);
        match cache.read_no_op_creation("/a") {
            PeekOutcome::Found(_) => {}
            _ => panic!("expected found"),
        }
    }

    #[test]
    fn store_rejects_when_already_cached() {
        let cache = OpenDirCache::new();
        assert_eq!(cache.store("/a", OpenDir::new("/a", None)), StoreOutcome::Stored);
        assert_eq!(
            cache.store("/a", OpenDir::new("/a", None)),
            StoreOutcome::Rejected
        );
    }

    #[test]
    fn remove_active_op_clears_pending_only() {
        let cache = OpenDirCache::new();
        let _ = cache.read("/a", req("/a"));
        cache.remove_active_op("/a");
        match cache.read_no_op_creation("/a") {
            PeekOutcome::NotFound => {}
            _ => panic!("expected not found"),
        }
    }

    #[test]
    fn concurrent_reads_dedup_to_one_created_op() {
        let cache = StdArc::new(OpenDirCache::new());
        let created = StdArc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let created = created.clone();
                thread::spawn(move || {
                    if let ReadOutcome::ActiveOpCreated(_) = cache.read("/a", req("/a")) {
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }
}
