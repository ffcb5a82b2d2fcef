//! Per-path mutable directory state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dirdata::DirData;
use crate::kvs::ValueMetadata;
use crate::reconcile::ReconciliationSet;
use crate::update::{OpenDirUpdate, UpdateKind};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fields guarded by [`OpenDir`]'s mutex.
struct Inner {
    dd: DirData,
    pending: Vec<OpenDirUpdate>,
    dd_version: u64,
    last_merged_version: u64,
    last_update_ms: u64,
}

/// The per-path mutable state the cache keeps for one directory.
///
/// `needs_reconciliation` is deliberately readable without holding the lock:
/// it is an advisory hint ("a reconciliation pass is probably warranted"),
/// not a fact that anything depends on for correctness, so it is kept as a
/// plain [`AtomicBool`] with relaxed ordering rather than behind the mutex.
pub struct OpenDir {
    path: String,
    inner: Mutex<Inner>,
    needs_reconciliation: AtomicBool,
    queued_for_write: AtomicBool,
}

impl OpenDir {
    /// Maximum permitted path length. Longer paths are a programmer error.
    pub const MAX_PATH: usize = 4096;

    /// Create a new `OpenDir` for `path`, optionally seeded with an initial
    /// snapshot.
    ///
    /// # Panics
    ///
    /// Panics if `path` exceeds [`Self::MAX_PATH`] bytes.
    pub fn new(path: impl Into<String>, dd: Option<DirData>) -> Self {
        let path = path.into();
        assert!(
            path.len() <= Self::MAX_PATH,
            "path exceeds MAX_PATH: {}",
            path.len()
        );
        Self {
            path,
            inner: Mutex::new(Inner {
                dd: dd.unwrap_or_default(),
                pending: Vec::new(),
                dd_version: 0,
                last_merged_version: 0,
                last_update_ms: now_ms(),
            }),
            needs_reconciliation: AtomicBool::new(false),
            queued_for_write: AtomicBool::new(false),
        }
    }

    /// The path this entry was created for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Return the current directory snapshot, with pending local updates
    /// folded in. If `clear_pending` is true, the folded snapshot becomes
    /// the new baseline and `pending` is emptied.
    pub fn get_dir_data(&self, clear_pending: bool) -> DirData {
        let mut inner = self.inner.lock();
        let applied = DirData::apply_updates(&inner.dd, &inner.pending);
        if clear_pending {
            inner.dd = applied.clone();
            inner.pending.clear();
        }
        applied
    }

    /// True if there are local updates not yet folded into `dd`.
    pub fn updates_pending(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }

    /// Milliseconds since the last successful remote merge. Read without
    /// locking, matching the source's unlocked-read stance on timing hints:
    /// a benign race here only affects refresh scheduling, never
    /// correctness.
    pub fn elapsed_since_last_update_ms(&self) -> u64 {
        now_ms().saturating_sub(self.inner.lock().last_update_ms)
    }

    /// The advisory "this path probably needs reconciliation" hint.
    pub fn needs_reconciliation(&self) -> bool {
        self.needs_reconciliation.load(Ordering::Relaxed)
    }

    fn add_update(&self, name: &str, kind: UpdateKind, version: u64) {
        let mut inner = self.inner.lock();
        let replace_index = inner.pending.iter().position(|u| u.name == name);
        match replace_index {
            Some(idx) if inner.pending[idx].version < version => {
                inner.pending[idx] = OpenDirUpdate::new(name, kind, version);
            }
            Some(_) => {
                trace!(path = %self.path, name, version, "stale pending update dropped");
            }
            None => {
                inner.pending.push(OpenDirUpdate::new(name, kind, version));
            }
        }
    }

    /// Record a locally observed entry addition.
    pub fn add_entry(&self, name: &str, version: u64, reconciliation: &dyn ReconciliationSet) {
        self.add_update(name, UpdateKind::Add, version);
        self.needs_reconciliation.store(true, Ordering::Relaxed);
        reconciliation.add(&self.path);
    }

    /// Record a locally observed entry removal.
    pub fn rm_entry(&self, name: &str, version: u64, reconciliation: &dyn ReconciliationSet) {
        self.add_update(name, UpdateKind::Delete, version);
        self.needs_reconciliation.store(true, Ordering::Relaxed);
        reconciliation.add(&self.path);
    }

    /// Intentionally a no-op. The source disables freeing `OpenDir` entries
    /// on deletion to keep reconciliation bookkeeping stable; this crate
    /// preserves that stance until the reconciliation subsystem is
    /// redesigned to tolerate it.
    pub fn mark_deleted(&self) {}

    /// Merge a freshly fetched remote snapshot into this entry.
    ///
    /// `dd` is `None` when the key-value store reported no value for this
    /// path; it is treated as a hint (an empty remote at the current time)
    /// so the merge still runs and can still trigger a write-back if local
    /// data exists. `own_creator_id` identifies this process, so a remote
    /// value written by ourselves doesn't falsely look like outside novelty.
    ///
    /// Returns `true` if the caller should dispatch a write-back for this
    /// path once it has released any locks of its own. This crate never
    /// calls the write-back collaborator from inside this method: the
    /// source's version does so through a recursive mutex, and the
    /// recommended redesign (captured here) is to decide while locked and
    /// act after unlocking instead.
    pub fn add_dir_data(
        &self,
        dd: Option<DirData>,
        metadata: Option<ValueMetadata>,
        own_creator_id: u64,
        reconciliation: &dyn ReconciliationSet,
    ) -> bool {
        let version = metadata.map(|m| m.version).unwrap_or_else(now_ms);
        let remote_creator = metadata.map(|m| m.creator_id);

        let mut inner = self.inner.lock();
        if inner.dd_version >= version || inner.last_merged_version == version {
            trace!(path = %self.path, version, "stale remote snapshot dropped");
            return false;
        }

        // Fold and clear pending updates unconditionally once the snapshot
        // is accepted as non-stale, before merging against the remote side.
        inner.dd = DirData::apply_updates(&inner.dd, &inner.pending);
        inner.pending.clear();

        let remote = dd.unwrap_or_default();
        let outcome = DirData::merge(&inner.dd, &remote);

        if outcome.b_not_in_a {
            inner.dd = outcome.result;
            inner.dd_version = version;
            inner.last_update_ms = now_ms();
        }
        inner.last_merged_version = version;

        let needs_write_back = outcome.a_not_in_b;
        let foreign_write = remote_creator.is_some_and(|c| c != own_creator_id);

        if !outcome.a_not_in_b && !outcome.b_not_in_a && foreign_write {
            self.needs_reconciliation.store(false, Ordering::Relaxed);
            reconciliation.remove(&self.path);
        } else {
            self.needs_reconciliation.store(true, Ordering::Relaxed);
        }

        debug!(
            path = %self.path,
            version,
            needs_write_back,
            "merged remote directory snapshot"
        );

        needs_write_back
    }

    /// Atomically claim the single outstanding write-back slot for this
    /// path. Returns `true` only on the false-to-true transition; a caller
    /// that gets `false` must not dispatch a write.
    pub fn set_queued_for_write(&self) -> bool {
        self.queued_for_write
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the write-back slot claimed by [`Self::set_queued_for_write`].
    pub fn clear_queued_for_write(&self) {
        self.queued_for_write.store(false, Ordering::Release);
    }

    /// Dump this entry's state for diagnostics.
    pub fn display(&self) -> String {
        let inner = self.inner.lock();
        format!(
            "OpenDir{{path={}, dd_version={}, entries={}, pending={}, needs_reconciliation={}}}",
            self.path,
            inner.dd_version,
            inner.dd.len(),
            inner.pending.len(),
            self.needs_reconciliation()
        )
    }

    /// Disabled prefetch hook. The source's equivalent was disabled after a
    /// suspected memory-safety bug and never re-enabled; this crate keeps
    /// the call site inert rather than reviving unexercised behavior.
    pub fn record_get_attr(&self, _name: &str) -> bool {
        false
    }
}
