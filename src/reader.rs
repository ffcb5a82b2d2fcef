//! The orchestrator: owns the cache, the batch queue, and a pool of
//! key-value store sessions, and routes requests between them.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::active_op::{ActiveOp, ActiveOpRef, Request, RequestKind};
use crate::batch::BatchQueueProcessor;
use crate::cache::{OpenDirCache, PeekOutcome, ReadOutcome, StoreOutcome};
use crate::config::DirCacheConfig;
use crate::dirdata::DirData;
use crate::err::Error;
use crate::kvs::{FailureCause, KeyState, KvsSession};
use crate::opendir::OpenDir;
use crate::reconcile::ReconciliationSet;
use crate::stats::ResponseTimeStats;
use crate::writer::OpenDirWriter;

/// Whether [`DirDataReader::get_open_dir`] should populate the cache with an
/// empty entry on a true miss, or report [`Error::NotFound`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CreateMode {
    /// Insert an empty `OpenDir` if the path has no cached or remote value.
    AutoCreate,
    /// Report [`Error::NotFound`] instead of creating anything.
    NoAutoCreate,
}

type SessionPool<K> = Vec<Mutex<K>>;

/// Owns the directory cache, the request queue, the key-value session pool,
/// and the write-back/reconciliation collaborators, and exposes the public
/// read operations callers use.
pub struct DirDataReader<K: KvsSession + 'static, R: ReconciliationSet + 'static, W: OpenDirWriter + 'static> {
    cache: Arc<OpenDirCache>,
    queue: BatchQueueProcessor<ActiveOpRef>,
    reconciliation: Arc<R>,
    writer: Arc<W>,
    stats: Arc<ResponseTimeStats>,
    config: DirCacheConfig,
    own_creator_id: u64,
    _sessions_marker: std::marker::PhantomData<K>,
}

impl<K: KvsSession + 'static, R: ReconciliationSet + 'static, W: OpenDirWriter + 'static>
    DirDataReader<K, R, W>
{
    /// Build a reader. `session_factory` is called once per worker thread
    /// (`config.dht_threads` times total) to build that worker's dedicated
    /// [`KvsSession`]; sessions are never shared across worker threads.
    pub fn new<F>(config: DirCacheConfig, session_factory: F, reconciliation: R, writer: W) -> Self
    where
        F: Fn(usize) -> K,
    {
        let cache = Arc::new(OpenDirCache::new());
        let reconciliation = Arc::new(reconciliation);
        let writer = Arc::new(writer);
        let stats = Arc::new(ResponseTimeStats::new());
        let own_creator_id = rand::random();
        let namespace = Arc::new(config.dir_namespace.clone());

        let sessions: Arc<SessionPool<K>> = Arc::new(
            (0..config.dht_threads)
                .map(|idx| Mutex::new(session_factory(idx)))
                .collect(),
        );

        let cache_for_workers = cache.clone();
        let reconciliation_for_workers = reconciliation.clone();
        let writer_for_workers = writer.clone();
        let stats_for_workers = stats.clone();

        let queue = BatchQueueProcessor::new(
            config.dht_queue_size,
            config.dht_threads,
            config.max_batch_size,
            move |batch: Vec<ActiveOpRef>, worker_idx: usize| {
                process_batch(
                    batch,
                    worker_idx,
                    &sessions,
                    &namespace,
                    &cache_for_workers,
                    &reconciliation_for_workers,
                    &writer_for_workers,
                    &stats_for_workers,
                    own_creator_id,
                );
            },
        );

        Self {
            cache,
            queue,
            reconciliation,
            writer,
            stats,
            config,
            own_creator_id,
            _sessions_marker: std::marker::PhantomData,
        }
    }

    /// This process's creator identifier, stamped on every write-back so
    /// remote merges can tell self-written values from foreign ones.
    pub fn creator_id(&self) -> u64 {
        self.own_creator_id
    }

    /// A one-line summary of accumulated round-trip statistics.
    pub fn display_stats(&self) -> String {
        self.stats.display()
    }

    /// Fetch and return the current directory snapshot for `path`,
    /// scheduling a background refresh first if the cached entry is older
    /// than `config.update_interval_ms`.
    pub fn get_dir_data(&self, path: &str) -> Result<DirData, Error> {
        let od = self.get_open_dir(path, CreateMode::NoAutoCreate)?;
        if od.elapsed_since_last_update_ms() > self.config.update_interval_ms {
            self.schedule_refresh(path);
        }
        Ok(od.get_dir_data(true))
    }

    /// If `path` is cached and its `needs_reconciliation` hint is set,
    /// enqueue a refresh without waiting for it.
    pub fn check_for_reconciliation(&self, path: &str) {
        if let PeekOutcome::Found(od) = self.cache.read_no_op_creation(path) {
            if od.needs_reconciliation() {
                self.schedule_refresh(path);
            }
        }
    }

    /// Enqueue a refresh for `path` and block until it completes.
    pub fn update_open_dir(&self, od: &OpenDir) {
        let op = ActiveOp::new(Request {
            path: od.path().to_string(),
            kind: RequestKind::Update,
        });
        if self.queue.push(op.clone()) {
            op.wait_for_completion();
        } else {
            warn!(path = od.path(), "update request dropped: queue full");
        }
    }

    fn schedule_refresh(&self, path: &str) {
        let op = ActiveOp::new(Request {
            path: path.to_string(),
            kind: RequestKind::Update,
        });
        if !self.queue.push(op) {
            warn!(path, "refresh request dropped: queue full");
        }
    }

    /// The full `get_open_dir` state machine: look up `path`, attach to or
    /// launch a fetch if needed, then re-read once the fetch completes. See
    /// `SPEC_FULL.md` §4.4.1 for the full diagram this method implements.
    pub fn get_open_dir(&self, path: &str, create_mode: CreateMode) -> Result<Arc<OpenDir>, Error> {
        if path.len() > OpenDir::MAX_PATH {
            return Err(Error::InvalidPath(path.to_string()));
        }

        let request = Request {
            path: path.to_string(),
            kind: RequestKind::Initial,
        };

        match self.cache.read(path, request) {
            ReadOutcome::Found(od) => return Ok(od),
            ReadOutcome::ActiveOpExisting(op) => op.wait_for_completion(),
            ReadOutcome::ActiveOpCreated(op) => {
                if self.queue.push(op.clone()) {
                    op.wait_for_completion();
                } else {
                    // Dropped under overload: nobody will ever process this
                    // op, so don't leave it shadowing the path forever.
                    self.cache.remove_active_op(path);
                    op.set_complete();
                }
            }
        }

        match self.cache.read_no_op_creation(path) {
            PeekOutcome::Found(od) => Ok(od),
            PeekOutcome::NotFound | PeekOutcome::ActiveOpExisting(_) => {
                self.cache.remove_active_op(path);
                match create_mode {
                    CreateMode::NoAutoCreate => Err(Error::NotFound {
                        path: path.to_string(),
                    }),
                    CreateMode::AutoCreate => {
                        let od = OpenDir::new(path, None);
                        let _ = self.cache.store(path, od);
                        match self.cache.read_no_op_creation(path) {
                            PeekOutcome::Found(od) => Ok(od),
                            _ => Err(Error::internal(
                                "cache store of an auto-created entry did not become visible",
                            )),
                        }
                    }
                }
            }
        }
    }

    /// Stop accepting new requests, drain and join every worker thread, and
    /// drop the session pool.
    pub fn shutdown(self) {
        self.queue.shutdown();
    }
}

/// The per-batch key-value store round trip and response dispatch: the KVS
/// batch handler from `SPEC_FULL.md` §4.4.2.
#[allow(clippy::too_many_arguments)]
fn process_batch<K: KvsSession, R: ReconciliationSet, W: OpenDirWriter>(
    ops: Vec<ActiveOpRef>,
    worker_idx: usize,
    sessions: &SessionPool<K>,
    namespace: &str,
    cache: &OpenDirCache,
    reconciliation: &R,
    writer: &W,
    stats: &ResponseTimeStats,
    own_creator_id: u64,
) {
    if ops.is_empty() {
        return;
    }

    // Distinct paths, in order of first appearance, namespaced for the KVS.
    let mut query_keys = Vec::with_capacity(ops.len());
    let mut index_of = std::collections::HashMap::new();
    for op in &ops {
        let path = &op.request().path;
        index_of.entry(path.clone()).or_insert_with(|| {
            let idx = query_keys.len();
            query_keys.push(format!("{namespace}/{path}"));
            idx
        });
    }

    let started = Instant::now();
    let results = sessions[worker_idx].lock().multi_get(&query_keys);
    stats.record(started.elapsed());

    let results = match results {
        Ok(results) => Some(results),
        Err(e) => {
            warn!(worker = worker_idx, error = %e, "multi_get call failed for entire batch");
            None
        }
    };

    // Reverse-order walk so that, for any path duplicated across this
    // batch, the same index ordering the source relied on for shared-value
    // ownership applies here too: the first index seen during the reverse
    // scan is the one that actually drives the cache update.
    let mut seen = HashSet::new();
    for op in ops.iter().rev() {
        let path = op.request().path.clone();
        let is_first_seen = seen.insert(path.clone());

        if is_first_seen {
            let state = results
                .as_ref()
                .map(|r| &r[index_of[&path]]);
            dispatch_one(
                &path,
                op.request().kind,
                state,
                cache,
                reconciliation,
                writer,
                own_creator_id,
            );
        }

        op.set_complete();
    }
}

fn dispatch_one<R: ReconciliationSet, W: OpenDirWriter>(
    path: &str,
    kind: RequestKind,
    state: Option<&KeyState>,
    cache: &OpenDirCache,
    reconciliation: &R,
    writer: &W,
    own_creator_id: u64,
) {
    let Some(state) = state else {
        // The whole multi_get call failed; session health was already
        // logged by the caller. Every op still completes.
        return;
    };

    match state {
        KeyState::Succeeded { value, metadata } => match kind {
            RequestKind::Initial => {
                let od = OpenDir::new(path, Some(value.clone()));
                if cache.store(path, od) == StoreOutcome::Rejected {
                    trace!(path, "initial fetch lost the store race, discarding");
                }
            }
            RequestKind::Update => {
                if let PeekOutcome::Found(od) = cache.read_no_op_creation(path) {
                    let needs_write_back =
                        od.add_dir_data(Some(value.clone()), Some(*metadata), own_creator_id, reconciliation);
                    maybe_write_back(&od, path, needs_write_back, writer);
                } else {
                    warn!(path, "update response for a path no longer cached");
                }
            }
        },
        KeyState::Incomplete => {
            let err = Error::transient(path, "key-value store response incomplete");
            warn!(path, %err, "session health: transient key-value error");
        }
        KeyState::Failed(FailureCause::NoSuchValue) => {
            if let RequestKind::Update = kind {
                if let PeekOutcome::Found(od) = cache.read_no_op_creation(path) {
                    let needs_write_back =
                        od.add_dir_data(None, None, own_creator_id, reconciliation);
                    maybe_write_back(&od, path, needs_write_back, writer);
                }
            }
            // Initial + NoSuchValue: leave the cache untouched; the caller's
            // re-read will see NotFound and decide whether to auto-create.
        }
        KeyState::Failed(FailureCause::Multiple) => {
            tracing::info!(path, "multiple concurrent values observed for key");
        }
        KeyState::Failed(FailureCause::Error) => {
            let err = Error::transient(path, "key-value store operation failed");
            warn!(path, %err, "session health: transient key-value error");
        }
    }
}

fn maybe_write_back<W: OpenDirWriter>(od: &Arc<OpenDir>, path: &str, needs_write_back: bool, writer: &W) {
    if needs_write_back && od.set_queued_for_write() {
        writer.write_dir(path, od);
        // This writer is fire-and-forget with no completion signal, so the
        // slot is released immediately rather than held until some
        // acknowledgment this crate has no way to observe.
        od.clear_queued_for_write();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kvs::InMemoryKvsSession;
    use crate::reconcile::InMemoryReconciliationSet;
    use crate::writer::RecordingWriter;
    use std::time::Duration;

    fn test_reader(
        kvs: InMemoryKvsSession,
    ) -> DirDataReader<InMemoryKvsSession, InMemoryReconciliationSet, RecordingWriter> {
        let config = DirCacheConfig::builder().dht_threads(2).build();
        DirDataReader::new(
            config,
            move |_idx| kvs.shared(),
            InMemoryReconciliationSet::new(),
            RecordingWriter::new(),
        )
    }

    #[test]
    fn cold_read_no_auto_create_fetches_existing_value() {
        let kvs = InMemoryKvsSession::new();
        kvs.seed("/a", DirData::from_entries([("x".into(), 1)]), 5, 1);
        let reader = test_reader(kvs);

        let dd = reader.get_dir_data("/a").unwrap();
        assert!(dd.get("x").is_some());
        reader.shutdown();
    }

    #[test]
    fn cold_read_miss_without_auto_create_is_not_found() {
        let kvs = InMemoryKvsSession::new();
        let reader = test_reader(kvs);
        let err = reader.get_open_dir("/missing", CreateMode::NoAutoCreate);
        assert!(matches!(err, Err(Error::NotFound { .. })));
        reader.shutdown();
    }

    #[test]
    fn cold_read_miss_with_auto_create_inserts_empty_entry() {
        let kvs = InMemoryKvsSession::new();
        let reader = test_reader(kvs);
        let od = reader.get_open_dir("/b", CreateMode::AutoCreate).unwrap();
        assert!(od.get_dir_data(false).is_empty());
        reader.shutdown();
    }

    #[test]
    fn concurrent_waiters_share_one_fetch() {
        let kvs = InMemoryKvsSession::new();
        kvs.seed("/d", DirData::from_entries([("x".into(), 1)]), 1, 1);
        let reader = Arc::new(test_reader(kvs));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let reader = reader.clone();
                std::thread::spawn(move || reader.get_dir_data("/d").unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in &results[1..] {
            assert_eq!(*r, results[0]);
        }
    }

    #[test]
    fn local_addition_triggers_write_back_when_remote_lacks_it() {
        let kvs = InMemoryKvsSession::new();
        kvs.seed("/a", DirData::from_entries([("x".into(), 1)]), 5, 2);
        let config = DirCacheConfig::builder().dht_threads(1).build();
        let writer = RecordingWriter::new();
        let writer_receiver = writer.receiver.clone();
        let reconciliation = InMemoryReconciliationSet::new();
        let reader = DirDataReader::new(config, move |_i| kvs.shared(), reconciliation, writer);

        let od = reader.get_open_dir("/a", CreateMode::NoAutoCreate).unwrap();
        od.add_entry("z", 2, &InMemoryReconciliationSet::new());
        reader.update_open_dir(&od);

        let got = writer_receiver.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(got, "/a");
        assert!(od.needs_reconciliation());
        reader.shutdown();
    }
}
