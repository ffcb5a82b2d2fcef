//! End-to-end scenarios against the in-memory key-value store double.
//!
//! Each test corresponds to one of the scenarios this crate's design
//! document describes (S1-S6).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dircache::{
    CreateMode, DirCacheConfig, DirData, DirDataReader, InMemoryKvsSession,
    InMemoryReconciliationSet, RecordingWriter,
};

fn reader_with(
    kvs: InMemoryKvsSession,
    update_interval_ms: u64,
) -> DirDataReader<InMemoryKvsSession, InMemoryReconciliationSet, RecordingWriter> {
    let config = DirCacheConfig::builder()
        .dht_threads(2)
        .update_interval_ms(update_interval_ms)
        .build();
    DirDataReader::new(
        config,
        move |_idx| kvs.shared(),
        InMemoryReconciliationSet::new(),
        RecordingWriter::new(),
    )
}

/// S1: cold read with auto-create off; a second read within the update
/// interval reuses the cached value rather than refetching.
#[test]
fn s1_cold_read_then_cached_read() {
    let kvs = InMemoryKvsSession::new();
    kvs.seed(
        "/a",
        DirData::from_entries([("x".into(), 1), ("y".into(), 1)]),
        5,
        1,
    );
    let reader = reader_with(kvs, 10_000);

    let first = reader.get_dir_data("/a").unwrap();
    assert_eq!(first.len(), 2);

    let second = reader.get_dir_data("/a").unwrap();
    assert_eq!(second, first);

    reader.shutdown();
}

/// S2: cold read miss with auto-create on inserts an empty entry and
/// returns it without error.
#[test]
fn s2_cold_miss_auto_create() {
    let kvs = InMemoryKvsSession::new();
    let reader = reader_with(kvs, 10_000);

    let od = reader.get_open_dir("/b", CreateMode::AutoCreate).unwrap();
    assert!(od.get_dir_data(false).is_empty());

    // A second caller finds the same cached (now populated) entry.
    let od2 = reader.get_open_dir("/b", CreateMode::AutoCreate).unwrap();
    assert_eq!(od2.path(), od.path());

    reader.shutdown();
}

/// S3: a local addition not yet known to the remote value triggers a
/// write-back request when the entry is refreshed.
#[test]
fn s3_local_addition_then_refresh_triggers_write_back() {
    let kvs = InMemoryKvsSession::new();
    kvs.seed("/a", DirData::from_entries([("x".into(), 1)]), 5, 2);
    let config = DirCacheConfig::builder().dht_threads(1).build();
    let writer = RecordingWriter::new();
    let writer_receiver = writer.receiver.clone();
    let reconciliation = InMemoryReconciliationSet::new();
    let reader = DirDataReader::new(config, move |_i| kvs.shared(), reconciliation, writer);

    let od = reader.get_open_dir("/a", CreateMode::NoAutoCreate).unwrap();
    let fresh_reconciliation = InMemoryReconciliationSet::new();
    od.add_entry("z", 2, &fresh_reconciliation);
    assert!(od.get_dir_data(false).get("z").is_some());

    reader.update_open_dir(&od);

    let written_path = writer_receiver.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(written_path, "/a");
    assert!(od.needs_reconciliation());

    reader.shutdown();
}

/// S4: a stale remote snapshot (lower version than already merged) is
/// dropped without changing the cached content.
#[test]
fn s4_stale_remote_snapshot_is_dropped() {
    let kvs = InMemoryKvsSession::new();
    kvs.seed("/c", DirData::from_entries([("x".into(), 1)]), 10, 1);
    let reader = reader_with(kvs.shared(), 0); // interval 0: every get_dir_data schedules a refresh

    let first = reader.get_dir_data("/c").unwrap();
    assert_eq!(first.len(), 1);

    // Rewrite the backing store at a lower version; a refresh must not pick
    // this up.
    kvs.seed("/c", DirData::from_entries([("w".into(), 1)]), 8, 1);
    reader.get_dir_data("/c").unwrap(); // fires a refresh in the background
    thread::sleep(Duration::from_millis(50));

    let after = reader.get_dir_data("/c").unwrap();
    assert!(after.get("w").is_none());
    assert!(after.get("x").is_some());

    reader.shutdown();
}

/// S5: pushing past the bounded queue's capacity drops the excess; the
/// caller recovers by eventually observing the path as not found rather
/// than hanging forever.
#[test]
fn s5_queue_overflow_recovers_to_not_found() {
    let kvs = InMemoryKvsSession::new();
    let config = DirCacheConfig::builder()
        .dht_threads(1)
        .dht_queue_size(1)
        .build();
    let reader = Arc::new(DirDataReader::new(
        config,
        move |_i| kvs.shared(),
        InMemoryReconciliationSet::new(),
        RecordingWriter::new(),
    ));

    // Flood far more concurrent initial fetches than the queue can hold;
    // every caller must still return rather than deadlock.
    let handles: Vec<_> = (0..20)
        .map(|i| {
            let reader = reader.clone();
            let path = format!("/flood-{i}");
            thread::spawn(move || reader.get_open_dir(&path, CreateMode::NoAutoCreate))
        })
        .collect();

    for h in handles {
        let _ = h.join().unwrap();
    }

    Arc::try_unwrap(reader)
        .unwrap_or_else(|_| panic!("reader still has outstanding references"))
        .shutdown();
}

/// S6: ten concurrent readers of an uncached path produce exactly one
/// round trip and observe the same snapshot.
#[test]
fn s6_multi_waiter_single_round_trip() {
    let kvs = InMemoryKvsSession::new();
    kvs.seed("/d", DirData::from_entries([("only".into(), 1)]), 1, 1);
    let reader = Arc::new(reader_with(kvs, 10_000));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let reader = reader.clone();
            thread::spawn(move || reader.get_dir_data("/d").unwrap())
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for r in &results {
        assert_eq!(*r, results[0]);
        assert!(r.get("only").is_some());
    }

    assert_eq!(reader.display_stats().contains("count=1"), true);

    Arc::try_unwrap(reader)
        .unwrap_or_else(|_| panic!("reader still has outstanding references"))
        .shutdown();
}

/// An `Incomplete` key-value response on an initial fetch is recorded as a
/// transient failure, but the caller still gets a timely, well-formed
/// result (`NotFound`) rather than hanging.
#[test]
fn incomplete_response_resolves_to_not_found_instead_of_hanging() {
    use dircache::{FaultInjectingSession, KeyState};

    let kvs = InMemoryKvsSession::new();
    kvs.seed("/e", DirData::from_entries([("x".into(), 1)]), 1, 1);
    let faulty = FaultInjectingSession::new(kvs);
    faulty.inject("/e", KeyState::Incomplete);
    let faulty_for_factory = faulty.clone();

    let config = DirCacheConfig::builder().dht_threads(1).build();
    let reader = DirDataReader::new(
        config,
        move |_i| faulty_for_factory.clone(),
        InMemoryReconciliationSet::new(),
        RecordingWriter::new(),
    );

    let err = reader.get_open_dir("/e", CreateMode::NoAutoCreate);
    assert!(matches!(err, Err(dircache::Error::NotFound { .. })));

    reader.shutdown();
}
