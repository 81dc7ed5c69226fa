use super::*;
use crate::{
    store::MemoryStore,
    test_support::{memory_mapper, row},
    value::Value,
};
use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicUsize, Ordering},
};
use strata_schema::ID_FIELD;

///
/// Collect
///

#[derive(Clone, Default)]
struct Collect {
    seen: Arc<Mutex<Vec<Value>>>,
    completed: Arc<AtomicUsize>,
}

impl TokenVisitor for Collect {
    fn visit(&mut self, row: &Row) {
        if let Some(id) = row.get(ID_FIELD) {
            self.seen.lock().push(id.clone());
        }
    }

    fn on_complete(&mut self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

async fn ledger_mapper(rows: i64) -> (ObjectMapper, Arc<MemoryStore>) {
    let (mapper, store) = memory_mapper().await;
    for n in 0..rows {
        mapper
            .insert(
                "ledger",
                row([("foreignid", Value::BigInt(n)), ("type", Value::Int(0))]),
            )
            .await
            .expect("insert should succeed");
    }

    (mapper, store)
}

///
/// Ranges
///

#[test]
fn two_ranges_split_the_ring_at_zero() {
    let ranges = make_ranges(2).expect("two partitions");

    assert_eq!(ranges, vec![i64::MIN..=-1, 0..=i64::MAX]);
}

#[test]
fn ranges_are_contiguous_and_cover_the_ring() {
    for partitions in 1..17 {
        let ranges = make_ranges(partitions).expect("partitions above zero");

        assert_eq!(ranges.len(), partitions);
        assert_eq!(*ranges[0].start(), i64::MIN);
        assert_eq!(*ranges[partitions - 1].end(), i64::MAX);
        for pair in ranges.windows(2) {
            assert_eq!(*pair[0].end() + 1, *pair[1].start());
        }
    }
}

#[test]
fn zero_partitions_is_an_error() {
    assert!(matches!(make_ranges(0), Err(ScanError::NoPartitions)));
}

///
/// Scans
///

#[tokio::test]
async fn every_object_is_visited_exactly_once_across_partitions() {
    let (mapper, _store) = ledger_mapper(300).await;
    let collect = Collect::default();

    let report = TableScanner::new(mapper, "ledger", 4)
        .with_batch_size(40)
        .scan(|_| collect.clone())
        .await
        .expect("scan should succeed");

    assert_eq!(report, ScanReport { visited: 300, partitions: 4 });
    assert_eq!(collect.completed.load(Ordering::Relaxed), 4);

    let unique: BTreeSet<_> = collect
        .seen
        .lock()
        .iter()
        .map(Value::to_index_string)
        .collect();
    assert_eq!(unique.len(), 300);
}

#[tokio::test]
async fn scan_resumes_after_the_recorded_cursor() {
    let (mapper, _store) = ledger_mapper(120).await;
    let first_pass = Collect::default();

    TableScanner::new(mapper.clone(), "ledger", 1)
        .with_batch_size(25)
        .scan(|_| first_pass.clone())
        .await
        .expect("scan should succeed");
    let order = first_pass.seen.lock().clone();
    assert_eq!(order.len(), 120);

    let dir = tempfile::tempdir().expect("temp dir");
    ResumeCursor::new(dir.path(), "ledger", 0)
        .record(&order[49])
        .await
        .expect("cursor should write");

    let resumed = Collect::default();
    let report = TableScanner::new(mapper, "ledger", 1)
        .with_batch_size(25)
        .with_resume_dir(dir.path())
        .scan(|_| resumed.clone())
        .await
        .expect("resumed scan should succeed");

    assert_eq!(report.visited, 70);
    assert_eq!(*resumed.seen.lock(), order[50..].to_vec());
}

#[tokio::test]
async fn cursor_file_tracks_the_last_visited_id() {
    let (mapper, _store) = ledger_mapper(30).await;
    let dir = tempfile::tempdir().expect("temp dir");
    let collect = Collect::default();

    TableScanner::new(mapper.clone(), "ledger", 1)
        .with_batch_size(10)
        .with_resume_dir(dir.path())
        .scan(|_| collect.clone())
        .await
        .expect("scan should succeed");

    let cursor = ResumeCursor::new(dir.path(), "ledger", 0);
    assert!(cursor.path().ends_with("ledger-0.cursor"));
    let last = cursor
        .load(strata_schema::types::FieldType::Timeuuid)
        .await
        .expect("cursor should load");
    assert_eq!(last.as_ref(), collect.seen.lock().last());

    // a finished partition has nothing left on a rerun
    let rerun = TableScanner::new(mapper, "ledger", 1)
        .with_resume_dir(dir.path())
        .scan(|_| Collect::default())
        .await
        .expect("rerun should succeed");
    assert_eq!(rerun.visited, 0);
}

#[tokio::test]
async fn transient_page_failures_are_retried() {
    let (mapper, store) = ledger_mapper(20).await;

    store.fail_next("token(id)", 2);
    let report = TableScanner::new(mapper, "ledger", 1)
        .scan(|_| Collect::default())
        .await
        .expect("scan should survive two failures");

    assert_eq!(report.visited, 20);
}

#[tokio::test]
async fn every_configured_retry_is_attempted() {
    let (mapper, store) = ledger_mapper(5).await;

    store.fail_next("token(id)", 3);
    let report = TableScanner::new(mapper.clone(), "ledger", 1)
        .with_retries(3)
        .scan(|_| Collect::default())
        .await
        .expect("three retries absorb three failures");
    assert_eq!(report.visited, 5);

    store.fail_next("token(id)", 1);
    TableScanner::new(mapper, "ledger", 1)
        .with_retries(0)
        .scan(|_| Collect::default())
        .await
        .expect_err("no retries gives up on the first failure");
}

///
/// PanicOnComplete
///

struct PanicOnComplete {
    partition: usize,
    doomed: usize,
}

impl TokenVisitor for PanicOnComplete {
    fn visit(&mut self, _row: &Row) {}

    fn on_complete(&mut self) {
        assert_ne!(self.partition, self.doomed, "visitor failed");
    }
}

#[tokio::test]
async fn aborted_partition_is_named_in_the_error() {
    let (mapper, _store) = ledger_mapper(12).await;

    let err = TableScanner::new(mapper, "ledger", 3)
        .scan(|partition| PanicOnComplete {
            partition,
            doomed: 1,
        })
        .await
        .expect_err("a panicking partition fails the scan");

    assert!(
        err.to_string().contains("scan partition 1 aborted"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn persistent_page_failures_abort_the_scan() {
    let (mapper, store) = ledger_mapper(5).await;

    store.fail_next("token(id)", 10);
    let err = TableScanner::new(mapper, "ledger", 1)
        .with_retries(3)
        .scan(|_| Collect::default())
        .await
        .expect_err("scan should give up");

    assert_eq!(err.class, crate::error::ErrorClass::Unavailable);
}

#[tokio::test]
async fn unreadable_cursor_is_reported() {
    let (mapper, _store) = ledger_mapper(1).await;
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(dir.path().join("ledger-0.cursor"), "not-an-id\n").expect("write cursor");

    let err = TableScanner::new(mapper, "ledger", 1)
        .with_resume_dir(dir.path())
        .scan(|_| Collect::default())
        .await
        .expect_err("corrupt cursor should fail");

    assert!(err.to_string().contains("corrupt resume cursor"));
}
