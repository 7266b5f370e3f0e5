//! Pagination and store failure handling.

use std::sync::Arc;

use quartermaster::{drain, Ledger, LedgerError, LedgerStore, Line, NeedType, RecordFilter};
use quartermaster_testing::fixtures::{officer, signed};
use quartermaster_testing::MemoryStore;

fn many_issues(n: u32) -> Vec<quartermaster::LedgerRecord> {
    (0..n).map(|_| signed("A", "vest", 1, NeedType::Issue)).collect()
}

#[tokio::test]
async fn drain_reads_every_page() {
    let store = MemoryStore::with_records(many_issues(25));

    let records = drain(&store, &RecordFilter::all(), 10).await.unwrap();
    assert_eq!(records.len(), 25);
    // 10 + 10 + 5
    assert_eq!(store.query_count(), 3);
}

#[tokio::test]
async fn exact_multiple_needs_one_empty_page() {
    let store = MemoryStore::with_records(many_issues(20));

    let records = drain(&store, &RecordFilter::all(), 10).await.unwrap();
    assert_eq!(records.len(), 20);
    assert_eq!(store.query_count(), 3);
}

#[tokio::test]
async fn failing_page_aborts_the_read() {
    let store = MemoryStore::with_records(many_issues(25));
    store.fail_query(2);

    let err = drain(&store, &RecordFilter::all(), 10).await.unwrap_err();
    match err {
        LedgerError::PartialFetch { fetched, .. } => assert_eq!(fetched, 10),
        other => panic!("expected partial fetch, got {other:?}"),
    }
}

#[tokio::test]
async fn partial_fetch_blocks_projection_and_writes() {
    let store = MemoryStore::with_records(many_issues(25));
    let ledger = Ledger::builder(Arc::new(store.clone())).page_size(10).build();

    store.fail_query(3);
    assert!(matches!(
        ledger.stock("A").await,
        Err(LedgerError::PartialFetch { fetched: 20, .. })
    ));

    // a debit against an undercounted balance must never be admitted
    store.fail_query(2);
    let err = ledger
        .report_usage(&officer("A"), "A", &[Line::new("vest", 5)])
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PartialFetch { .. }));
    assert_eq!(store.len().await, 25);

    assert_eq!(ledger.stock("A").await.unwrap()["vest"], 25);
}

#[tokio::test]
async fn append_failure_is_surfaced_verbatim() {
    let store = MemoryStore::with_records(many_issues(3));
    let ledger = Ledger::builder(Arc::new(store.clone())).build();
    store.fail_appends(1);

    let err = ledger
        .report_usage(&officer("A"), "A", &[Line::new("vest", 1)])
        .await
        .unwrap_err();
    match &err {
        LedgerError::Store(source) => assert_eq!(source.to_string(), "injected append failure"),
        other => panic!("expected store error, got {other:?}"),
    }
    assert_eq!(store.len().await, 3);

    // no automatic retry happened; a resubmission goes through
    assert_eq!(store.append_count(), 0);
    ledger
        .report_usage(&officer("A"), "A", &[Line::new("vest", 1)])
        .await
        .unwrap();
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn store_through_arc_delegates() {
    let store = Arc::new(MemoryStore::with_records(many_issues(2)));
    let shared: Arc<dyn LedgerStore> = store.clone();

    let records = drain(&shared, &RecordFilter::all(), 1).await.unwrap();
    assert_eq!(records.len(), 2);
}
