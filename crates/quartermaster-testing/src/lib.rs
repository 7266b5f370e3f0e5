//! Testing utilities for the quartermaster ledger.
//!
//! - [`MemoryStore`]: an in-memory [`LedgerStore`] with failure injection
//! - [`fixtures`]: identities, actors and record shorthands for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use quartermaster::{LedgerRecord, LedgerStore, PageRequest, RecordFilter, RecordId, RecordPatch};
use tokio::sync::{Notify, RwLock};

pub mod fixtures;

/// In-memory ledger table.
///
/// Appends are atomic. Queries return records ordered by timestamp then id, like a
/// real store would.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<Vec<LedgerRecord>>>,
    faults: Arc<Faults>,
}

#[derive(Default)]
struct Faults {
    /// Fail the query at this page offset (1-based count of queries; 0 = never).
    query_at: AtomicUsize,
    queries: AtomicUsize,
    fail_appends: AtomicUsize,
    appends: AtomicUsize,
    fail_updates: AtomicUsize,
    hold: Mutex<Option<Arc<QueryHold>>>,
}

/// Parks the next query until released. Returned by [`MemoryStore::hold_next_query`].
#[derive(Debug, Default)]
pub struct QueryHold {
    entered: Notify,
    release: Notify,
}

impl QueryHold {
    /// Wait until the held query has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held query continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with records.
    pub fn with_records(records: Vec<LedgerRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
            faults: Arc::default(),
        }
    }

    /// Make the `n`th query from now on fail (1 = the next one).
    pub fn fail_query(&self, n: usize) {
        let seen = self.faults.queries.load(Ordering::SeqCst);
        self.faults.query_at.store(seen + n, Ordering::SeqCst);
    }

    /// Make the next `n` appends fail.
    pub fn fail_appends(&self, n: usize) {
        self.faults.fail_appends.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` updates fail.
    pub fn fail_updates(&self, n: usize) {
        self.faults.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Park the next query until the returned hold is released.
    pub fn hold_next_query(&self) -> Arc<QueryHold> {
        let hold = Arc::new(QueryHold::default());
        if let Ok(mut slot) = self.faults.hold.lock() {
            *slot = Some(hold.clone());
        }
        hold
    }

    /// Number of queries served so far, failed ones included.
    pub fn query_count(&self) -> usize {
        self.faults.queries.load(Ordering::SeqCst)
    }

    /// Number of successful appends so far.
    pub fn append_count(&self) -> usize {
        self.faults.appends.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Vec<LedgerRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append(&self, records: Vec<LedgerRecord>) -> Result<()> {
        let pending = self.faults.fail_appends.load(Ordering::SeqCst);
        if pending > 0 {
            self.faults.fail_appends.store(pending - 1, Ordering::SeqCst);
            bail!("injected append failure");
        }

        let mut table = self.records.write().await;
        if let Some(dup) = records
            .iter()
            .find(|record| table.iter().any(|existing| existing.id == record.id))
        {
            bail!("duplicate record id {}", dup.id);
        }
        table.extend(records);
        self.faults.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, filter: &RecordFilter, page: PageRequest) -> Result<Vec<LedgerRecord>> {
        let hold = self.faults.hold.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }

        let n = self.faults.queries.fetch_add(1, Ordering::SeqCst) + 1;
        if self.faults.query_at.load(Ordering::SeqCst) == n {
            return Err(anyhow!("injected query failure at offset {}", page.offset));
        }

        let table = self.records.read().await;
        let mut matching: Vec<&LedgerRecord> =
            table.iter().filter(|record| filter.matches(record)).collect();
        matching.sort_by(|a, b| (a.timestamp, a.id).cmp(&(b.timestamp, b.id)));

        Ok(matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>> {
        let table = self.records.read().await;
        Ok(table.iter().find(|record| record.id == id).cloned())
    }

    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<()> {
        let pending = self.faults.fail_updates.load(Ordering::SeqCst);
        if pending > 0 {
            self.faults.fail_updates.store(pending - 1, Ordering::SeqCst);
            bail!("injected update failure");
        }

        let mut table = self.records.write().await;
        let record = table
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| anyhow!("record {id} not found"))?;
        patch.apply(record);
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        let mut table = self.records.write().await;
        let before = table.len();
        table.retain(|record| record.id != id);
        if table.len() == before {
            bail!("record {id} not found");
        }
        Ok(())
    }
}
