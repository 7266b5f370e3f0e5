//! Record store interface.
//!
//! The ledger owns no persistence. It needs a store per logical table that can append a
//! batch, scan with equality filters in pages, fetch one record, and update or delete
//! one record. Store failures are `anyhow` errors and reach the caller unchanged.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};

use crate::error::LedgerError;
use crate::record::{Category, LedgerRecord, NeedType, RecordId, Stage};

/// Equality filters plus a half-open `[from, to)` timestamp range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub unit: Option<String>,
    pub stage: Option<Stage>,
    pub need_type: Option<NeedType>,
    pub category: Option<Category>,
    pub item: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn need_type(mut self, need_type: NeedType) -> Self {
        self.need_type = Some(need_type);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Whether a record passes this filter. Stores without native filtering can use this.
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        self.unit.as_ref().is_none_or(|unit| &record.unit == unit)
            && self.stage.is_none_or(|stage| record.stage == stage)
            && self.need_type.is_none_or(|need| record.need_type == need)
            && self.category.is_none_or(|category| record.category == category)
            && self.item.as_ref().is_none_or(|item| &record.item_name == item)
            && self.from.is_none_or(|from| record.timestamp >= from)
            && self.to.is_none_or(|to| record.timestamp < to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

/// Fields that may change after a record is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub acknowledged: Option<bool>,
    pub stage: Option<Stage>,
}

impl RecordPatch {
    pub fn acknowledged(value: bool) -> Self {
        Self {
            acknowledged: Some(value),
            stage: None,
        }
    }

    pub fn stage(stage: Stage) -> Self {
        Self {
            acknowledged: None,
            stage: Some(stage),
        }
    }

    pub fn apply(&self, record: &mut LedgerRecord) {
        if let Some(acknowledged) = self.acknowledged {
            record.acknowledged = acknowledged;
        }
        if let Some(stage) = self.stage {
            record.stage = stage;
        }
    }
}

/// One logical table of ledger records.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a batch. Implementations should make the batch atomic.
    async fn append(&self, records: Vec<LedgerRecord>) -> Result<()>;

    /// One page of matching records, ordered by timestamp then id.
    async fn query(&self, filter: &RecordFilter, page: PageRequest) -> Result<Vec<LedgerRecord>>;

    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>>;

    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<()>;

    /// Remove a record. Callers enforce the acknowledgement rule.
    async fn delete(&self, id: RecordId) -> Result<()>;
}

#[async_trait]
impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    async fn append(&self, records: Vec<LedgerRecord>) -> Result<()> {
        (**self).append(records).await
    }

    async fn query(&self, filter: &RecordFilter, page: PageRequest) -> Result<Vec<LedgerRecord>> {
        (**self).query(filter, page).await
    }

    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>> {
        (**self).get(id).await
    }

    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<()> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        (**self).delete(id).await
    }
}

/// Stream the pages of a query until a short page marks the end.
pub fn pages<'a, S>(
    store: &'a S,
    filter: &'a RecordFilter,
    page_size: usize,
) -> impl Stream<Item = Result<Vec<LedgerRecord>>> + 'a
where
    S: LedgerStore + ?Sized,
{
    let page_size = page_size.max(1);
    stream::try_unfold(Some(0usize), move |offset| async move {
        let Some(offset) = offset else {
            return Ok(None);
        };
        let page = store
            .query(
                filter,
                PageRequest {
                    offset,
                    limit: page_size,
                },
            )
            .await?;
        let next = (page.len() == page_size).then_some(offset + page_size);
        Ok(Some((page, next)))
    })
}

/// Fetch every matching record.
///
/// A failing page aborts the whole read with [`LedgerError::PartialFetch`]; balances must
/// never be projected over an incomplete set.
pub async fn drain<S>(
    store: &S,
    filter: &RecordFilter,
    page_size: usize,
) -> Result<Vec<LedgerRecord>, LedgerError>
where
    S: LedgerStore + ?Sized,
{
    let mut records = Vec::new();
    let mut pages = Box::pin(pages(store, filter, page_size));
    loop {
        match pages.try_next().await {
            Ok(Some(page)) => records.extend(page),
            Ok(None) => return Ok(records),
            Err(source) => {
                return Err(LedgerError::PartialFetch {
                    fetched: records.len(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(unit: &str, stage: Stage) -> LedgerRecord {
        LedgerRecord::draft("vest", 1, NeedType::Issue, unit, stage)
            .with_timestamp(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap())
    }

    #[test]
    fn filter_matches_fields() {
        let r = record("A", Stage::Countersigned);

        assert!(RecordFilter::all().matches(&r));
        assert!(RecordFilter::all().unit("A").stage(Stage::Countersigned).matches(&r));
        assert!(!RecordFilter::all().unit("B").matches(&r));
        assert!(!RecordFilter::all().need_type(NeedType::Credit).matches(&r));
        assert!(!RecordFilter::all().category(Category::Ball).matches(&r));
        assert!(RecordFilter::all().item("vest").matches(&r));
    }

    #[test]
    fn date_range_is_half_open() {
        let r = record("A", Stage::Report);
        let noon = r.timestamp;
        let later = noon + chrono::Duration::hours(1);

        assert!(RecordFilter::all().between(noon, later).matches(&r));
        assert!(!RecordFilter::all().between(later, later).matches(&r));
        assert!(!RecordFilter::all()
            .between(noon - chrono::Duration::hours(1), noon)
            .matches(&r));
    }

    #[test]
    fn patch_touches_only_mutable_fields() {
        let mut r = record("A", Stage::Requested);
        let before = r.clone();

        RecordPatch::acknowledged(true).apply(&mut r);
        assert!(r.acknowledged);
        assert_eq!(r.stage, Stage::Requested);

        RecordPatch::stage(Stage::Escalated).apply(&mut r);
        assert_eq!(r.stage, Stage::Escalated);
        assert_eq!(r.quantity, before.quantity);
        assert_eq!(r.id, before.id);
    }
}
