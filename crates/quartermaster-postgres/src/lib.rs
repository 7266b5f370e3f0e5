//! PostgreSQL implementation of the quartermaster ledger store.
//!
//! This crate provides a PostgreSQL implementation of the `LedgerStore` trait from
//! the quartermaster ledger.
//!
//! # Features
//!
//! - Batch appends in a single transaction
//! - Offset pagination ordered by `(created_at, id)`
//! - One table per logical ledger (ammunition, equipment, ...)
//! - Negative stored quantities are refused at decode instead of being reinterpreted
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE ledger_records (
//!     id UUID PRIMARY KEY,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!
//!     -- Movement
//!     item_name TEXT NOT NULL,
//!     quantity INTEGER NOT NULL,
//!     need_type TEXT NOT NULL,
//!     unit TEXT NOT NULL,
//!     category TEXT NOT NULL DEFAULT 'general',
//!
//!     -- Workflow
//!     stage TEXT NOT NULL,
//!     requester JSONB,
//!     countersigner JSONB,
//!     acknowledged BOOLEAN NOT NULL DEFAULT FALSE,
//!     note TEXT
//! );
//!
//! CREATE INDEX idx_ledger_records_unit ON ledger_records (unit, stage);
//! CREATE INDEX idx_ledger_records_order ON ledger_records (created_at, id);
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use quartermaster::Ledger;
//! use quartermaster_postgres::PgLedgerStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/armory").await?;
//! let store = PgLedgerStore::with_table(pool, "ammo_records")?;
//! store.create_table().await?;
//!
//! let ledger = Ledger::builder(Arc::new(store)).build();
//! ```

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use quartermaster::{
    Identity, LedgerRecord, LedgerStore, PageRequest, RecordFilter, RecordId, RecordPatch,
};
use sqlx::postgres::{PgPool, PgRow, Postgres};
use sqlx::{QueryBuilder, Row};

/// Table used when none is given.
pub const DEFAULT_TABLE: &str = "ledger_records";

/// PostgreSQL ledger store for one table.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    table: String,
}

impl PgLedgerStore {
    /// Create a store over the default `ledger_records` table.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Create a store over a named table.
    ///
    /// The name is spliced into SQL, so it must be a plain identifier.
    pub fn with_table(pool: PgPool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        check_identifier(&table)?;
        Ok(Self { pool, table })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    /// Insert the whole batch or nothing.
    async fn append(&self, records: Vec<LedgerRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        insert_sql(&self.table, &records)?
            .build()
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn query(&self, filter: &RecordFilter, page: PageRequest) -> Result<Vec<LedgerRecord>> {
        let rows = select_sql(&self.table, filter, page)?
            .build()
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode).collect()
    }

    async fn get(&self, id: RecordId) -> Result<Option<LedgerRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {} WHERE id = $1",
            self.table
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode).transpose()
    }

    /// Change the acknowledgement flag and/or stage of one record.
    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<()> {
        let Some(mut builder) = update_sql(&self.table, id, &patch) else {
            return Ok(());
        };

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            bail!("record {id} not found in {}", self.table);
        }
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> Result<()> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", self.table))
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            bail!("record {id} not found in {}", self.table);
        }
        Ok(())
    }
}

/// Utility functions for table management.
impl PgLedgerStore {
    /// Create the table and its indexes if they do not exist.
    pub async fn create_table(&self) -> Result<()> {
        let table = &self.table;
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                item_name TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                need_type TEXT NOT NULL,
                unit TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                stage TEXT NOT NULL,
                requester JSONB,
                countersigner JSONB,
                acknowledged BOOLEAN NOT NULL DEFAULT FALSE,
                note TEXT
            )
            "#
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_unit ON {table} (unit, stage)"
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_order ON {table} (created_at, id)"
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Count records per workflow stage.
    pub async fn stats(&self) -> Result<StageCounts> {
        let row = sqlx::query(&format!(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE stage = 'requested') as requested,
                COUNT(*) FILTER (WHERE stage = 'escalated') as escalated,
                COUNT(*) FILTER (WHERE stage = 'countersigned') as countersigned,
                COUNT(*) FILTER (WHERE stage = 'report') as report,
                COUNT(*) FILTER (WHERE NOT acknowledged) as unacknowledged
            FROM {}
            "#,
            self.table
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(StageCounts {
            requested: row.get("requested"),
            escalated: row.get("escalated"),
            countersigned: row.get("countersigned"),
            report: row.get("report"),
            unacknowledged: row.get("unacknowledged"),
        })
    }
}

/// Record counts by stage.
#[derive(Debug, Clone, Copy)]
pub struct StageCounts {
    pub requested: i64,
    pub escalated: i64,
    pub countersigned: i64,
    pub report: i64,
    pub unacknowledged: i64,
}

const COLUMNS: &str = "id, created_at, item_name, quantity, need_type, unit, category, stage, \
                       requester, countersigner, acknowledged, note";

fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    if !valid_start
        || name.len() > 63
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        bail!("invalid table name '{name}'");
    }
    Ok(())
}

fn insert_sql<'a>(
    table: &str,
    records: &'a [LedgerRecord],
) -> Result<QueryBuilder<'a, Postgres>> {
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let quantity = i32::try_from(record.quantity)
            .with_context(|| format!("quantity {} out of range", record.quantity))?;
        rows.push((
            record,
            quantity,
            identity_json(record.requester.as_ref())?,
            identity_json(record.countersigner.as_ref())?,
        ));
    }

    let mut builder = QueryBuilder::new(format!("INSERT INTO {table} ({COLUMNS}) "));
    builder.push_values(rows, |mut b, (record, quantity, requester, countersigner)| {
        b.push_bind(record.id.0)
            .push_bind(record.timestamp)
            .push_bind(record.item_name.as_str())
            .push_bind(quantity)
            .push_bind(record.need_type.as_str())
            .push_bind(record.unit.as_str())
            .push_bind(record.category.as_str())
            .push_bind(record.stage.as_str())
            .push_bind(requester)
            .push_bind(countersigner)
            .push_bind(record.acknowledged)
            .push_bind(record.note.as_deref());
    });
    Ok(builder)
}

fn select_sql<'a>(
    table: &str,
    filter: &'a RecordFilter,
    page: PageRequest,
) -> Result<QueryBuilder<'a, Postgres>> {
    let mut builder = QueryBuilder::new(format!("SELECT {COLUMNS} FROM {table} WHERE TRUE"));

    if let Some(unit) = &filter.unit {
        builder.push(" AND unit = ").push_bind(unit.as_str());
    }
    if let Some(stage) = filter.stage {
        builder.push(" AND stage = ").push_bind(stage.as_str());
    }
    if let Some(need_type) = filter.need_type {
        builder.push(" AND need_type = ").push_bind(need_type.as_str());
    }
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(item) = &filter.item {
        builder.push(" AND item_name = ").push_bind(item.as_str());
    }
    if let Some(from) = filter.from {
        builder.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND created_at < ").push_bind(to);
    }

    let limit = i64::try_from(page.limit).context("page limit out of range")?;
    let offset = i64::try_from(page.offset).context("page offset out of range")?;
    builder
        .push(" ORDER BY created_at ASC, id ASC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);
    Ok(builder)
}

fn update_sql<'a>(
    table: &str,
    id: RecordId,
    patch: &RecordPatch,
) -> Option<QueryBuilder<'a, Postgres>> {
    if patch.acknowledged.is_none() && patch.stage.is_none() {
        return None;
    }

    let mut builder = QueryBuilder::new(format!("UPDATE {table} SET "));
    let mut set = builder.separated(", ");
    if let Some(acknowledged) = patch.acknowledged {
        set.push("acknowledged = ").push_bind_unseparated(acknowledged);
    }
    if let Some(stage) = patch.stage {
        set.push("stage = ").push_bind_unseparated(stage.as_str());
    }
    builder.push(" WHERE id = ").push_bind(id.0);
    Some(builder)
}

fn identity_json(identity: Option<&Identity>) -> Result<Option<serde_json::Value>> {
    identity
        .map(serde_json::to_value)
        .transpose()
        .context("encoding identity")
}

fn identity_from(value: Option<serde_json::Value>) -> Result<Option<Identity>> {
    value
        .map(serde_json::from_value)
        .transpose()
        .context("decoding identity")
}

fn decode(row: &PgRow) -> Result<LedgerRecord> {
    let id: uuid::Uuid = row.try_get("id")?;
    let quantity: i32 = row.try_get("quantity")?;
    // pre-negated legacy rows: the sign belongs to need_type, not quantity
    let quantity = u32::try_from(quantity)
        .map_err(|_| anyhow!("record {id} stores negative quantity {quantity}"))?;

    Ok(LedgerRecord {
        id: RecordId(id),
        timestamp: row.try_get("created_at")?,
        item_name: row.try_get("item_name")?,
        quantity,
        need_type: row.try_get::<&str, _>("need_type")?.parse()?,
        unit: row.try_get("unit")?,
        category: row.try_get::<&str, _>("category")?.parse()?,
        stage: row.try_get::<&str, _>("stage")?.parse()?,
        requester: identity_from(row.try_get("requester")?)?,
        countersigner: identity_from(row.try_get("countersigner")?)?,
        acknowledged: row.try_get("acknowledged")?,
        note: row.try_get("note")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quartermaster::{Category, NeedType, Stage};

    #[test]
    fn table_names_must_be_identifiers() {
        assert!(check_identifier("ledger_records").is_ok());
        assert!(check_identifier("ammo_2024").is_ok());
        assert!(check_identifier("_equipment").is_ok());

        assert!(check_identifier("").is_err());
        assert!(check_identifier("2024_ammo").is_err());
        assert!(check_identifier("Ammo").is_err());
        assert!(check_identifier("ammo; DROP TABLE x").is_err());
        assert!(check_identifier(&"a".repeat(64)).is_err());
    }

    #[test]
    fn select_binds_every_filter() {
        let filter = RecordFilter::all()
            .unit("A")
            .stage(Stage::Countersigned)
            .category(Category::Ball);
        let builder = select_sql("ammo", &filter, PageRequest { offset: 20, limit: 10 }).unwrap();

        assert_eq!(
            builder.sql(),
            "SELECT id, created_at, item_name, quantity, need_type, unit, category, stage, \
             requester, countersigner, acknowledged, note FROM ammo WHERE TRUE \
             AND unit = $1 AND stage = $2 AND category = $3 \
             ORDER BY created_at ASC, id ASC LIMIT $4 OFFSET $5"
        );
    }

    #[test]
    fn unfiltered_select_only_pages() {
        let filter = RecordFilter::all();
        let builder = select_sql("ammo", &filter, PageRequest { offset: 0, limit: 1000 }).unwrap();
        assert!(builder
            .sql()
            .ends_with("WHERE TRUE ORDER BY created_at ASC, id ASC LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn update_sets_only_patched_fields() {
        let id = RecordId::new();
        assert!(update_sql("ammo", id, &RecordPatch::default()).is_none());

        let ack = update_sql("ammo", id, &RecordPatch::acknowledged(true)).unwrap();
        assert_eq!(ack.sql(), "UPDATE ammo SET acknowledged = $1 WHERE id = $2");

        let both = RecordPatch {
            acknowledged: Some(false),
            stage: Some(Stage::Escalated),
        };
        let builder = update_sql("ammo", id, &both).unwrap();
        assert_eq!(
            builder.sql(),
            "UPDATE ammo SET acknowledged = $1, stage = $2 WHERE id = $3"
        );
    }

    #[test]
    fn insert_has_one_tuple_per_record() {
        let records = vec![
            LedgerRecord::draft("vest", 1, NeedType::Issue, "A", Stage::Requested),
            LedgerRecord::draft("vest", 1, NeedType::Credit, "battalion", Stage::Requested),
        ];
        let builder = insert_sql("ammo", &records).unwrap();

        assert!(builder.sql().starts_with("INSERT INTO ammo (id, created_at"));
        assert!(builder.sql().contains("$12), ($13"));
        assert!(builder.sql().ends_with("$24)"));
    }

    #[test]
    fn oversized_quantity_is_refused() {
        let records = vec![LedgerRecord::draft(
            "5.56",
            u32::MAX,
            NeedType::Issue,
            "A",
            Stage::Requested,
        )];
        assert!(insert_sql("ammo", &records).is_err());
    }

    #[test]
    fn identities_round_trip_through_json() {
        let identity = Identity::new("Lt. Dor", "7654321").with_signature("sig/1");
        let json = identity_json(Some(&identity)).unwrap();
        assert_eq!(json.as_ref().unwrap()["personal_id"], "7654321");
        assert_eq!(identity_from(json).unwrap(), Some(identity));
        assert_eq!(identity_from(None).unwrap(), None);
    }
}
