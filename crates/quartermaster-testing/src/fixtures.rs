//! Shorthands for building ledger records in tests.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quartermaster::{Actor, Category, Identity, LedgerRecord, NeedType, Stage};
use serde::Deserialize;

pub fn requester() -> Identity {
    Identity::new("Pvt. Noa", "2718281").with_signature("signatures/noa.png")
}

pub fn countersigner() -> Identity {
    Identity::new("Lt. Dor", "7654321").with_signature("signatures/dor.png")
}

/// An actor signing for `unit`.
pub fn officer(unit: &str) -> Actor {
    Actor::new(countersigner(), unit)
}

/// A countersigned movement with both identities filled in.
pub fn signed(unit: &str, item: &str, quantity: u32, need_type: NeedType) -> LedgerRecord {
    LedgerRecord::draft(item, quantity, need_type, unit, Stage::Countersigned)
        .with_requester(requester())
        .with_countersigner(countersigner())
}

/// A pending request.
pub fn requested(unit: &str, item: &str, quantity: u32, need_type: NeedType) -> LedgerRecord {
    LedgerRecord::draft(item, quantity, need_type, unit, Stage::Requested)
        .with_requester(requester())
}

/// The two countersigned vest records that leave unit A holding 7.
pub fn vest_history() -> Vec<LedgerRecord> {
    vec![
        signed("A", "vest", 10, NeedType::Issue),
        signed("A", "vest", 3, NeedType::Credit),
    ]
}

#[derive(Debug, Deserialize)]
struct Row {
    unit: String,
    item: String,
    quantity: u32,
    need_type: NeedType,
    #[serde(default = "countersigned")]
    stage: Stage,
    #[serde(default)]
    category: Category,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

fn countersigned() -> Stage {
    Stage::Countersigned
}

/// Load records from a compact JSON array, e.g.
/// `[{"unit": "A", "item": "vest", "quantity": 10, "need_type": "issue"}]`.
///
/// Stage defaults to countersigned and category to general.
pub fn from_json(json: &str) -> Result<Vec<LedgerRecord>> {
    let rows: Vec<Row> = serde_json::from_str(json).context("parsing record fixture")?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut record =
                LedgerRecord::draft(row.item, row.quantity, row.need_type, row.unit, row.stage)
                    .with_category(row.category)
                    .with_requester(requester());
            if row.stage == Stage::Countersigned {
                record = record.with_countersigner(countersigner());
            }
            if let Some(timestamp) = row.timestamp {
                record = record.with_timestamp(timestamp);
            }
            record
        })
        .collect())
}
