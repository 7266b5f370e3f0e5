//! Balance projection.
//!
//! Balances are never stored. Every read folds the applicable records into a map
//! keyed by item and unit (and optionally category), summing
//! `quantity * sign(need_type)` with exact integer arithmetic.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;

use crate::record::{Category, LedgerRecord, Stage};

/// Which fields make up a balance key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    ItemUnit,
    #[default]
    ItemUnitCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BalanceKey {
    pub item: String,
    pub unit: String,
    pub category: Option<Category>,
}

impl BalanceKey {
    pub fn new(item: impl Into<String>, unit: impl Into<String>, category: Category) -> Self {
        Self {
            item: item.into(),
            unit: unit.into(),
            category: Some(category),
        }
    }

    pub fn of(record: &LedgerRecord, grouping: Grouping) -> Self {
        Self {
            item: record.item_name.clone(),
            unit: record.unit.clone(),
            category: match grouping {
                Grouping::ItemUnit => None,
                Grouping::ItemUnitCategory => Some(record.category),
            },
        }
    }
}

/// Signed balance per key. Zero balances are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances(BTreeMap<BalanceKey, i64>);

impl Balances {
    pub fn get(&self, key: &BalanceKey) -> i64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BalanceKey, i64)> {
        self.0.iter().map(|(key, balance)| (key, *balance))
    }

    /// Rows with a strictly positive balance, as stock screens show them.
    pub fn positive(&self) -> impl Iterator<Item = (&BalanceKey, i64)> {
        self.iter().filter(|(_, balance)| *balance > 0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<BalanceKey, i64> {
        self.0
    }
}

/// Fold records into per-key balances.
///
/// The caller decides which records apply, usually via [`booked`].
pub fn project<'a, I>(records: I, grouping: Grouping) -> Balances
where
    I: IntoIterator<Item = &'a LedgerRecord>,
{
    let mut balances = BTreeMap::new();
    for record in records {
        *balances.entry(BalanceKey::of(record, grouping)).or_insert(0) += record.signed_quantity();
    }
    Balances(balances)
}

/// Records whose stage contributes to balances. Pending demand is excluded.
pub fn booked<'a, I>(records: I) -> impl Iterator<Item = &'a LedgerRecord>
where
    I: IntoIterator<Item = &'a LedgerRecord>,
{
    records.into_iter().filter(|record| record.stage.is_booked())
}

/// Positive per-item totals for one unit, summed across categories.
pub fn stock_totals(records: &[LedgerRecord], unit: &str) -> BTreeMap<String, i64> {
    let balances = project(
        booked(records).filter(|record| record.unit == unit),
        Grouping::ItemUnit,
    );
    balances
        .positive()
        .map(|(key, balance)| (key.item.clone(), balance))
        .collect()
}

/// Unit by item matrix of booked balances, kept per category. Zero cells are kept.
///
/// [`cell`](Self::cell) sums an item across its categories; [`category_cell`] reads
/// one category, so ball and explosive stock under the same name stay apart.
///
/// [`category_cell`]: Self::category_cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryMatrix {
    pub units: Vec<String>,
    pub items: Vec<String>,
    cells: BTreeMap<(String, String, Category), i64>,
}

impl SummaryMatrix {
    pub fn cell(&self, unit: &str, item: &str) -> i64 {
        self.cells
            .iter()
            .filter(|((u, i, _), _)| u == unit && i == item)
            .map(|(_, balance)| balance)
            .sum()
    }

    pub fn category_cell(&self, unit: &str, item: &str, category: Category) -> i64 {
        self.cells
            .get(&(unit.to_string(), item.to_string(), category))
            .copied()
            .unwrap_or(0)
    }

    /// Categories an item has been booked under.
    pub fn categories(&self, item: &str) -> Vec<Category> {
        let found: BTreeSet<Category> = self
            .cells
            .keys()
            .filter(|(_, i, _)| i == item)
            .map(|(_, _, category)| *category)
            .collect();
        found.into_iter().collect()
    }

    /// Balance of one item across every unit.
    pub fn item_total(&self, item: &str) -> i64 {
        self.units.iter().map(|unit| self.cell(unit, item)).sum()
    }

    /// Balance of one item in one category across every unit.
    pub fn category_total(&self, item: &str, category: Category) -> i64 {
        self.units
            .iter()
            .map(|unit| self.category_cell(unit, item, category))
            .sum()
    }
}

pub fn summary_matrix(records: &[LedgerRecord]) -> SummaryMatrix {
    let balances = project(booked(records), Grouping::ItemUnitCategory);

    let mut units = BTreeSet::new();
    let mut items = BTreeSet::new();
    let mut cells = BTreeMap::new();
    for (key, balance) in balances.iter() {
        units.insert(key.unit.clone());
        items.insert(key.item.clone());
        cells.insert(
            (key.unit.clone(), key.item.clone(), key.category.unwrap_or_default()),
            balance,
        );
    }

    SummaryMatrix {
        units: units.into_iter().collect(),
        items: items.into_iter().collect(),
        cells,
    }
}

/// Item names with a positive booked balance at `unit`, i.e. what can be countersigned
/// out of it.
pub fn available_for_countersignature(records: &[LedgerRecord], unit: &str) -> Vec<String> {
    stock_totals(records, unit).into_keys().collect()
}

/// Quantities declared in usage reports at `unit` on one calendar day.
pub fn daily_usage(
    records: &[LedgerRecord],
    unit: &str,
    day: NaiveDate,
    offset: FixedOffset,
) -> BTreeMap<String, u64> {
    let mut usage = BTreeMap::new();
    for record in records.iter().filter(|record| {
        record.stage == Stage::Report
            && record.unit == unit
            && record.timestamp.with_timezone(&offset).date_naive() == day
    }) {
        *usage.entry(record.item_name.clone()).or_insert(0) += u64::from(record.quantity);
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NeedType;
    use chrono::{TimeZone, Utc};

    fn signed(item: &str, unit: &str, qty: u32, need: NeedType) -> LedgerRecord {
        LedgerRecord::draft(item, qty, need, unit, Stage::Countersigned)
    }

    #[test]
    fn sums_signed_quantities_per_key() {
        let records = vec![
            signed("vest", "A", 10, NeedType::Issue),
            signed("vest", "A", 3, NeedType::Credit),
            signed("helmet", "A", 4, NeedType::Issue),
            signed("vest", "B", 2, NeedType::WearReplacement),
        ];

        let balances = project(&records, Grouping::ItemUnit);
        assert_eq!(balances.get(&BalanceKey::of(&records[0], Grouping::ItemUnit)), 7);
        assert_eq!(balances.get(&BalanceKey::of(&records[2], Grouping::ItemUnit)), 4);
        assert_eq!(balances.get(&BalanceKey::of(&records[3], Grouping::ItemUnit)), 2);
        assert_eq!(balances.len(), 3);
    }

    #[test]
    fn order_does_not_matter() {
        let mut records = Vec::new();
        for i in 0..200u32 {
            let need = match i % 4 {
                0 => NeedType::Issue,
                1 => NeedType::Credit,
                2 => NeedType::WearReplacement,
                _ => NeedType::ReportReconciliation,
            };
            let category = if i % 3 == 0 {
                Category::Explosive
            } else {
                Category::Ball
            };
            records.push(
                signed(&format!("item-{}", i % 7), &format!("unit-{}", i % 5), i + 1, need)
                    .with_category(category),
            );
        }

        let expected = project(&records, Grouping::ItemUnitCategory);
        for _ in 0..10 {
            fastrand::shuffle(&mut records);
            assert_eq!(project(&records, Grouping::ItemUnitCategory), expected);
        }
    }

    #[test]
    fn projecting_twice_is_identical() {
        let records = vec![
            signed("vest", "A", 10, NeedType::Issue),
            signed("vest", "A", 10, NeedType::Credit),
        ];

        let first = project(&records, Grouping::ItemUnit);
        let second = project(&records, Grouping::ItemUnit);
        assert_eq!(first, second);
        // zero rows survive projection
        assert_eq!(first.len(), 1);
        assert_eq!(first.positive().count(), 0);
    }

    #[test]
    fn categories_split_when_grouped() {
        let records = vec![
            signed("grenade", "A", 5, NeedType::Issue).with_category(Category::Explosive),
            signed("grenade", "A", 2, NeedType::Issue).with_category(Category::Ball),
        ];

        assert_eq!(project(&records, Grouping::ItemUnitCategory).len(), 2);
        let merged = project(&records, Grouping::ItemUnit);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.iter().next().map(|(_, b)| b), Some(7));
    }

    #[test]
    fn pending_records_are_not_booked() {
        let records = vec![
            signed("vest", "A", 10, NeedType::Issue),
            LedgerRecord::draft("vest", 50, NeedType::Issue, "A", Stage::Requested),
            LedgerRecord::draft("vest", 50, NeedType::Issue, "A", Stage::Escalated),
        ];

        assert_eq!(stock_totals(&records, "A").get("vest"), Some(&10));
    }

    #[test]
    fn stock_totals_drop_empty_rows() {
        let records = vec![
            signed("vest", "A", 5, NeedType::Issue),
            signed("vest", "A", 5, NeedType::Credit),
            signed("helmet", "A", 1, NeedType::Issue),
            signed("helmet", "B", 9, NeedType::Issue),
        ];

        let totals = stock_totals(&records, "A");
        assert_eq!(totals.len(), 1);
        assert_eq!(totals["helmet"], 1);
        assert_eq!(available_for_countersignature(&records, "A"), vec!["helmet"]);
    }

    #[test]
    fn summary_keeps_zero_cells() {
        let records = vec![
            signed("vest", "A", 5, NeedType::Issue),
            signed("vest", "A", 5, NeedType::Credit),
            signed("vest", "battalion", 5, NeedType::Issue),
            signed("helmet", "B", 2, NeedType::Issue),
        ];

        let matrix = summary_matrix(&records);
        assert_eq!(matrix.units, vec!["A", "B", "battalion"]);
        assert_eq!(matrix.items, vec!["helmet", "vest"]);
        assert_eq!(matrix.cell("A", "vest"), 0);
        assert_eq!(matrix.cell("A", "helmet"), 0);
        assert_eq!(matrix.item_total("vest"), 5);
    }

    #[test]
    fn summary_keeps_categories_apart() {
        let records = vec![
            signed("grenade", "A", 10, NeedType::Issue).with_category(Category::Ball),
            signed("grenade", "A", 4, NeedType::Issue).with_category(Category::Explosive),
            signed("grenade", "B", 3, NeedType::Issue).with_category(Category::Explosive),
        ];

        let matrix = summary_matrix(&records);
        assert_eq!(matrix.cell("A", "grenade"), 14);
        assert_eq!(matrix.category_cell("A", "grenade", Category::Ball), 10);
        assert_eq!(matrix.category_cell("A", "grenade", Category::Explosive), 4);
        assert_eq!(matrix.category_cell("B", "grenade", Category::Ball), 0);
        assert_eq!(matrix.category_total("grenade", Category::Explosive), 7);
        assert_eq!(matrix.categories("grenade"), vec![Category::Ball, Category::Explosive]);
        assert_eq!(matrix.item_total("grenade"), 17);
    }

    #[test]
    fn daily_usage_groups_by_local_day() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let report = |qty, hour| {
            LedgerRecord::draft("5.56", qty, NeedType::ReportReconciliation, "A", Stage::Report)
                .with_timestamp(Utc.with_ymd_and_hms(2024, 5, 10, hour, 0, 0).unwrap())
        };
        // 23:00 UTC is already the next day at +02:00
        let records = vec![report(30, 8), report(12, 20), report(99, 23)];

        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let usage = daily_usage(&records, "A", day, offset);
        assert_eq!(usage["5.56"], 42);

        let next = daily_usage(&records, "A", day.succ_opt().unwrap(), offset);
        assert_eq!(next["5.56"], 99);
    }
}
