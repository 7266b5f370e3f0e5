//! Ledger configuration.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

/// Chunk size used when draining store queries.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Name of the aggregating parent unit when none is configured.
pub const DEFAULT_BATTALION: &str = "battalion";

/// The fixed units mirroring routes resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRoster {
    pub battalion: String,
    pub depot: Option<String>,
}

impl UnitRoster {
    pub fn new(battalion: impl Into<String>) -> Self {
        Self {
            battalion: battalion.into(),
            depot: None,
        }
    }

    pub fn with_depot(mut self, depot: impl Into<String>) -> Self {
        self.depot = Some(depot.into());
        self
    }

    pub fn is_battalion(&self, unit: &str) -> bool {
        self.battalion == unit
    }
}

impl Default for UnitRoster {
    fn default() -> Self {
        Self::new(DEFAULT_BATTALION)
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub roster: UnitRoster,
    pub page_size: usize,
    /// Report shortfalls at the battalion or depot as pool draws. Counterpart debits are
    /// checked either way.
    pub pool_draws: bool,
    /// Offset used to decide which calendar day a timestamp falls on.
    pub utc_offset: FixedOffset,
}

impl LedgerConfig {
    pub fn calendar_day(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.utc_offset).date_naive()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            roster: UnitRoster::default(),
            page_size: DEFAULT_PAGE_SIZE,
            pool_draws: true,
            utc_offset: Utc.fix(),
        }
    }
}
