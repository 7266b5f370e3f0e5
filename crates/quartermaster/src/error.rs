//! Error types for ledger operations.

use std::fmt;

use thiserror::Error;

use crate::record::{Category, RecordId, Stage};

pub type Result<T> = std::result::Result<T, LedgerError>;

/// A submission was refused because a balance would go negative.
///
/// Carries everything needed to tell the operator what was short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub item: String,
    pub unit: String,
    pub category: Category,
    pub available: i64,
    pub requested: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The acting unit's own balance cannot cover the debit.
    InsufficientBalance,
    /// The pool (battalion or depot) the issue draws from cannot cover it.
    InsufficientPool,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.reason {
            RejectionReason::InsufficientBalance => "insufficient balance",
            RejectionReason::InsufficientPool => "insufficient pool stock",
        };
        write!(
            f,
            "{what} for {} ({}) at {}: available {}, requested {}",
            self.item, self.category, self.unit, self.available, self.requested
        )
    }
}

/// Field-level problems found before anything is read from or written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("submission contains no records")]
    EmptyBatch,
    #[error("record {id} is missing {field}")]
    MissingField { id: RecordId, field: &'static str },
    #[error("record {id} for {item} has zero quantity")]
    ZeroQuantity { id: RecordId, item: String },
    #[error("record {id}: stage {stage} cannot carry need type {need_type}")]
    StageMismatch {
        id: RecordId,
        stage: Stage,
        need_type: &'static str,
    },
    #[error("no depot unit is configured")]
    NoDepot,
    #[error("record {id} at {unit} cannot be booked with a {route} route")]
    InvalidRoute {
        id: RecordId,
        unit: String,
        route: &'static str,
    },
    #[error("adjusting {item} by {delta} exceeds the largest single record")]
    QuantityOutOfRange { item: String, delta: i64 },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("rejected: {0}")]
    Insufficient(Rejection),

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    /// A paginated read failed part way. The pages already fetched are discarded.
    #[error("fetch aborted after {fetched} records: {source}")]
    PartialFetch {
        fetched: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("record {id} is acknowledged and cannot be changed or deleted")]
    Acknowledged { id: RecordId },

    #[error("record {id} cannot move from {from} to {to}")]
    IllegalTransition { id: RecordId, from: Stage, to: Stage },

    #[error("record {id} not found")]
    NotFound { id: RecordId },

    #[error("{actor} is not permitted to {action}")]
    Forbidden { actor: String, action: String },
}

impl From<Rejection> for LedgerError {
    fn from(value: Rejection) -> Self {
        LedgerError::Insufficient(value)
    }
}

impl LedgerError {
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            LedgerError::Insufficient(rejection) => Some(rejection),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_message_names_the_shortfall() {
        let err = LedgerError::from(Rejection {
            reason: RejectionReason::InsufficientBalance,
            item: "vest".into(),
            unit: "A".into(),
            category: Category::General,
            available: 7,
            requested: 8,
        });

        assert_eq!(
            err.to_string(),
            "rejected: insufficient balance for vest (general) at A: available 7, requested 8"
        );
        assert_eq!(err.rejection().map(|r| r.available), Some(7));
    }
}
