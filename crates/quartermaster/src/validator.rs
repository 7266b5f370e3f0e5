//! Sufficiency checks run before a batch is appended.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::config::UnitRoster;
use crate::error::{Rejection, RejectionReason, ValidationError};
use crate::mirror::{counterpart_unit, Proposal, Route};
use crate::projector::{booked, project, BalanceKey, Grouping};
use crate::record::{LedgerRecord, NeedType, Stage};

/// How shortfalls are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Report a shortfall at a counterpart unit as a draw on that unit's pool. When off
    /// it is reported as a plain balance shortfall. Either way it is checked.
    pub pool_draws: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self { pool_draws: true }
    }
}

/// A balance a proposal would reduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debit {
    pub key: BalanceKey,
    pub quantity: i64,
    pub reason: RejectionReason,
}

/// Every debit a proposal makes once expanded with its counterpart.
///
/// A debit-signed booked record reduces its own key. When the counterpart is the
/// debit-signed half (an issue drawn from battalion or across the depot exchange), the
/// counterpart's key is reduced too.
pub fn debits_of(proposal: &Proposal, roster: &UnitRoster, policy: Policy) -> SmallVec<[Debit; 2]> {
    let record = &proposal.record;
    let quantity = i64::from(record.quantity);
    let mut debits = SmallVec::new();

    if record.stage.is_booked() && record.need_type.is_debit() {
        debits.push(Debit {
            key: BalanceKey::of(record, Grouping::ItemUnitCategory),
            quantity,
            reason: RejectionReason::InsufficientBalance,
        });
    }

    if let Some(pool) = counterpart_unit(record, proposal.route, roster) {
        if record.need_type.opposite().is_debit() {
            let reason = if policy.pool_draws {
                RejectionReason::InsufficientPool
            } else {
                RejectionReason::InsufficientBalance
            };
            debits.push(Debit {
                key: BalanceKey::new(record.item_name.clone(), pool, record.category),
                quantity,
                reason,
            });
        }
    }

    debits
}

/// Check that no balance debited by `candidates` would go negative.
///
/// Balances are projected from the booked subset of `current`. Debits against the same
/// key within one batch accumulate, and the first shortfall rejects the whole batch.
pub fn validate(
    candidates: &[Proposal],
    current: &[LedgerRecord],
    roster: &UnitRoster,
    policy: Policy,
) -> Result<(), Rejection> {
    let debits: Vec<Debit> = candidates
        .iter()
        .flat_map(|proposal| debits_of(proposal, roster, policy))
        .collect();
    if debits.is_empty() {
        return Ok(());
    }

    let balances = project(booked(current), Grouping::ItemUnitCategory);
    let mut requested: BTreeMap<&BalanceKey, i64> = BTreeMap::new();

    for debit in &debits {
        let total = requested.entry(&debit.key).or_insert(0);
        *total += debit.quantity;

        let available = balances.get(&debit.key);
        if available - *total < 0 {
            return Err(Rejection {
                reason: debit.reason,
                item: debit.key.item.clone(),
                unit: debit.key.unit.clone(),
                category: debit.key.category.unwrap_or_default(),
                available,
                requested: *total,
            });
        }
    }

    Ok(())
}

/// Reject routes that would book a movement without its counterpart.
///
/// A depot exchange only runs between the depot and the battalion. A standalone route
/// is only for reconciliation writes; a signed movement elsewhere must be mirrored.
pub fn check_routes(candidates: &[Proposal], roster: &UnitRoster) -> Result<(), ValidationError> {
    for Proposal { record, route } in candidates {
        let allowed = match route {
            Route::Battalion => true,
            Route::DepotExchange => {
                let depot = roster.depot.as_deref().ok_or(ValidationError::NoDepot)?;
                record.unit == depot || roster.is_battalion(&record.unit)
            }
            Route::Standalone => {
                record.stage != Stage::Countersigned
                    || record.need_type.is_reconciliation()
                    || roster.is_battalion(&record.unit)
            }
        };
        if !allowed {
            return Err(ValidationError::InvalidRoute {
                id: record.id,
                unit: record.unit.clone(),
                route: route.as_str(),
            });
        }
    }
    Ok(())
}

/// Field checks that need no store access.
pub fn check_fields(candidates: &[Proposal]) -> Result<(), ValidationError> {
    if candidates.is_empty() {
        return Err(ValidationError::EmptyBatch);
    }

    for Proposal { record, .. } in candidates {
        if record.item_name.trim().is_empty() {
            return Err(ValidationError::MissingField {
                id: record.id,
                field: "item_name",
            });
        }
        if record.unit.trim().is_empty() {
            return Err(ValidationError::MissingField {
                id: record.id,
                field: "unit",
            });
        }
        if record.quantity == 0 {
            return Err(ValidationError::ZeroQuantity {
                id: record.id,
                item: record.item_name.clone(),
            });
        }

        match record.stage {
            Stage::Report if record.need_type != NeedType::ReportReconciliation => {
                return Err(ValidationError::StageMismatch {
                    id: record.id,
                    stage: record.stage,
                    need_type: record.need_type.as_str(),
                });
            }
            Stage::Countersigned if record.countersigner.is_none() => {
                return Err(ValidationError::MissingField {
                    id: record.id,
                    field: "countersigner",
                });
            }
            Stage::Requested | Stage::Escalated if record.requester.is_none() => {
                return Err(ValidationError::MissingField {
                    id: record.id,
                    field: "requester",
                });
            }
            _ => {}
        }
    }

    Ok(())
}
