//! Transfer mirroring.
//!
//! A countersigned movement at one unit is booked twice: once where it happened and
//! once, with the opposite sign, at the unit the goods came from or went back to.
//! Mirrored pairs always sum to zero, which keeps the battalion's aggregate in step
//! with every subordinate unit's sign-offs.

use smallvec::{smallvec, SmallVec};

use crate::config::UnitRoster;
use crate::record::{LedgerRecord, RecordId, Stage};

/// Where the counterpart of a movement is booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Route {
    /// Unit to battalion.
    #[default]
    Battalion,
    /// Between the two fixed units, depot and battalion.
    DepotExchange,
    /// Reconciliation-only write, never mirrored.
    Standalone,
}

/// A candidate record together with how it should be mirrored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    pub record: LedgerRecord,
    pub route: Route,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Battalion => "battalion",
            Route::DepotExchange => "depot exchange",
            Route::Standalone => "standalone",
        }
    }
}

impl Proposal {
    pub fn new(record: LedgerRecord) -> Self {
        Self {
            record,
            route: Route::default(),
        }
    }

    pub fn routed(record: LedgerRecord, route: Route) -> Self {
        Self { record, route }
    }

    pub fn standalone(record: LedgerRecord) -> Self {
        Self::routed(record, Route::Standalone)
    }
}

/// The unit a record's counterpart would be booked at, if it gets one.
pub fn counterpart_unit<'r>(
    record: &LedgerRecord,
    route: Route,
    roster: &'r UnitRoster,
) -> Option<&'r str> {
    if record.stage != Stage::Countersigned || record.need_type.is_reconciliation() {
        return None;
    }

    let target = match route {
        Route::Standalone => return None,
        Route::Battalion => roster.battalion.as_str(),
        Route::DepotExchange => {
            let depot = roster.depot.as_deref()?;
            if record.unit == depot {
                roster.battalion.as_str()
            } else if roster.is_battalion(&record.unit) {
                depot
            } else {
                return None;
            }
        }
    };

    // no self-mirror
    (record.unit != target).then_some(target)
}

/// Mirror a record onto the battalion.
pub fn mirror(record: &LedgerRecord, roster: &UnitRoster) -> Option<LedgerRecord> {
    mirror_via(record, Route::Battalion, roster)
}

pub fn mirror_via(
    record: &LedgerRecord,
    route: Route,
    roster: &UnitRoster,
) -> Option<LedgerRecord> {
    let target = counterpart_unit(record, route, roster)?;

    let note = if record.need_type.is_debit() {
        format!("credit for {}", record.unit)
    } else {
        format!("transfer from {}", record.unit)
    };

    Some(LedgerRecord {
        id: RecordId::new(),
        timestamp: record.timestamp,
        item_name: record.item_name.clone(),
        quantity: record.quantity,
        need_type: record.need_type.opposite(),
        unit: target.to_string(),
        category: record.category,
        stage: Stage::Countersigned,
        requester: None,
        countersigner: None,
        acknowledged: false,
        note: Some(note),
    })
}

/// Expand proposals into the final record set. Each original is immediately followed by
/// its counterpart, if any.
pub fn expand(proposals: Vec<Proposal>, roster: &UnitRoster) -> Vec<LedgerRecord> {
    let mut out = Vec::with_capacity(proposals.len() * 2);
    for proposal in proposals {
        out.extend(pair(proposal, roster));
    }
    out
}

fn pair(proposal: Proposal, roster: &UnitRoster) -> SmallVec<[LedgerRecord; 2]> {
    match mirror_via(&proposal.record, proposal.route, roster) {
        Some(counterpart) => smallvec![proposal.record, counterpart],
        None => smallvec![proposal.record],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Category, Identity, NeedType};

    fn roster() -> UnitRoster {
        UnitRoster::new("battalion").with_depot("depot")
    }

    fn countersigned(unit: &str, qty: u32, need: NeedType) -> LedgerRecord {
        LedgerRecord::draft("vest", qty, need, unit, Stage::Countersigned)
            .with_category(Category::Explosive)
            .with_requester(Identity::new("Cpl. Levi", "1234567"))
            .with_countersigner(Identity::new("Lt. Dor", "7654321").with_signature("sig/42"))
    }

    #[test]
    fn credit_mirrors_as_issue_at_battalion() {
        let original = countersigned("A", 5, NeedType::Credit);
        let counterpart = mirror(&original, &roster()).unwrap();

        assert_eq!(counterpart.unit, "battalion");
        assert_eq!(counterpart.need_type, NeedType::Issue);
        assert_eq!(counterpart.item_name, "vest");
        assert_eq!(counterpart.quantity, 5);
        assert_eq!(counterpart.category, Category::Explosive);
        assert_eq!(counterpart.stage, Stage::Countersigned);
        assert!(counterpart.requester.is_none());
        assert!(counterpart.countersigner.is_none());
        assert_ne!(counterpart.id, original.id);
        assert_eq!(counterpart.note.as_deref(), Some("credit for A"));
        assert_eq!(original.signed_quantity() + counterpart.signed_quantity(), 0);
    }

    #[test]
    fn pairs_sum_to_zero_for_every_need_type() {
        for need in [NeedType::Issue, NeedType::Credit, NeedType::WearReplacement] {
            let original = countersigned("B", 9, need);
            let counterpart = mirror(&original, &roster()).unwrap();
            assert_eq!(original.signed_quantity() + counterpart.signed_quantity(), 0);
        }
    }

    #[test]
    fn skips_battalion_pending_and_reconciliation() {
        assert!(mirror(&countersigned("battalion", 5, NeedType::Issue), &roster()).is_none());

        let pending = LedgerRecord::draft("vest", 5, NeedType::Issue, "A", Stage::Requested);
        assert!(mirror(&pending, &roster()).is_none());

        let escalated = LedgerRecord::draft("vest", 5, NeedType::Issue, "A", Stage::Escalated);
        assert!(mirror(&escalated, &roster()).is_none());

        let adjustment = countersigned("A", 5, NeedType::ReportReconciliation);
        assert!(mirror(&adjustment, &roster()).is_none());

        let report =
            LedgerRecord::draft("vest", 5, NeedType::ReportReconciliation, "A", Stage::Report);
        assert!(mirror(&report, &roster()).is_none());

        let standalone = countersigned("A", 5, NeedType::Issue);
        assert!(mirror_via(&standalone, Route::Standalone, &roster()).is_none());
    }

    #[test]
    fn depot_exchange_mirrors_between_fixed_units() {
        let roster = roster();

        let from_depot = countersigned("depot", 20, NeedType::Credit);
        let counterpart = mirror_via(&from_depot, Route::DepotExchange, &roster).unwrap();
        assert_eq!(counterpart.unit, "battalion");
        assert_eq!(counterpart.need_type, NeedType::Issue);

        let into_battalion = countersigned("battalion", 20, NeedType::Issue);
        let counterpart = mirror_via(&into_battalion, Route::DepotExchange, &roster).unwrap();
        assert_eq!(counterpart.unit, "depot");
        assert_eq!(counterpart.need_type, NeedType::Credit);
        assert_eq!(counterpart.note.as_deref(), Some("transfer from battalion"));

        // a company is not part of the exchange
        let company = countersigned("A", 20, NeedType::Issue);
        assert!(mirror_via(&company, Route::DepotExchange, &roster).is_none());

        // without a depot there is nothing to exchange with
        let bare = UnitRoster::new("battalion");
        assert!(mirror_via(&into_battalion, Route::DepotExchange, &bare).is_none());
    }

    #[test]
    fn expand_places_counterpart_after_original() {
        let proposals = vec![
            Proposal::new(countersigned("A", 5, NeedType::Credit)),
            Proposal::new(countersigned("battalion", 7, NeedType::Issue)),
            Proposal::standalone(countersigned("B", 1, NeedType::Issue)),
        ];
        let first_id = proposals[0].record.id;

        let records = expand(proposals, &roster());
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].id, first_id);
        assert_eq!(records[1].unit, "battalion");
        assert_eq!(records[1].need_type, NeedType::Issue);
        assert_eq!(records[2].unit, "battalion");
        assert_eq!(records[3].unit, "B");
    }
}
