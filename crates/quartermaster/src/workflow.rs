//! Workflow rules and the forms that create records.
//!
//! Records start as `requested` (or `report` for day-of usage). A request reaches the
//! balance math only when a countersigned record is created for it; the request itself
//! is never edited beyond its acknowledgement flag and its pending substage. All stages
//! are terminal once stored, and corrections are new compensating records.

use crate::auth::Actor;
use crate::error::{LedgerError, ValidationError};
use crate::mirror::{Proposal, Route};
use crate::record::{Category, Identity, LedgerRecord, NeedType, RecordId, Stage};

impl Stage {
    /// Stage changes allowed on a stored record.
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Requested, Stage::Escalated) | (Stage::Escalated, Stage::Requested)
        )
    }
}

pub fn ensure_deletable(record: &LedgerRecord) -> Result<(), LedgerError> {
    if record.acknowledged {
        return Err(LedgerError::Acknowledged { id: record.id });
    }
    Ok(())
}

pub fn ensure_retaggable(record: &LedgerRecord, next: Stage) -> Result<(), LedgerError> {
    if record.acknowledged {
        return Err(LedgerError::Acknowledged { id: record.id });
    }
    if !record.stage.can_transition_to(next) {
        return Err(LedgerError::IllegalTransition {
            id: record.id,
            from: record.stage,
            to: next,
        });
    }
    Ok(())
}

/// One item line on a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub item: String,
    pub quantity: u32,
    pub category: Category,
}

impl Line {
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
            category: Category::General,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// A demand raised by a unit.
#[derive(Debug, Clone)]
pub struct RequestForm {
    pub unit: String,
    pub need_type: NeedType,
    pub escalated: bool,
    pub lines: Vec<Line>,
    pub note: Option<String>,
}

impl RequestForm {
    pub fn proposals(&self, actor: &Actor) -> Vec<Proposal> {
        let stage = if self.escalated {
            Stage::Escalated
        } else {
            Stage::Requested
        };
        self.lines
            .iter()
            .map(|line| {
                let mut record = line_record(line, self.need_type, &self.unit, stage)
                    .with_requester(actor.identity.clone());
                record.note = self.note.clone();
                Proposal::new(record)
            })
            .collect()
    }
}

/// A formal, signed movement at a unit.
#[derive(Debug, Clone)]
pub struct CountersignForm {
    pub unit: String,
    pub need_type: NeedType,
    /// Who raised the movement. The countersigner is the acting user.
    pub requester: Identity,
    pub lines: Vec<Line>,
    pub note: Option<String>,
}

impl CountersignForm {
    pub fn proposals(&self, actor: &Actor) -> Vec<Proposal> {
        self.lines
            .iter()
            .map(|line| {
                let mut record = line_record(line, self.need_type, &self.unit, Stage::Countersigned)
                    .with_requester(self.requester.clone())
                    .with_countersigner(actor.identity.clone());
                record.note = self.note.clone();
                Proposal::new(record)
            })
            .collect()
    }
}

/// Countersigned record created from a pending request.
pub fn countersign_request(request: &LedgerRecord, countersigner: Identity) -> Proposal {
    let mut record = LedgerRecord::draft(
        request.item_name.clone(),
        request.quantity,
        request.need_type,
        request.unit.clone(),
        Stage::Countersigned,
    )
    .with_category(request.category)
    .with_countersigner(countersigner)
    .with_note(request_note(request.id));
    record.requester = request.requester.clone();
    Proposal::new(record)
}

/// Note carried by the countersigned record booked for a request.
pub fn request_note(id: RecordId) -> String {
    format!("request {id}")
}

/// Same-day usage declaration. Always a reconciliation credit against the unit's stock.
pub fn usage_report(actor: &Actor, unit: &str, lines: &[Line]) -> Vec<Proposal> {
    lines
        .iter()
        .map(|line| {
            Proposal::standalone(
                line_record(line, NeedType::ReportReconciliation, unit, Stage::Report)
                    .with_requester(actor.identity.clone()),
            )
        })
        .collect()
}

/// Record that brings a book balance to a physical count, or `None` if they agree.
pub fn stock_adjustment(
    actor: &Actor,
    unit: &str,
    line: &Line,
    book: i64,
) -> Result<Option<Proposal>, ValidationError> {
    let counted = i64::from(line.quantity);
    let delta = counted - book;
    if delta == 0 {
        return Ok(None);
    }

    let need_type = if delta > 0 {
        NeedType::Issue
    } else {
        NeedType::ReportReconciliation
    };
    let quantity = u32::try_from(delta.unsigned_abs()).map_err(|_| {
        ValidationError::QuantityOutOfRange {
            item: line.item.clone(),
            delta,
        }
    })?;
    let record = LedgerRecord::draft(
        line.item.clone(),
        quantity,
        need_type,
        unit,
        Stage::Countersigned,
    )
    .with_category(line.category)
    .with_countersigner(actor.identity.clone())
    .with_note(format!("stock count {counted}, book {book}"));
    Ok(Some(Proposal::standalone(record)))
}

/// Direction of a depot exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    DepotToBattalion,
    BattalionToDepot,
}

/// Movement booked at the battalion; its depot counterpart comes from mirroring.
pub fn depot_exchange(
    actor: &Actor,
    battalion: &str,
    direction: Direction,
    lines: &[Line],
) -> Vec<Proposal> {
    let need_type = match direction {
        Direction::DepotToBattalion => NeedType::Issue,
        Direction::BattalionToDepot => NeedType::Credit,
    };
    lines
        .iter()
        .map(|line| {
            Proposal::routed(
                line_record(line, need_type, battalion, Stage::Countersigned)
                    .with_countersigner(actor.identity.clone()),
                Route::DepotExchange,
            )
        })
        .collect()
}

fn line_record(line: &Line, need_type: NeedType, unit: &str, stage: Stage) -> LedgerRecord {
    LedgerRecord::draft(line.item.clone(), line.quantity, need_type, unit, stage)
        .with_category(line.category)
}
