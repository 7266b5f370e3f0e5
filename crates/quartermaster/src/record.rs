//! Ledger records: the immutable facts everything else is derived from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A stored enum value this crate does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! parse_by_name {
    ($ty:ident, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                $(
                    if value == $ty::$variant.as_str() {
                        return Ok($ty::$variant);
                    }
                )+
                Err(ParseEnumError {
                    kind: $kind,
                    value: value.to_string(),
                })
            }
        }
    };
}

parse_by_name!(NeedType, "need type", [Issue, Credit, ReportReconciliation, WearReplacement]);
parse_by_name!(Category, "category", [Ball, Explosive, General]);
parse_by_name!(Stage, "stage", [Requested, Escalated, Countersigned, Report]);

/// Unique identifier for a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of movement a record describes. Carries the sign used by projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedType {
    Issue,
    Credit,
    ReportReconciliation,
    WearReplacement,
}

impl NeedType {
    /// +1 for issue and wear-replacement, -1 for credit and reconciliation.
    pub fn sign(self) -> i64 {
        match self {
            NeedType::Issue | NeedType::WearReplacement => 1,
            NeedType::Credit | NeedType::ReportReconciliation => -1,
        }
    }

    pub fn is_debit(self) -> bool {
        self.sign() < 0
    }

    pub fn is_reconciliation(self) -> bool {
        matches!(self, NeedType::ReportReconciliation)
    }

    /// Need type of a mirrored counterpart.
    pub fn opposite(self) -> NeedType {
        match self {
            NeedType::Issue | NeedType::WearReplacement => NeedType::Credit,
            NeedType::Credit | NeedType::ReportReconciliation => NeedType::Issue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NeedType::Issue => "issue",
            NeedType::Credit => "credit",
            NeedType::ReportReconciliation => "report_reconciliation",
            NeedType::WearReplacement => "wear_replacement",
        }
    }
}

impl fmt::Display for NeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item category. Ammunition splits into ball and explosive; equipment does not split.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ball,
    Explosive,
    #[default]
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ball => "ball",
            Category::Explosive => "explosive",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workflow stage of a record. See [`crate::workflow`] for the legal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Pending demand.
    Requested,
    /// Pending demand flagged for escalation.
    Escalated,
    /// Formally signed movement. Counts toward balances and is mirrored.
    Countersigned,
    /// Day-of usage declaration. Counts toward balances, never mirrored.
    Report,
}

impl Stage {
    pub fn is_pending(self) -> bool {
        matches!(self, Stage::Requested | Stage::Escalated)
    }

    /// Whether records in this stage contribute to projected balances.
    pub fn is_booked(self) -> bool {
        !self.is_pending()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Requested => "requested",
            Stage::Escalated => "escalated",
            Stage::Countersigned => "countersigned",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a signature image held by the external record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureRef(pub String);

/// Person who raised or signed a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub personal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureRef>,
}

impl Identity {
    pub fn new(name: impl Into<String>, personal_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            personal_id: personal_id.into(),
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(SignatureRef(signature.into()));
        self
    }
}

/// One movement of a named item at one unit.
///
/// Records are never edited once appended. Only `acknowledged` and, while pending,
/// `stage` may change through [`crate::RecordPatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    pub item_name: String,
    /// Magnitude only. The sign comes from `need_type`.
    pub quantity: u32,
    pub need_type: NeedType,
    pub unit: String,
    pub category: Category,
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countersigner: Option<Identity>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LedgerRecord {
    /// Start a draft record stamped with a fresh id and the current time.
    pub fn draft(
        item_name: impl Into<String>,
        quantity: u32,
        need_type: NeedType,
        unit: impl Into<String>,
        stage: Stage,
    ) -> Self {
        Self {
            id: RecordId::new(),
            timestamp: Utc::now(),
            item_name: item_name.into(),
            quantity,
            need_type,
            unit: unit.into(),
            category: Category::General,
            stage,
            requester: None,
            countersigner: None,
            acknowledged: false,
            note: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_requester(mut self, requester: Identity) -> Self {
        self.requester = Some(requester);
        self
    }

    pub fn with_countersigner(mut self, countersigner: Identity) -> Self {
        self.countersigner = Some(countersigner);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Quantity with the need-type sign applied.
    pub fn signed_quantity(&self) -> i64 {
        i64::from(self.quantity) * self.need_type.sign()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_follow_need_type() {
        let issue = LedgerRecord::draft("vest", 10, NeedType::Issue, "A", Stage::Countersigned);
        let credit = LedgerRecord::draft("vest", 3, NeedType::Credit, "A", Stage::Countersigned);
        let wear =
            LedgerRecord::draft("vest", 2, NeedType::WearReplacement, "A", Stage::Countersigned);
        let report =
            LedgerRecord::draft("vest", 1, NeedType::ReportReconciliation, "A", Stage::Report);

        assert_eq!(issue.signed_quantity(), 10);
        assert_eq!(credit.signed_quantity(), -3);
        assert_eq!(wear.signed_quantity(), 2);
        assert_eq!(report.signed_quantity(), -1);
    }

    #[test]
    fn opposite_flips_sign() {
        for need in [
            NeedType::Issue,
            NeedType::Credit,
            NeedType::ReportReconciliation,
            NeedType::WearReplacement,
        ] {
            assert_eq!(need.sign() + need.opposite().sign(), 0, "{need}");
        }
    }

    #[test]
    fn pending_stages_are_not_booked() {
        assert!(!Stage::Requested.is_booked());
        assert!(!Stage::Escalated.is_booked());
        assert!(Stage::Countersigned.is_booked());
        assert!(Stage::Report.is_booked());
    }

    #[test]
    fn names_parse_back() {
        assert_eq!("wear_replacement".parse::<NeedType>(), Ok(NeedType::WearReplacement));
        assert_eq!("explosive".parse::<Category>(), Ok(Category::Explosive));
        assert_eq!("escalated".parse::<Stage>(), Ok(Stage::Escalated));

        let err = "signed".parse::<Stage>().unwrap_err();
        assert_eq!(err.to_string(), "unknown stage 'signed'");
    }

    #[test]
    fn wire_names_are_snake_case() {
        let record = LedgerRecord::draft(
            "5.56 ball",
            40,
            NeedType::ReportReconciliation,
            "A",
            Stage::Report,
        )
        .with_category(Category::Ball);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["need_type"], "report_reconciliation");
        assert_eq!(json["stage"], "report");
        assert_eq!(json["category"], "ball");
        assert!(json.get("requester").is_none());

        let back: LedgerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
