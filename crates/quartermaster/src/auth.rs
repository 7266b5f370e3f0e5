//! Identity and authorization, passed in explicitly by the caller.

use std::fmt;

use crate::record::Identity;

/// The person performing a ledger action, and the unit they act for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: Identity,
    pub unit: String,
}

impl Actor {
    pub fn new(identity: Identity, unit: impl Into<String>) -> Self {
        Self {
            identity,
            unit: unit.into(),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity.name, self.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    Request,
    Countersign,
    Report,
    Adjust,
    Transfer,
    Acknowledge,
    Retag,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Request => "submit requests",
            Action::Countersign => "countersign",
            Action::Report => "report usage",
            Action::Adjust => "adjust stock",
            Action::Transfer => "transfer stock",
            Action::Acknowledge => "acknowledge records",
            Action::Retag => "retag requests",
            Action::Delete => "delete records",
        })
    }
}

/// Decides whether an actor may perform an action on a unit's records.
pub trait Authorizer: Send + Sync {
    fn permits(&self, actor: &Actor, action: Action, unit: &str) -> bool;
}

/// Permits everything. Useful when authorization happens before the ledger is reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn permits(&self, _actor: &Actor, _action: Action, _unit: &str) -> bool {
        true
    }
}

impl<F> Authorizer for F
where
    F: Fn(&Actor, Action, &str) -> bool + Send + Sync,
{
    fn permits(&self, actor: &Actor, action: Action, unit: &str) -> bool {
        self(actor, action, unit)
    }
}
