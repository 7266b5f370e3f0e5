//! # Quartermaster
//!
//! An append-only inventory ledger where balances are projected, movements are
//! mirrored, and debits are checked before they land.
//!
//! ## Core Concepts
//!
//! Quartermaster separates **facts** from **views**:
//! - [`LedgerRecord`] = Facts (one signed movement of one item at one unit)
//! - [`Balances`] = Views (recomputed from records on every read, never stored)
//!
//! The key principle: **One Submission = One Check = One Append**.
//! Every line of a form is validated against current balances, expanded with its
//! mirrored counterpart, and appended as a single batch, or nothing is written.
//!
//! ## Architecture
//!
//! ```text
//! Caller (forms, screens)
//!     │
//!     ▼ submit(actor)
//! Ledger ─── Authorizer.permits() ──► Forbidden
//!     │
//!     ├─► check_fields() / check_routes() ──► ValidationError
//!     │
//!     ├─► KeyGuards.acquire(touched keys)
//!     │
//!     ├─► drain(store) ──► PartialFetch
//!     │
//!     ├─► validate(project(booked)) ──► Rejection
//!     │
//!     ├─► expand(mirror) ── original + counterpart
//!     │
//!     └─► LedgerStore.append(batch) ──► Store error
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Records are facts** - Appended once, only `acknowledged` and a pending
//!    request's substage ever change
//! 2. **Balances are derived** - `sum(quantity * sign(need_type))` per key, at read time
//! 3. **No overdraft** - A booked balance never goes negative after an accepted append
//! 4. **Mirrored pairs sum to zero** - Every countersigned unit movement has an
//!    opposite-signed twin at the battalion
//! 5. **Demand is not stock** - Requested and escalated records never touch balances
//! 6. **Acknowledged is final** - Acknowledged records cannot be deleted
//! 7. **No orphaned movements** - A countersigned movement outside the battalion is
//!    only accepted on a route that books its counterpart
//!
//! ## Guarantees
//!
//! - **Serialized per key**: Submissions through one [`Ledger`] touching the same
//!   (item, unit, category) key run their read-check-append one at a time
//! - **All or nothing per batch**: The first shortfall rejects the whole submission
//! - **No retries**: Store failures are returned as they are
//!
//! Submissions from separate processes against the same table are not serialized.
//! Run a single writer per table, or serialize at the store.
//!
//! ## Example
//!
//! ```ignore
//! use quartermaster::{Actor, CountersignForm, Identity, Ledger, Line, NeedType};
//!
//! let ledger = Ledger::builder(store).battalion("battalion").build();
//! let actor = Actor::new(Identity::new("Lt. Dor", "7654321"), "A");
//!
//! let receipt = ledger
//!     .countersign(&actor, &CountersignForm {
//!         unit: "A".into(),
//!         need_type: NeedType::Credit,
//!         requester: Identity::new("Pvt. Noa", "2718281"),
//!         lines: vec![Line::new("vest", 5)],
//!         note: None,
//!     })
//!     .await?;
//!
//! assert_eq!(receipt.mirrored, 1);
//! let stock = ledger.stock("battalion").await?;
//! ```

mod auth;
mod config;
mod error;
mod guard;
mod ledger;
mod record;
mod store;

pub mod mirror;
pub mod projector;
pub mod validator;
pub mod workflow;

// Re-export record types
pub use record::{
    Category, Identity, LedgerRecord, NeedType, ParseEnumError, RecordId, SignatureRef, Stage,
};

// Re-export error types
pub use error::{LedgerError, Rejection, RejectionReason, Result, ValidationError};

// Re-export configuration
pub use config::{LedgerConfig, UnitRoster, DEFAULT_BATTALION, DEFAULT_PAGE_SIZE};

// Re-export identity types
pub use auth::{Action, Actor, AllowAll, Authorizer};

// Re-export projection and mirroring types
pub use mirror::{mirror, Proposal, Route};
pub use projector::{project, BalanceKey, Balances, Grouping, SummaryMatrix};
pub use validator::{validate, Policy};
pub use workflow::{CountersignForm, Direction, Line, RequestForm};

// Re-export store types
pub use store::{drain, pages, LedgerStore, PageRequest, RecordFilter, RecordPatch};

// Re-export the service
pub use guard::{HeldKeys, KeyGuards};
pub use ledger::{Ledger, LedgerBuilder, Receipt};

// Re-export commonly used external types
pub use async_trait::async_trait;
