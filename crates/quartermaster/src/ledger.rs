//! The ledger service: validated, mirrored, serialized writes and projected reads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use tracing::{debug, info, warn};

use crate::auth::{Action, Actor, AllowAll, Authorizer};
use crate::config::{LedgerConfig, UnitRoster};
use crate::error::{LedgerError, Rejection, RejectionReason, Result, ValidationError};
use crate::guard::KeyGuards;
use crate::mirror::{counterpart_unit, expand, Proposal, Route};
use crate::projector::{self, booked, project, BalanceKey, Balances, Grouping, SummaryMatrix};
use crate::record::{LedgerRecord, RecordId, Stage};
use crate::store::{drain, LedgerStore, RecordFilter, RecordPatch};
use crate::validator::{self, Policy};
use crate::workflow::{self, CountersignForm, Direction, Line, RequestForm};

/// Outcome of an accepted submission.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Every record appended, originals followed by their counterparts.
    pub records: Vec<LedgerRecord>,
    pub mirrored: usize,
}

impl Receipt {
    pub fn ids(&self) -> Vec<RecordId> {
        self.records.iter().map(|record| record.id).collect()
    }
}

/// Entry point for every ledger read and write against one store table.
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    authorizer: Arc<dyn Authorizer>,
    config: LedgerConfig,
    guards: KeyGuards,
    requests: KeyGuards<RecordId>,
}

impl Ledger {
    pub fn builder(store: Arc<dyn LedgerStore>) -> LedgerBuilder {
        LedgerBuilder::new(store)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Balance keys currently locked or waited on by in-flight writes.
    pub fn in_flight_keys(&self) -> usize {
        self.guards.len()
    }

    fn roster(&self) -> &UnitRoster {
        &self.config.roster
    }

    fn policy(&self) -> Policy {
        Policy {
            pool_draws: self.config.pool_draws,
        }
    }

    fn authorize(&self, actor: &Actor, action: Action, unit: &str) -> Result<()> {
        if self.authorizer.permits(actor, action, unit) {
            return Ok(());
        }
        warn!(actor = %actor, %action, unit, "ledger action denied");
        Err(LedgerError::Forbidden {
            actor: actor.to_string(),
            action: action.to_string(),
        })
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Validate, mirror and append a batch of proposals as one submission.
    ///
    /// The actor must be permitted the matching action on every unit in the batch.
    /// Nothing is written unless every debit in the batch is covered.
    pub async fn submit(&self, actor: &Actor, proposals: Vec<Proposal>) -> Result<Receipt> {
        let mut checked = BTreeSet::new();
        for proposal in &proposals {
            let action = action_for(proposal);
            if checked.insert((action, proposal.record.unit.as_str())) {
                self.authorize(actor, action, &proposal.record.unit)?;
            }
        }
        self.commit(proposals).await
    }

    async fn commit(&self, proposals: Vec<Proposal>) -> Result<Receipt> {
        validator::check_fields(&proposals)?;
        validator::check_routes(&proposals, self.roster())?;

        let keys = self.touched_keys(&proposals);
        let _held = self.guards.acquire(keys).await;

        let needs_balances = proposals.iter().any(|proposal| {
            !validator::debits_of(proposal, self.roster(), self.policy()).is_empty()
        });
        if needs_balances {
            let current = self.drain(&RecordFilter::all()).await?;
            if let Err(rejection) =
                validator::validate(&proposals, &current, self.roster(), self.policy())
            {
                return Err(rejected(rejection));
            }
        }

        let originals = proposals.len();
        let records = expand(proposals, self.roster());
        let mirrored = records.len() - originals;

        self.store
            .append(records.clone())
            .await
            .map_err(LedgerError::Store)?;

        info!(records = records.len(), mirrored, "submission appended");
        Ok(Receipt { records, mirrored })
    }

    pub async fn submit_request(&self, actor: &Actor, form: &RequestForm) -> Result<Receipt> {
        self.authorize(actor, Action::Request, &form.unit)?;
        self.commit(form.proposals(actor)).await
    }

    pub async fn countersign(&self, actor: &Actor, form: &CountersignForm) -> Result<Receipt> {
        self.authorize(actor, Action::Countersign, &form.unit)?;
        self.commit(form.proposals(actor)).await
    }

    /// Countersign a pending request. The request is acknowledged once its signed
    /// counterpart is appended.
    ///
    /// Calls for one request run one at a time. If an earlier call booked the request
    /// but failed to acknowledge it, the existing booking is returned and acknowledged
    /// instead of booking again.
    pub async fn countersign_request(&self, actor: &Actor, id: RecordId) -> Result<Receipt> {
        let _request_held = self.requests.acquire_one(id).await;

        let request = self.fetch(id).await?;
        self.authorize(actor, Action::Countersign, &request.unit)?;
        if !request.stage.is_pending() {
            return Err(LedgerError::IllegalTransition {
                id,
                from: request.stage,
                to: Stage::Countersigned,
            });
        }
        if request.acknowledged {
            return Err(LedgerError::Acknowledged { id });
        }

        let receipt = match self.booking_of(&request).await? {
            Some(existing) => {
                info!(%id, "request already booked, acknowledging it");
                existing
            }
            None => {
                self.commit(vec![workflow::countersign_request(
                    &request,
                    actor.identity.clone(),
                )])
                .await?
            }
        };
        self.store
            .update(id, RecordPatch::acknowledged(true))
            .await
            .map_err(LedgerError::Store)?;
        Ok(receipt)
    }

    pub async fn report_usage(&self, actor: &Actor, unit: &str, lines: &[Line]) -> Result<Receipt> {
        self.authorize(actor, Action::Report, unit)?;
        self.commit(workflow::usage_report(actor, unit, lines)).await
    }

    /// Bring a unit's book balance for one item to a physical count.
    ///
    /// Returns `None` when the book already matches.
    pub async fn adjust_stock(
        &self,
        actor: &Actor,
        unit: &str,
        line: &Line,
    ) -> Result<Option<Receipt>> {
        self.authorize(actor, Action::Adjust, unit)?;

        let key = BalanceKey::new(line.item.clone(), unit, line.category);
        let _held = self.guards.acquire_one(key.clone()).await;

        let book = self.book_balance(&key).await?;
        let Some(proposal) = workflow::stock_adjustment(actor, unit, line, book)? else {
            debug!(unit, item = %line.item, book, "stock count matches book");
            return Ok(None);
        };
        let record = proposal.record;
        self.store
            .append(vec![record.clone()])
            .await
            .map_err(LedgerError::Store)?;

        info!(unit, item = %line.item, book, counted = line.quantity, "stock adjusted");
        Ok(Some(Receipt {
            records: vec![record],
            mirrored: 0,
        }))
    }

    /// Move stock between the depot and the battalion.
    pub async fn transfer_depot(
        &self,
        actor: &Actor,
        direction: Direction,
        lines: &[Line],
    ) -> Result<Receipt> {
        let depot = self
            .roster()
            .depot
            .clone()
            .ok_or(ValidationError::NoDepot)?;
        self.authorize(actor, Action::Transfer, &depot)?;
        self.authorize(actor, Action::Transfer, &self.roster().battalion)?;

        self.commit(workflow::depot_exchange(
            actor,
            &self.roster().battalion,
            direction,
            lines,
        ))
        .await
    }

    pub async fn acknowledge(&self, actor: &Actor, id: RecordId, acknowledged: bool) -> Result<()> {
        let record = self.fetch(id).await?;
        self.authorize(actor, Action::Acknowledge, &record.unit)?;

        self.store
            .update(id, RecordPatch::acknowledged(acknowledged))
            .await
            .map_err(LedgerError::Store)?;
        info!(%id, acknowledged, "acknowledgement changed");
        Ok(())
    }

    /// Move a pending request between its substages.
    pub async fn retag(&self, actor: &Actor, id: RecordId, stage: Stage) -> Result<()> {
        let record = self.fetch(id).await?;
        self.authorize(actor, Action::Retag, &record.unit)?;
        workflow::ensure_retaggable(&record, stage)?;

        self.store
            .update(id, RecordPatch::stage(stage))
            .await
            .map_err(LedgerError::Store)?;
        debug!(%id, from = %record.stage, to = %stage, "request retagged");
        Ok(())
    }

    /// Delete an unacknowledged record.
    ///
    /// Removing a booked record that adds stock is refused when the stock has already
    /// been drawn on.
    pub async fn delete(&self, actor: &Actor, id: RecordId) -> Result<()> {
        let record = self.fetch(id).await?;
        self.authorize(actor, Action::Delete, &record.unit)?;
        workflow::ensure_deletable(&record)?;

        let key = BalanceKey::of(&record, Grouping::ItemUnitCategory);
        let _held = self.guards.acquire_one(key.clone()).await;
        if record.stage.is_booked() && record.signed_quantity() > 0 {
            let available = self.book_balance(&key).await?;
            let requested = i64::from(record.quantity);
            if available < requested {
                return Err(rejected(Rejection {
                    reason: RejectionReason::InsufficientBalance,
                    item: record.item_name,
                    unit: record.unit,
                    category: record.category,
                    available,
                    requested,
                }));
            }
        }

        self.store.delete(id).await.map_err(LedgerError::Store)?;
        info!(%id, unit = %record.unit, item = %record.item_name, "record deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn fetch(&self, id: RecordId) -> Result<LedgerRecord> {
        self.store
            .get(id)
            .await
            .map_err(LedgerError::Store)?
            .ok_or(LedgerError::NotFound { id })
    }

    pub async fn records(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>> {
        self.drain(filter).await
    }

    pub async fn balances(&self, filter: &RecordFilter, grouping: Grouping) -> Result<Balances> {
        let records = self.drain(filter).await?;
        Ok(project(booked(&records), grouping))
    }

    pub async fn stock(&self, unit: &str) -> Result<BTreeMap<String, i64>> {
        let records = self.drain(&RecordFilter::all().unit(unit)).await?;
        Ok(projector::stock_totals(&records, unit))
    }

    pub async fn summary(&self) -> Result<SummaryMatrix> {
        let records = self.drain(&RecordFilter::all()).await?;
        Ok(projector::summary_matrix(&records))
    }

    pub async fn available_for_countersignature(&self, unit: &str) -> Result<Vec<String>> {
        let records = self.drain(&RecordFilter::all().unit(unit)).await?;
        Ok(projector::available_for_countersignature(&records, unit))
    }

    pub async fn daily_usage(&self, unit: &str, day: NaiveDate) -> Result<BTreeMap<String, u64>> {
        let offset: FixedOffset = self.config.utc_offset;
        let filter = RecordFilter::all().unit(unit).stage(Stage::Report);
        let records = self.drain(&filter).await?;
        Ok(projector::daily_usage(&records, unit, day, offset))
    }

    async fn drain(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>> {
        drain(self.store.as_ref(), filter, self.config.page_size)
            .await
            .inspect_err(|err| warn!(error = %err, "record fetch failed"))
    }

    /// Booked balance of one key, read from that key's records only.
    async fn book_balance(&self, key: &BalanceKey) -> Result<i64> {
        let mut filter = RecordFilter::all().unit(key.unit.clone()).item(key.item.clone());
        if let Some(category) = key.category {
            filter = filter.category(category);
        }
        let current = self.drain(&filter).await?;
        Ok(project(booked(&current), Grouping::ItemUnitCategory).get(key))
    }

    /// The countersigned record already booked for `request`, with its counterpart.
    async fn booking_of(&self, request: &LedgerRecord) -> Result<Option<Receipt>> {
        let note = workflow::request_note(request.id);
        let filter = RecordFilter::all()
            .item(request.item_name.clone())
            .category(request.category)
            .stage(Stage::Countersigned);
        let records = self.drain(&filter).await?;

        let Some(original) = records.iter().find(|record| {
            record.unit == request.unit && record.note.as_deref() == Some(note.as_str())
        }) else {
            return Ok(None);
        };
        let target = counterpart_unit(original, Route::Battalion, self.roster());
        let counterpart = records.iter().find(|record| {
            Some(record.unit.as_str()) == target
                && record.timestamp == original.timestamp
                && record.quantity == original.quantity
                && record.need_type == original.need_type.opposite()
                && record.countersigner.is_none()
        });

        let mut found = vec![original.clone()];
        found.extend(counterpart.cloned());
        Ok(Some(Receipt {
            mirrored: found.len() - 1,
            records: found,
        }))
    }

    /// Every balance key a batch debits or credits, including mirrored units.
    fn touched_keys(&self, proposals: &[Proposal]) -> BTreeSet<BalanceKey> {
        let mut keys = BTreeSet::new();
        for Proposal { record, route } in proposals {
            if !record.stage.is_booked() {
                continue;
            }
            keys.insert(BalanceKey::of(record, Grouping::ItemUnitCategory));
            if let Some(unit) = counterpart_unit(record, *route, self.roster()) {
                keys.insert(BalanceKey::new(record.item_name.clone(), unit, record.category));
            }
        }
        keys
    }
}

fn action_for(proposal: &Proposal) -> Action {
    match (proposal.record.stage, proposal.route) {
        (Stage::Requested | Stage::Escalated, _) => Action::Request,
        (Stage::Report, _) => Action::Report,
        (Stage::Countersigned, Route::DepotExchange) => Action::Transfer,
        (Stage::Countersigned, Route::Standalone) => Action::Adjust,
        (Stage::Countersigned, Route::Battalion) => Action::Countersign,
    }
}

fn rejected(rejection: Rejection) -> LedgerError {
    warn!(
        item = %rejection.item,
        unit = %rejection.unit,
        category = %rejection.category,
        available = rejection.available,
        requested = rejection.requested,
        "submission rejected"
    );
    rejection.into()
}

/// Builder for [`Ledger`].
pub struct LedgerBuilder {
    store: Arc<dyn LedgerStore>,
    authorizer: Arc<dyn Authorizer>,
    config: LedgerConfig,
}

impl LedgerBuilder {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            authorizer: Arc::new(AllowAll),
            config: LedgerConfig::default(),
        }
    }

    pub fn battalion(mut self, unit: impl Into<String>) -> Self {
        self.config.roster.battalion = unit.into();
        self
    }

    pub fn depot(mut self, unit: impl Into<String>) -> Self {
        self.config.roster.depot = Some(unit.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size.max(1);
        self
    }

    pub fn pool_draws(mut self, enabled: bool) -> Self {
        self.config.pool_draws = enabled;
        self
    }

    pub fn utc_offset(mut self, offset: FixedOffset) -> Self {
        self.config.utc_offset = offset;
        self
    }

    pub fn authorizer(mut self, authorizer: impl Authorizer + 'static) -> Self {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Ledger {
        Ledger {
            store: self.store,
            authorizer: self.authorizer,
            config: self.config,
            guards: KeyGuards::new(),
            requests: KeyGuards::new(),
        }
    }
}
