//! # Battalion Ledger Demo
//!
//! Walks a company's vests through the ledger: stock arrives at battalion, is issued
//! to a company, partly returned, and an oversized return is refused.
//! Runs against the in-memory store, no database needed.

use std::sync::Arc;

use anyhow::Result;
use quartermaster::{
    Actor, CountersignForm, Identity, Ledger, LedgerError, Line, NeedType, RequestForm,
};
use quartermaster_testing::MemoryStore;

// ============================================================================
// People
// ============================================================================

fn quartermaster_officer() -> Actor {
    Actor::new(Identity::new("Capt. Yael", "1618033"), "battalion")
}

fn company_sergeant() -> Actor {
    Actor::new(Identity::new("Sgt. Amir", "3141592"), "A")
}

// ============================================================================
// Forms
// ============================================================================

fn movement(unit: &str, need_type: NeedType, item: &str, quantity: u32) -> CountersignForm {
    CountersignForm {
        unit: unit.to_string(),
        need_type,
        requester: company_sergeant().identity,
        lines: vec![Line::new(item, quantity)],
        note: None,
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let store = MemoryStore::new();
    let ledger = Ledger::builder(Arc::new(store.clone())).build();
    let officer = quartermaster_officer();

    // Battalion receives stock; nothing to mirror against
    ledger
        .countersign(&officer, &movement("battalion", NeedType::Issue, "vest", 40))
        .await?;

    // Company A asks for vests, then the request is signed off
    let request = ledger
        .submit_request(
            &company_sergeant(),
            &RequestForm {
                unit: "A".to_string(),
                need_type: NeedType::Issue,
                escalated: false,
                lines: vec![Line::new("vest", 10)],
                note: Some("winter kit".to_string()),
            },
        )
        .await?;
    for id in request.ids() {
        let receipt = ledger.countersign_request(&officer, id).await?;
        println!("Signed request {id}: {} records written", receipt.records.len());
    }

    // Company A returns three
    ledger
        .countersign(&officer, &movement("A", NeedType::Credit, "vest", 3))
        .await?;

    // ...and then tries to return more than it holds
    match ledger
        .countersign(&officer, &movement("A", NeedType::Credit, "vest", 8))
        .await
    {
        Err(LedgerError::Insufficient(rejection)) => println!("Refused: {rejection}"),
        Err(other) => return Err(other.into()),
        Ok(_) => println!("Unexpectedly accepted"),
    }

    let summary = ledger.summary().await?;
    println!();
    println!("{:<12}{:>8}", "unit", "vest");
    for unit in &summary.units {
        println!("{:<12}{:>8}", unit, summary.cell(unit, "vest"));
    }
    println!("{:<12}{:>8}", "total", summary.item_total("vest"));
    println!();
    println!("{} records in the ledger", store.len().await);

    Ok(())
}
