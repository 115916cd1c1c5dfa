//! Outbox events reach subscribers after commit

mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::{amount, fixture};
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use std::sync::Arc;
use teller_bank::KycField;
use teller_events::{CoreEvent, EventError, EventRecord, EventSubscriber};

#[test]
fn test_subscriber_sees_committed_entry() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("60000001", 0);
    let mut rx = f.bank.subscribe();

    let entry = f.bank.deposit(&account.id, amount(500), None, &f.teller)?;
    let record = rx.try_recv()?;
    match &record.event {
        CoreEvent::EntryPosted {
            entry_id,
            account_id,
            amount: posted,
            balance_after,
            reference,
            ..
        } => {
            assert_eq!(*entry_id, entry.id);
            assert_eq!(account_id, &account.id);
            assert_eq!(*posted, dec!(500));
            assert_eq!(*balance_after, dec!(500));
            assert_eq!(reference, &entry.reference);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(record.actor, "teller-01");
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[test]
fn test_failed_operation_emits_nothing() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("60000002", 100);
    let mut rx = f.bank.subscribe();

    assert!(f.bank.withdraw(&account.id, amount(1_000), None, &f.teller).is_err());
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[test]
fn test_events_since_pages_in_order() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("60000003", 1_000);
    f.bank.withdraw(&account.id, amount(200), None, &f.teller)?;

    let all = f.bank.events_since(0, None)?;
    assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));
    let kinds: Vec<&str> = all.iter().map(|r| r.event.kind()).collect();
    assert!(kinds.contains(&"ACCOUNT_STATUS_CHANGED"));
    assert_eq!(kinds.iter().filter(|k| **k == "ENTRY_POSTED").count(), 2);

    let first = f.bank.events_since(0, Some(2))?;
    assert_eq!(first.len(), 2);
    let rest = f.bank.events_since(first[1].seq, None)?;
    assert_eq!(first.len() + rest.len(), all.len());
    assert_eq!(rest.first().map(|r| r.seq), all.get(2).map(|r| r.seq));

    let last = all.last().map(|r| r.seq).unwrap_or_default();
    assert!(f.bank.events_since(last, None)?.is_empty());
    Ok(())
}

#[test]
fn test_pin_block_is_recorded() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("60000004", 0);
    let card = f.active_card(&account.id);
    let mut rx = f.bank.subscribe();

    for pin in ["0000", "1111", "2222"] {
        let _ = f.bank.verify_pin(&card.id, pin, &f.teller);
    }

    let record = rx.try_recv()?;
    assert_eq!(
        record.event,
        CoreEvent::CardPinBlocked {
            card_id: card.id.clone(),
            failed_attempts: 3,
        }
    );
    assert_eq!(record.event.subject_id(), card.id);
    Ok(())
}

#[test]
fn test_approval_emits_requested_and_resolved() -> Result<()> {
    let f = fixture();
    let customer = f.customer("60000005", teller_risk::RiskRating::Low);
    let mut rx = f.bank.subscribe();

    let request = f
        .bank
        .request_kyc_update(&customer.id, KycField::Occupation, Some("Farmer"), None, &f.teller)?;
    f.bank.approve(&request.id, &f.supervisor)?;

    let requested = rx.try_recv()?;
    assert_eq!(
        requested.event,
        CoreEvent::ApprovalRequested {
            request_id: request.id.clone(),
            kind: "KYC_UPDATE".to_string(),
            subject_id: customer.id.clone(),
        }
    );
    let resolved = rx.try_recv()?;
    assert_eq!(
        resolved.event,
        CoreEvent::ApprovalResolved {
            request_id: request.id.clone(),
            kind: "KYC_UPDATE".to_string(),
            status: "APPROVED".to_string(),
            resolved_by: "supervisor-01".to_string(),
        }
    );
    assert_eq!(resolved.actor, "supervisor-01");
    Ok(())
}

struct Tally {
    entries: Mutex<Vec<String>>,
}

#[async_trait]
impl EventSubscriber for Tally {
    fn name(&self) -> &str {
        "tally"
    }

    async fn handle(&self, record: &EventRecord) -> Result<(), EventError> {
        if let CoreEvent::EntryPosted { reference, .. } = &record.event {
            self.entries.lock().push(reference.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_spawned_subscriber_follows_the_ledger() -> Result<()> {
    let f = fixture();
    let tally = Arc::new(Tally {
        entries: Mutex::new(Vec::new()),
    });
    let handle = f.bank.spawn_subscriber(tally.clone());

    let account = f.funded_account("60000006", 0);
    let first = f.bank.deposit(&account.id, amount(300), None, &f.teller)?;
    let second = f.bank.withdraw(&account.id, amount(100), None, &f.teller)?;

    for _ in 0..100 {
        if tally.entries.lock().len() >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(*tally.entries.lock(), vec![first.reference, second.reference]);
    handle.abort();
    Ok(())
}
