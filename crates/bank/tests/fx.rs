//! FX deals: immediate settlement, validation and charges

mod common;

use anyhow::Result;
use common::{amount, fixture, Fixture};
use rust_decimal_macros::dec;
use teller_approval::{ApprovalStatus, RequestKind};
use teller_core::{Currency, CurrencyPair, ErrorKind, FxRate};
use teller_ledger::charges::charges_for;
use teller_ledger::{Account, EntryKind, FxDeal, FxKind, FxStatus, Segment, Service, Settlement};
use teller_risk::RiskRating;

struct Desk {
    kes: Account,
    usd: Account,
}

/// One customer with a funded KES account and an empty USD account.
fn desk(f: &Fixture, national_id: &str, kes_balance: i64) -> Desk {
    let customer = f.customer(national_id, RiskRating::Low);
    let kes = f.active_account(&customer.id, "SAV", Currency::Kes);
    let usd = f.active_account(&customer.id, "SAV", Currency::Usd);
    if kes_balance > 0 {
        f.bank
            .deposit(&kes.id, amount(kes_balance), None, &f.teller)
            .unwrap();
    }
    Desk { kes, usd }
}

fn buy_usd(desk: &Desk, kes: i64) -> FxDeal {
    FxDeal {
        kind: FxKind::Buy,
        account_id: desk.kes.id.clone(),
        counter_account_id: Some(desk.usd.id.clone()),
        pair: CurrencyPair::new(Currency::Kes, Currency::Usd).unwrap(),
        rate: FxRate::new(dec!(0.0078)).unwrap(),
        source_amount: amount(kes),
        settlement: Settlement::AccountCredit,
        beneficiary: None,
    }
}

#[test]
fn test_small_deal_settles_immediately() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000001", 100_000);

    let fx = f.bank.submit_fx(&buy_usd(&desk, 10_000), &f.teller)?;
    assert_eq!(fx.status, FxStatus::Completed);
    assert!(fx.reference.starts_with("FXB"));
    assert_eq!(fx.converted_amount.value(), dec!(78));
    assert!(fx.charges.is_zero());
    assert!(fx.approval_request_id.is_none());
    assert!(fx.completed_at.is_some());

    assert_eq!(f.bank.balance(&desk.kes.id)?, dec!(90000));
    assert_eq!(f.bank.balance(&desk.usd.id)?, dec!(78));

    let sell_leg = f.bank.statement(&desk.kes.id)?.pop().unwrap();
    assert_eq!(sell_leg.kind, EntryKind::FxSell);
    assert_eq!(sell_leg.reference, fx.reference);
    let buy_leg = f.bank.statement(&desk.usd.id)?.pop().unwrap();
    assert_eq!(buy_leg.kind, EntryKind::FxBuy);
    assert_eq!(buy_leg.reference, fx.reference);
    assert!(f.bank.pending_requests()?.is_empty());
    Ok(())
}

#[test]
fn test_large_deal_waits_for_validation() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000002", 1_200_000);

    let fx = f.bank.submit_fx(&buy_usd(&desk, 1_000_000), &f.teller)?;
    assert_eq!(fx.status, FxStatus::Validation);
    let request_id = fx.approval_request_id.clone().unwrap();
    assert_eq!(f.bank.balance(&desk.kes.id)?, dec!(1200000));
    assert_eq!(f.bank.balance(&desk.usd.id)?, dec!(0));

    let request = f.bank.request(&request_id)?;
    assert_eq!(request.kind, RequestKind::FxValidation);
    assert_eq!(request.subject.id, fx.id);
    assert_eq!(request.payload["reference"], fx.reference.as_str());

    f.bank.approve(&request_id, &f.supervisor)?;
    let settled = f.bank.fx(&fx.id)?;
    assert_eq!(settled.status, FxStatus::Completed);
    assert_eq!(f.bank.balance(&desk.kes.id)?, dec!(200000));
    assert_eq!(f.bank.balance(&desk.usd.id)?, dec!(7800));

    let err = f.bank.approve(&request_id, &f.supervisor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyResolved);
    Ok(())
}

#[test]
fn test_rejected_deal_moves_no_money() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000003", 1_500_000);

    let fx = f.bank.submit_fx(&buy_usd(&desk, 1_000_000), &f.teller)?;
    let request_id = fx.approval_request_id.clone().unwrap();
    let rejected = f.bank.reject(&request_id, Some("rate expired"), &f.supervisor)?;
    assert_eq!(rejected.status, ApprovalStatus::Rejected);

    assert_eq!(f.bank.fx(&fx.id)?.status, FxStatus::Rejected);
    assert_eq!(f.bank.balance(&desk.kes.id)?, dec!(1500000));
    assert_eq!(f.bank.balance(&desk.usd.id)?, dec!(0));
    assert!(f.bank.statement(&desk.usd.id)?.is_empty());
    Ok(())
}

#[test]
fn test_deal_fails_validation_when_funds_left_meanwhile() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000004", 1_000_000);

    let fx = f.bank.submit_fx(&buy_usd(&desk, 1_000_000), &f.teller)?;
    let request_id = fx.approval_request_id.clone().unwrap();
    f.bank.withdraw(&desk.kes.id, amount(1), None, &f.teller)?;

    let err = f.bank.approve(&request_id, &f.supervisor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(f.bank.request(&request_id)?.status, ApprovalStatus::Pending);
    assert_eq!(f.bank.fx(&fx.id)?.status, FxStatus::Validation);
    assert_eq!(f.bank.balance(&desk.usd.id)?, dec!(0));
    Ok(())
}

#[test]
fn test_transfer_is_always_validated_and_charged() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000005", 50_000);
    let deal = FxDeal {
        kind: FxKind::Transfer,
        account_id: desk.kes.id.clone(),
        counter_account_id: None,
        pair: CurrencyPair::new(Currency::Kes, Currency::Usd)?,
        rate: FxRate::new(dec!(0.0078))?,
        source_amount: amount(10_000),
        settlement: Settlement::External,
        beneficiary: Some("ACME Imports Ltd, Dubai".to_string()),
    };

    let expected = charges_for(Service::FxTransfer, Segment::Retail, Some(amount(10_000))).total;
    assert!(!expected.is_zero());

    let fx = f.bank.submit_fx(&deal, &f.teller)?;
    assert_eq!(fx.status, FxStatus::Validation);
    assert!(fx.reference.starts_with("FXT"));
    assert_eq!(fx.charges, expected);

    f.bank.approve(&fx.approval_request_id.clone().unwrap(), &f.supervisor)?;
    let entries = f.bank.statement(&desk.kes.id)?;
    let fee = entries
        .iter()
        .find(|e| e.kind == EntryKind::Fee)
        .expect("fee leg");
    assert_eq!(fee.amount, -expected.value());
    assert_eq!(fee.reference, fx.reference);
    assert!(entries.iter().any(|e| e.kind == EntryKind::FxSell && e.amount == dec!(-10000)));
    assert_eq!(
        f.bank.balance(&desk.kes.id)?,
        dec!(40000) - expected.value()
    );
    Ok(())
}

#[test]
fn test_transfer_must_settle_external() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000006", 50_000);
    let mut deal = buy_usd(&desk, 1_000);
    deal.kind = FxKind::Transfer;

    let err = f.bank.submit_fx(&deal, &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    Ok(())
}

#[test]
fn test_insufficient_funds_books_nothing() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000007", 5_000);

    let err = f.bank.submit_fx(&buy_usd(&desk, 10_000), &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    let err = f
        .bank
        .submit_fx(&buy_usd(&desk, 2_000_000), &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);

    assert_eq!(f.bank.statement(&desk.kes.id)?.len(), 1);
    assert!(f.bank.pending_requests()?.is_empty());
    Ok(())
}

#[test]
fn test_currency_mismatch_is_refused() -> Result<()> {
    let f = fixture();
    let desk = desk(&f, "50000008", 50_000);
    let mut deal = buy_usd(&desk, 1_000);
    deal.pair = CurrencyPair::new(Currency::Usd, Currency::Kes)?;

    let err = f.bank.submit_fx(&deal, &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CurrencyMismatch);
    assert_eq!(f.bank.balance(&desk.kes.id)?, dec!(50000));
    Ok(())
}
