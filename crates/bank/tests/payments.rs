//! Bill payments, external transfers, standing orders and the service
//! requests charged on approval

mod common;

use anyhow::Result;
use chrono::NaiveDate;
use common::{amount, fixture, Fixture};
use rust_decimal_macros::dec;
use teller_approval::{ApprovalStatus, RequestKind};
use teller_bank::{
    Beneficiary, BillerCategory, ChequeBookOrder, Frequency, NewBiller, NewStandingOrder, Payee,
    StatementFormat, StatementOrder, StatementType,
};
use teller_core::{Currency, ErrorKind};
use teller_ledger::EntryKind;
use teller_risk::RiskRating;

fn register_kplc(f: &Fixture) -> Result<()> {
    f.bank.register_biller(
        &NewBiller {
            code: "kplc-prepaid".to_string(),
            name: "Kenya Power (Prepaid)".to_string(),
            paybill_number: "888880".to_string(),
            category: BillerCategory::Utility,
            bill_fetch_supported: false,
            min_amount: Some(amount(50)),
            max_amount: Some(amount(500_000)),
        },
        &f.teller,
    )?;
    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn beneficiary() -> Beneficiary {
    Beneficiary {
        account: "0110299384".to_string(),
        name: "Achieng Odhiambo".to_string(),
        bank: Some("Equity".to_string()),
    }
}

#[test]
fn test_bill_payment_posts_amount_and_fee() -> Result<()> {
    let f = fixture();
    register_kplc(&f)?;
    let account = f.funded_account("50000001", 20_000);

    let payment = f
        .bank
        .pay_bill(&account.id, "kplc-prepaid", "54201188321", amount(1_500), None, &f.teller)?;
    assert!(payment.reference.starts_with("BIL"));
    assert_eq!(payment.biller_name, "Kenya Power (Prepaid)");
    assert_eq!(payment.paybill_number, "888880");
    // Retail: 50 + excise 10 + VAT 10
    assert_eq!(payment.charges, amount(70));
    assert_eq!(f.bank.balance(&account.id)?, dec!(18430));

    let legs: Vec<_> = f
        .bank
        .statement(&account.id)?
        .into_iter()
        .filter(|e| e.reference == payment.reference)
        .collect();
    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].kind, EntryKind::BillPayment);
    assert_eq!(legs[0].amount, dec!(-1500));
    assert_eq!(legs[1].kind, EntryKind::Fee);
    assert_eq!(legs[1].amount, dec!(-70));

    assert_eq!(f.bank.bill_payments(&account.id)?, vec![payment]);
    assert!(f.bank.verify_account(&account.id)?.is_consistent());
    Ok(())
}

#[test]
fn test_replayed_bill_payment_posts_once() -> Result<()> {
    let f = fixture();
    register_kplc(&f)?;
    let account = f.funded_account("50000002", 20_000);

    let first = f.bank.pay_bill(
        &account.id,
        "kplc-prepaid",
        "54201188321",
        amount(1_000),
        Some("BIL-CLIENT-7"),
        &f.teller,
    )?;
    let again = f.bank.pay_bill(
        &account.id,
        "kplc-prepaid",
        "54201188321",
        amount(1_000),
        Some("BIL-CLIENT-7"),
        &f.teller,
    )?;
    assert_eq!(first, again);
    assert_eq!(f.bank.balance(&account.id)?, dec!(18930));

    let err = f
        .bank
        .pay_bill(
            &account.id,
            "kplc-prepaid",
            "54201188321",
            amount(2_000),
            Some("BIL-CLIENT-7"),
            &f.teller,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateReference);
    assert_eq!(f.bank.bill_payments(&account.id)?.len(), 1);
    assert_eq!(f.bank.balance(&account.id)?, dec!(18930));
    Ok(())
}

#[test]
fn test_biller_rules_refuse_before_posting() -> Result<()> {
    let f = fixture();
    register_kplc(&f)?;
    let account = f.funded_account("50000003", 20_000);

    let err = f
        .bank
        .pay_bill(&account.id, "kplc-prepaid", "5420", amount(40), None, &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    let err = f
        .bank
        .pay_bill(&account.id, "nhif", "5420", amount(500), None, &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = f
        .bank
        .register_biller(
            &NewBiller {
                code: "kplc-postpaid".to_string(),
                name: "Kenya Power (Postpaid)".to_string(),
                paybill_number: "888880".to_string(),
                category: BillerCategory::Utility,
                bill_fetch_supported: true,
                min_amount: None,
                max_amount: None,
            },
            &f.teller,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    f.bank.deactivate_biller("kplc-prepaid", &f.supervisor)?;
    assert!(f.bank.billers()?.is_empty());
    assert!(!f.bank.biller("kplc-prepaid")?.is_active);
    let err = f
        .bank
        .pay_bill(&account.id, "kplc-prepaid", "5420", amount(500), None, &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    assert_eq!(f.bank.balance(&account.id)?, dec!(20000));
    assert!(f.bank.bill_payments(&account.id)?.is_empty());
    Ok(())
}

#[test]
fn test_external_transfer_posts_debit_and_fee() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("50000004", 20_000);

    let transfer = f.bank.transfer_external(
        &account.id,
        &beneficiary(),
        amount(10_000),
        Some("School fees"),
        None,
        &f.teller,
    )?;
    assert!(transfer.reference.starts_with("TRF"));
    assert_eq!(transfer.beneficiary, beneficiary());
    assert_eq!(transfer.charges, amount(70));
    assert_eq!(f.bank.balance(&account.id)?, dec!(9930));

    let debit = f
        .bank
        .statement(&account.id)?
        .into_iter()
        .find(|e| e.reference == transfer.reference && e.kind == EntryKind::TransferOut)
        .expect("debit leg");
    assert_eq!(debit.amount, dec!(-10000));
    assert_eq!(f.bank.funds_transfers(&account.id)?, vec![transfer]);

    let nameless = Beneficiary {
        name: " ".to_string(),
        ..beneficiary()
    };
    let err = f
        .bank
        .transfer_external(&account.id, &nameless, amount(100), None, None, &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    assert_eq!(f.bank.balance(&account.id)?, dec!(9930));
    Ok(())
}

#[test]
fn test_standing_order_runs_once_per_due_date() -> Result<()> {
    let f = fixture();
    let source = f.funded_account("50000005", 20_000);
    let payee = f.funded_account("50000006", 0);

    let order = f.bank.create_standing_order(
        &NewStandingOrder {
            account_id: source.id.clone(),
            payee: Payee::Internal {
                account_id: payee.id.clone(),
            },
            amount: amount(2_000),
            frequency: Frequency::Weekly,
            start_date: date(2026, 3, 2),
            end_date: None,
        },
        &f.teller,
    )?;
    assert!(order.id.starts_with("STO"));
    assert!(order.is_active);
    assert_eq!(order.last_run_on, None);

    let run = f.bank.execute_standing_order(&order.id, date(2026, 3, 2), &f.teller)?;
    assert_eq!(run.reference, format!("{}-20260302", order.id));
    assert_eq!(run.debit.amount, dec!(-2000));
    assert_eq!(run.credit.as_ref().map(|c| c.amount), Some(dec!(2000)));
    // Retail: 150 + excise 30 + VAT 29
    assert_eq!(run.fee.as_ref().map(|e| e.amount), Some(dec!(-209)));
    assert_eq!(f.bank.balance(&source.id)?, dec!(17791));
    assert_eq!(f.bank.balance(&payee.id)?, dec!(2000));

    let replay = f.bank.execute_standing_order(&order.id, date(2026, 3, 2), &f.teller)?;
    assert_eq!(replay, run);
    assert_eq!(f.bank.balance(&source.id)?, dec!(17791));

    let err = f
        .bank
        .execute_standing_order(&order.id, date(2026, 3, 3), &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    f.bank.execute_standing_order(&order.id, date(2026, 3, 9), &f.teller)?;
    assert_eq!(f.bank.balance(&source.id)?, dec!(15582));
    assert_eq!(f.bank.standing_order(&order.id)?.last_run_on, Some(date(2026, 3, 9)));

    let cancelled = f.bank.cancel_standing_order(&order.id, &f.supervisor)?;
    assert!(!cancelled.is_active);
    let err = f
        .bank
        .execute_standing_order(&order.id, date(2026, 3, 16), &f.teller)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    let err = f.bank.cancel_standing_order(&order.id, &f.supervisor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    assert!(f.bank.verify_account(&source.id)?.is_consistent());
    assert!(f.bank.verify_account(&payee.id)?.is_consistent());
    Ok(())
}

#[test]
fn test_external_standing_order_posts_only_the_debit() -> Result<()> {
    let f = fixture();
    let source = f.funded_account("50000007", 20_000);
    let order = f.bank.create_standing_order(
        &NewStandingOrder {
            account_id: source.id.clone(),
            payee: Payee::External(beneficiary()),
            amount: amount(5_000),
            frequency: Frequency::Monthly,
            start_date: date(2026, 1, 31),
            end_date: Some(date(2026, 12, 31)),
        },
        &f.teller,
    )?;
    assert_eq!(f.bank.standing_orders(&source.id)?, vec![order.clone()]);

    let run = f.bank.execute_standing_order(&order.id, date(2026, 2, 28), &f.teller)?;
    assert_eq!(run.debit.kind, EntryKind::TransferOut);
    assert_eq!(run.credit, None);
    assert_eq!(f.bank.balance(&source.id)?, dec!(14791));
    Ok(())
}

#[test]
fn test_standing_order_creation_checks() -> Result<()> {
    let f = fixture();
    let source = f.funded_account("50000008", 20_000);
    let owner = f.customer("50000009", RiskRating::Low);
    let dollars = f.active_account(&owner.id, "SAV", Currency::Usd);

    let order = |payee: Payee, end_date: Option<NaiveDate>| NewStandingOrder {
        account_id: source.id.clone(),
        payee,
        amount: amount(1_000),
        frequency: Frequency::BiWeekly,
        start_date: date(2026, 3, 2),
        end_date,
    };

    let itself = Payee::Internal {
        account_id: source.id.clone(),
    };
    let err = f.bank.create_standing_order(&order(itself, None), &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    let usd = Payee::Internal {
        account_id: dollars.id.clone(),
    };
    let err = f.bank.create_standing_order(&order(usd, None), &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CurrencyMismatch);

    let backwards = order(Payee::External(beneficiary()), Some(date(2026, 3, 1)));
    let err = f.bank.create_standing_order(&backwards, &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    assert!(f.bank.standing_orders(&source.id)?.is_empty());
    Ok(())
}

#[test]
fn test_cheque_book_is_charged_on_approval() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("50000010", 20_000);
    let mut order = ChequeBookOrder {
        leaves: 30,
        collection_branch: "001".to_string(),
        contact_phone: "0711000222".to_string(),
        contact_email: None,
        new_series: false,
    };

    let err = f.bank.request_cheque_book(&account.id, &order, &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    order.leaves = 50;
    let request = f.bank.request_cheque_book(&account.id, &order, &f.teller)?;
    assert_eq!(request.kind, RequestKind::ChequeBook);
    assert_eq!(request.payload["leaves"], 50);
    assert_eq!(f.bank.balance(&account.id)?, dec!(20000));

    let approved = f.bank.approve(&request.id, &f.supervisor)?;
    assert_eq!(approved.status, ApprovalStatus::Approved);
    // Retail: 750 + excise 150 + VAT 144
    assert_eq!(f.bank.balance(&account.id)?, dec!(18956));
    let fee = f
        .bank
        .statement(&account.id)?
        .into_iter()
        .find(|e| e.reference == request.id)
        .expect("fee leg");
    assert_eq!(fee.kind, EntryKind::Fee);
    assert_eq!(fee.actor, "supervisor-01");
    Ok(())
}

#[test]
fn test_statement_request_rules_and_charge() -> Result<()> {
    let f = fixture();
    let account = f.funded_account("50000011", 20_000);
    let mut order = StatementOrder {
        statement_type: StatementType::Interim,
        from: None,
        to: None,
        format: StatementFormat::Pdf,
        delivery_email: Some("50000011@example.com".to_string()),
        certified: true,
        purpose: None,
    };

    let err = f.bank.request_statement(&account.id, &order, &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    order.from = Some(date(2026, 1, 1));
    order.to = Some(date(2026, 2, 28));
    let err = f.bank.request_statement(&account.id, &order, &f.teller).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPayload);

    order.purpose = Some("Embassy visa application".to_string());
    let request = f.bank.request_statement(&account.id, &order, &f.teller)?;
    assert_eq!(request.kind, RequestKind::StatementRequest);
    f.bank.approve(&request.id, &f.supervisor)?;
    // Retail: 200 + excise 40 + VAT 38
    assert_eq!(f.bank.balance(&account.id)?, dec!(19722));

    let mini = StatementOrder {
        statement_type: StatementType::Mini,
        from: None,
        to: None,
        format: StatementFormat::Printed,
        delivery_email: None,
        certified: false,
        purpose: None,
    };
    let request = f.bank.request_statement(&account.id, &mini, &f.teller)?;
    f.bank.reject(&request.id, Some("printed at the counter"), &f.supervisor)?;
    assert_eq!(f.bank.balance(&account.id)?, dec!(19722));
    Ok(())
}
