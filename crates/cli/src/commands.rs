//! CLI commands

use rust_decimal::Decimal;
use teller_approval::ApprovalRequest;
use teller_bank::NewCustomer;
use teller_core::{Amount, Currency, CurrencyPair, FxRate};
use teller_ledger::account::AccountType;
use teller_ledger::{AccountCategory, FxDeal, FxKind, FxStatus, ModeOfOperation, NewAccount, Settlement};

use crate::context::AppContext;

/// Account types every branch starts with
const DEFAULT_ACCOUNT_TYPES: [(&str, &str, i64); 2] = [
    ("SAV", "Savings", 0),
    ("CUR", "Current", 1_000),
];

/// Define the default account types that are not defined yet
pub fn init(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let existing = ctx.bank.account_types()?;
    let mut created = 0;
    for (code, name, minimum) in DEFAULT_ACCOUNT_TYPES {
        if existing.iter().any(|t| t.code == code) {
            continue;
        }
        ctx.bank.define_account_type(&AccountType {
            code: code.to_string(),
            name: name.to_string(),
            minimum_balance: Decimal::from(minimum),
        })?;
        created += 1;
    }

    if created == 0 {
        println!("Already initialized at {}", ctx.data_path().display());
    } else {
        println!("✅ Initialized {} ({created} account types)", ctx.data_path().display());
    }
    Ok(())
}

pub fn register_customer(ctx: &AppContext, new: &NewCustomer) -> Result<(), anyhow::Error> {
    let customer = ctx.bank.register_customer(new, &ctx.actor)?;
    println!(
        "✅ Registered {} {} ({}, {})",
        customer.id,
        customer.full_name(),
        customer.segment,
        customer.risk_rating
    );
    Ok(())
}

/// Open an account; it stays PENDING until activated
pub fn open_account(
    ctx: &AppContext,
    customer_id: &str,
    account_type: &str,
    currency: Currency,
) -> Result<(), anyhow::Error> {
    let account = ctx.bank.open_account(
        &NewAccount {
            customer_id: customer_id.to_string(),
            account_type: account_type.to_uppercase(),
            currency,
            category: AccountCategory::Individual,
            mode_of_operation: ModeOfOperation::Singly,
            signatory: None,
        },
        &ctx.actor,
    )?;
    println!(
        "✅ Opened {} ({} {} {}) - {}",
        account.id, account.account_number, account.account_type, account.currency, account.status
    );
    Ok(())
}

/// Approve a PENDING account and activate it
pub fn activate(ctx: &AppContext, account_id: &str) -> Result<(), anyhow::Error> {
    ctx.bank.approve_account(account_id, &ctx.actor)?;
    let account = ctx.bank.activate_account(account_id, &ctx.actor)?;
    println!("✅ {} is {}", account.id, account.status);
    Ok(())
}

pub fn deposit(
    ctx: &AppContext,
    account_id: &str,
    amount: Decimal,
    reference: Option<&str>,
) -> Result<(), anyhow::Error> {
    let entry = ctx
        .bank
        .deposit(account_id, Amount::new(amount)?, reference, &ctx.actor)?;
    println!(
        "✅ Deposited {} to {} (ref: {}, balance: {})",
        entry.amount, account_id, entry.reference, entry.balance_after
    );
    Ok(())
}

pub fn withdraw(
    ctx: &AppContext,
    account_id: &str,
    amount: Decimal,
    reference: Option<&str>,
) -> Result<(), anyhow::Error> {
    let entry = ctx
        .bank
        .withdraw(account_id, Amount::new(amount)?, reference, &ctx.actor)?;
    println!(
        "✅ Withdrew {} from {} (ref: {}, balance: {})",
        -entry.amount, account_id, entry.reference, entry.balance_after
    );
    Ok(())
}

pub fn transfer(
    ctx: &AppContext,
    from: &str,
    to: &str,
    amount: Decimal,
    reference: Option<&str>,
) -> Result<(), anyhow::Error> {
    let receipt = ctx
        .bank
        .transfer(from, to, Amount::new(amount)?, reference, &ctx.actor)?;
    println!(
        "✅ Transferred {} from {} to {} (ref: {})",
        receipt.credit.amount, from, to, receipt.reference
    );
    Ok(())
}

pub fn pay_bill(
    ctx: &AppContext,
    account_id: &str,
    biller: &str,
    bill_reference: &str,
    amount: Decimal,
    reference: Option<&str>,
) -> Result<(), anyhow::Error> {
    let payment = ctx.bank.pay_bill(
        account_id,
        biller,
        bill_reference,
        Amount::new(amount)?,
        reference,
        &ctx.actor,
    )?;
    println!(
        "✅ Paid {} to {} for {} (ref: {}, charges: {})",
        payment.amount, payment.biller_name, payment.bill_reference, payment.reference, payment.charges
    );
    Ok(())
}

pub fn billers(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let billers = ctx.bank.billers()?;
    if billers.is_empty() {
        println!("No billers registered");
        return Ok(());
    }
    for biller in billers {
        println!(
            "{:<16} {:<32} paybill {:<10} {}",
            biller.code, biller.name, biller.paybill_number, biller.category
        );
    }
    Ok(())
}

pub fn balance(ctx: &AppContext, account_id: &str) -> Result<(), anyhow::Error> {
    let account = ctx.bank.account(account_id)?;
    println!(
        "Balance for {} ({}): {} {} [{}]",
        account.id, account.account_number, account.balance, account.currency, account.status
    );
    if !account.minimum_balance.is_zero() {
        println!("  minimum {} / available {}", account.minimum_balance, account.headroom());
    }
    Ok(())
}

pub fn statement(ctx: &AppContext, account_id: &str) -> Result<(), anyhow::Error> {
    let entries = ctx.bank.statement(account_id)?;
    if entries.is_empty() {
        println!("No entries for {account_id}");
        return Ok(());
    }

    println!(
        "{:<20} {:<12} {:>14} {:>14}  {}",
        "DATE", "KIND", "AMOUNT", "BALANCE", "REFERENCE"
    );
    for entry in &entries {
        println!(
            "{:<20} {:<12} {:>14} {:>14}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.kind.as_ref(),
            entry.amount,
            entry.balance_after,
            entry.reference
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

/// Reconcile one account, or all of them. Fails when any account is off.
pub fn verify(ctx: &AppContext, account_id: Option<&str>) -> Result<(), anyhow::Error> {
    let results = match account_id {
        Some(id) => vec![ctx.bank.verify_account(id)?],
        None => ctx.bank.verify_all()?,
    };

    let broken: Vec<_> = results.iter().filter(|r| !r.is_consistent()).collect();
    for r in &broken {
        println!(
            "❌ {}: balance {} but entries sum to {} ({} entries)",
            r.account_id, r.balance, r.entries_total, r.entry_count
        );
    }
    if !broken.is_empty() {
        anyhow::bail!("{} of {} accounts do not reconcile", broken.len(), results.len());
    }
    println!("✅ {} accounts reconcile", results.len());
    Ok(())
}

pub struct FxOrder<'a> {
    pub kind: FxKind,
    pub account_id: &'a str,
    pub counter_account_id: Option<&'a str>,
    pub base: Currency,
    pub quote: Currency,
    pub rate: Decimal,
    pub amount: Decimal,
    pub beneficiary: Option<&'a str>,
}

pub fn fx(ctx: &AppContext, order: FxOrder<'_>) -> Result<(), anyhow::Error> {
    let settlement = match (order.kind, order.counter_account_id) {
        (FxKind::Transfer, _) => Settlement::External,
        (_, Some(_)) => Settlement::AccountCredit,
        (_, None) => Settlement::CashCollection,
    };
    let deal = FxDeal {
        kind: order.kind,
        account_id: order.account_id.to_string(),
        counter_account_id: order.counter_account_id.map(str::to_string),
        pair: CurrencyPair::new(order.base, order.quote)?,
        rate: FxRate::new(order.rate)?,
        source_amount: Amount::new(order.amount)?,
        settlement,
        beneficiary: order.beneficiary.map(str::to_string),
    };

    let fx = ctx.bank.submit_fx(&deal, &ctx.actor)?;
    match fx.status {
        FxStatus::Validation => println!(
            "⏳ {} {} {} -> {} awaiting validation (request {})",
            fx.reference,
            fx.source_amount,
            fx.pair,
            fx.converted_amount,
            fx.approval_request_id.as_deref().unwrap_or("-")
        ),
        _ => println!(
            "✅ {} {} {} -> {} @ {} (charges {}) {}",
            fx.reference, fx.source_amount, fx.pair, fx.converted_amount, fx.rate, fx.charges, fx.status
        ),
    }
    Ok(())
}

fn print_request(request: &ApprovalRequest) {
    println!(
        "{}  {:<22} {}:{}  {}  by {}",
        request.id, request.kind.as_ref(), request.subject.subject_type, request.subject.id, request.status, request.requested_by
    );
    println!("    {}", request.payload);
}

/// List pending approval requests
pub fn requests(ctx: &AppContext) -> Result<(), anyhow::Error> {
    let pending = ctx.bank.pending_requests()?;
    if pending.is_empty() {
        println!("No pending requests");
        return Ok(());
    }
    for request in &pending {
        print_request(request);
    }
    let stats = ctx.bank.workflow_stats()?;
    println!(
        "{} pending, {} approved, {} rejected",
        stats.pending, stats.approved, stats.rejected
    );
    Ok(())
}

pub fn approve(ctx: &AppContext, request_id: &str) -> Result<(), anyhow::Error> {
    let request = ctx.bank.approve(request_id, &ctx.actor)?;
    println!("✅ Approved {} ({})", request.id, request.kind);
    Ok(())
}

pub fn reject(ctx: &AppContext, request_id: &str, reason: Option<&str>) -> Result<(), anyhow::Error> {
    let request = ctx.bank.reject(request_id, reason, &ctx.actor)?;
    println!(
        "✅ Rejected {} ({}){}",
        request.id,
        request.kind,
        reason.map(|r| format!(": {r}")).unwrap_or_default()
    );
    Ok(())
}

/// Print outbox events after `since`, one JSON line each
pub fn events(ctx: &AppContext, since: i64, limit: Option<usize>) -> Result<(), anyhow::Error> {
    let records = ctx.bank.events_since(since, limit)?;
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    if let Some(last) = records.last() {
        eprintln!("last seq: {}", last.seq);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teller_bank::{BillerCategory, NewBiller};
    use teller_core::Actor;
    use teller_ledger::Segment;
    use teller_risk::RiskRating;
    use tempfile::TempDir;

    #[test]
    fn test_commands_against_a_fresh_directory() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::open(dir.path(), Actor::new("cli-test")).unwrap();
        init(&ctx).unwrap();
        init(&ctx).unwrap();
        assert_eq!(ctx.bank.account_types().unwrap().len(), 2);

        register_customer(
            &ctx,
            &NewCustomer {
                branch_code: "001".to_string(),
                national_id: "12345678".to_string(),
                first_name: "Otieno".to_string(),
                last_name: "Mwangi".to_string(),
                email: None,
                phone: None,
                address: None,
                occupation: None,
                segment: Segment::Retail,
                risk_rating: RiskRating::Low,
                is_pep: false,
            },
        )
        .unwrap();
        let customer = ctx.bank.find_customer("12345678").unwrap().unwrap();
        open_account(&ctx, &customer.id, "sav", Currency::Kes).unwrap();
        let account = ctx.bank.accounts_for_customer(&customer.id).unwrap().remove(0);
        activate(&ctx, &account.id).unwrap();

        deposit(&ctx, &account.id, Decimal::from(1_000), None).unwrap();
        withdraw(&ctx, &account.id, Decimal::from(250), None).unwrap();
        assert!(withdraw(&ctx, &account.id, Decimal::from(5_000), None).is_err());
        assert_eq!(ctx.bank.balance(&account.id).unwrap(), Decimal::from(750));

        ctx.bank
            .register_biller(
                &NewBiller {
                    code: "nairobi-water".to_string(),
                    name: "Nairobi Water".to_string(),
                    paybill_number: "444400".to_string(),
                    category: BillerCategory::Utility,
                    bill_fetch_supported: false,
                    min_amount: None,
                    max_amount: None,
                },
                &ctx.actor,
            )
            .unwrap();
        billers(&ctx).unwrap();
        // 100 plus the retail charge of 70
        pay_bill(&ctx, &account.id, "nairobi-water", "ACC-0091", Decimal::from(100), None).unwrap();
        assert_eq!(ctx.bank.balance(&account.id).unwrap(), Decimal::from(580));

        verify(&ctx, None).unwrap();
        events(&ctx, 0, Some(10)).unwrap();
    }
}
