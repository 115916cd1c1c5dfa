//! Billers, bill payments, transfers to other banks and standing orders
//!
//! Every payment here is one debit posting (plus its FEE leg) and a record of
//! where the money went. The record and the postings share a reference and a
//! transaction. Standing orders are only stored and executed on request;
//! deciding when one is due to run is left to the caller.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_core::{Actor, Amount};
use teller_ledger::account;
use teller_ledger::charges::{charges_for, Service};
use teller_ledger::{EntryKind, LedgerEngine, LedgerEntry, Posting};
use teller_store::{codec, OptionalRow, StoreError};

use crate::customer;
use crate::error::BankError;

/// Post the FEE leg of `service` for the account owner's segment under
/// `reference`. Free services post nothing.
pub(crate) fn post_fee_in(
    ledger: &LedgerEngine,
    conn: &Connection,
    account_id: &str,
    service: Service,
    amount: Option<Amount>,
    reference: &str,
    actor: &Actor,
) -> Result<(Amount, Option<LedgerEntry>), BankError> {
    let owner = account::get_account(conn, account_id)?.customer_id;
    let segment = customer::get_customer(conn, &owner)?.segment;
    let charges = charges_for(service, segment, amount);
    if charges.is_free() {
        return Ok((Amount::ZERO, None));
    }
    let fee = ledger.post_in(
        conn,
        &Posting::debit(account_id, EntryKind::Fee, charges.total, reference)
            .with_narration(format!("{service} charges")),
        actor,
    )?;
    Ok((charges.total, Some(fee)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillerCategory {
    Utility,
    Telecom,
    Government,
    Insurance,
    Education,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Biller {
    /// Short stable code, e.g. `kplc-prepaid`
    pub code: String,
    pub name: String,
    pub paybill_number: String,
    pub category: BillerCategory,
    pub bill_fetch_supported: bool,
    pub min_amount: Option<Amount>,
    pub max_amount: Option<Amount>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Biller {
    /// Refuse amounts outside the biller's accepted range.
    pub fn accepts(&self, amount: Amount) -> Result<(), BankError> {
        let below = self.min_amount.is_some_and(|min| amount < min);
        let above = self.max_amount.is_some_and(|max| amount > max);
        if below || above {
            return Err(BankError::InvalidRequest(format!(
                "{} accepts {} to {}, not {amount}",
                self.name,
                self.min_amount.map_or_else(|| "any".to_string(), |a| a.to_string()),
                self.max_amount.map_or_else(|| "any".to_string(), |a| a.to_string()),
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBiller {
    pub code: String,
    pub name: String,
    pub paybill_number: String,
    pub category: BillerCategory,
    #[serde(default)]
    pub bill_fetch_supported: bool,
    #[serde(default)]
    pub min_amount: Option<Amount>,
    #[serde(default)]
    pub max_amount: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPayment {
    pub reference: String,
    pub account_id: String,
    /// None once the biller is removed; name and paybill stay on the record
    pub biller_code: Option<String>,
    pub biller_name: String,
    pub paybill_number: String,
    /// The customer's number at the biller (meter, account, invoice)
    pub bill_reference: String,
    pub amount: Amount,
    pub charges: Amount,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An account held outside this bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub account: String,
    pub name: String,
    #[serde(default)]
    pub bank: Option<String>,
}

impl Beneficiary {
    pub(crate) fn validate(&self) -> Result<(), BankError> {
        if self.account.trim().is_empty() || self.name.trim().is_empty() {
            return Err(BankError::InvalidRequest(
                "beneficiary needs an account and a name".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsTransfer {
    pub reference: String,
    pub account_id: String,
    pub beneficiary: Beneficiary,
    pub amount: Amount,
    pub charges: Amount,
    pub narration: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Weekly,
    BiWeekly,
    Monthly,
}

impl Frequency {
    /// Whether a schedule starting on `start` has a run on `on`.
    ///
    /// Monthly orders run on the start's day of the month, or on the last
    /// day of shorter months.
    pub fn falls_on(self, start: NaiveDate, on: NaiveDate) -> bool {
        if on < start {
            return false;
        }
        match self {
            Frequency::Weekly => (on - start).num_days() % 7 == 0,
            Frequency::BiWeekly => (on - start).num_days() % 14 == 0,
            Frequency::Monthly => on.day() == start.day().min(last_day_of_month(on)),
        }
    }
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    (28..=31).rev().find(|d| date.with_day(*d).is_some()).unwrap_or(28)
}

/// Where a standing order pays to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payee {
    /// An account in this bank; both legs are posted
    Internal { account_id: String },
    /// Another bank; only the debit leg is posted here
    External(Beneficiary),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingOrder {
    pub id: String,
    pub account_id: String,
    pub payee: Payee,
    pub amount: Amount,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub last_run_on: Option<NaiveDate>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StandingOrder {
    pub fn is_due(&self, on: NaiveDate) -> bool {
        self.is_active
            && self.end_date.map_or(true, |end| on <= end)
            && self.frequency.falls_on(self.start_date, on)
    }

    /// Ledger reference of the run on `on`. One run per date, so executing
    /// the same date twice posts once.
    pub fn run_reference(&self, on: NaiveDate) -> String {
        format!("{}-{}", self.id, on.format("%Y%m%d"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStandingOrder {
    pub account_id: String,
    pub payee: Payee,
    pub amount: Amount,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// The postings of one standing-order run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingOrderRun {
    pub order_id: String,
    pub run_on: NaiveDate,
    pub reference: String,
    pub debit: LedgerEntry,
    /// Credit leg for an internal payee
    pub credit: Option<LedgerEntry>,
    pub fee: Option<LedgerEntry>,
}

// === Billers ===

const SELECT_BILLER: &str = "SELECT code, name, paybill_number, category, bill_fetch_supported,
        min_amount, max_amount, is_active, created_by, created_at
     FROM billers";

fn map_biller(row: &Row<'_>) -> rusqlite::Result<Biller> {
    Ok(Biller {
        code: row.get(0)?,
        name: row.get(1)?,
        paybill_number: row.get(2)?,
        category: codec::parsed_col(row, 3)?,
        bill_fetch_supported: row.get(4)?,
        min_amount: codec::opt_parsed_col(row, 5)?,
        max_amount: codec::opt_parsed_col(row, 6)?,
        is_active: row.get(7)?,
        created_by: row.get(8)?,
        created_at: codec::timestamp_col(row, 9)?,
    })
}

pub fn insert_biller(
    conn: &Connection,
    new: &NewBiller,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Biller, BankError> {
    let code = new.code.trim();
    let paybill = new.paybill_number.trim();
    if code.is_empty() || new.name.trim().is_empty() || paybill.is_empty() {
        return Err(BankError::InvalidRequest(
            "biller needs a code, a name and a paybill number".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (new.min_amount, new.max_amount) {
        if min > max {
            return Err(BankError::InvalidRequest(format!(
                "biller {code}: minimum {min} is above maximum {max}"
            )));
        }
    }

    let inserted = conn.execute(
        "INSERT INTO billers
         (code, name, paybill_number, category, bill_fetch_supported, min_amount, max_amount,
          is_active, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?9)",
        params![
            code,
            new.name.trim(),
            paybill,
            new.category.as_ref(),
            new.bill_fetch_supported,
            new.min_amount.map(|a| codec::decimal(a.value())),
            new.max_amount.map(|a| codec::decimal(a.value())),
            actor.id(),
            codec::timestamp(now),
        ],
    );
    if let Err(e) = inserted {
        let e = StoreError::from(e);
        if e.is_unique_violation() {
            return Err(BankError::InvalidRequest(format!(
                "biller {code} or paybill {paybill} is already registered"
            )));
        }
        return Err(e.into());
    }
    Ok(get_biller(conn, code)?)
}

pub fn get_biller(conn: &Connection, code: &str) -> Result<Biller, StoreError> {
    conn.query_row(&format!("{SELECT_BILLER} WHERE code = ?1"), params![code], map_biller)
        .or_not_found("biller", code)
}

pub fn list_billers(conn: &Connection) -> Result<Vec<Biller>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_BILLER} WHERE is_active = 1 ORDER BY category, name"))?;
    let rows = stmt.query_map([], map_biller)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn set_biller_active(conn: &Connection, code: &str, active: bool) -> Result<Biller, StoreError> {
    let updated = conn.execute(
        "UPDATE billers SET is_active = ?1 WHERE code = ?2",
        params![active, code],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found("biller", code));
    }
    get_biller(conn, code)
}

// === Bill payments ===

const SELECT_BILL_PAYMENT: &str = "SELECT reference, account_id, biller_code, biller_name,
        paybill_number, bill_reference, amount, charges, created_by, created_at
     FROM bill_payments";

fn map_bill_payment(row: &Row<'_>) -> rusqlite::Result<BillPayment> {
    Ok(BillPayment {
        reference: row.get(0)?,
        account_id: row.get(1)?,
        biller_code: row.get(2)?,
        biller_name: row.get(3)?,
        paybill_number: row.get(4)?,
        bill_reference: row.get(5)?,
        amount: codec::parsed_col(row, 6)?,
        charges: codec::parsed_col(row, 7)?,
        created_by: row.get(8)?,
        created_at: codec::timestamp_col(row, 9)?,
    })
}

pub(crate) fn insert_bill_payment(conn: &Connection, payment: &BillPayment) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO bill_payments
         (reference, account_id, biller_code, biller_name, paybill_number, bill_reference,
          amount, charges, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            payment.reference,
            payment.account_id,
            payment.biller_code,
            payment.biller_name,
            payment.paybill_number,
            payment.bill_reference,
            codec::decimal(payment.amount.value()),
            codec::decimal(payment.charges.value()),
            payment.created_by,
            codec::timestamp(payment.created_at),
        ],
    )?;
    Ok(())
}

pub fn find_bill_payment(conn: &Connection, reference: &str) -> Result<Option<BillPayment>, StoreError> {
    Ok(conn
        .query_row(
            &format!("{SELECT_BILL_PAYMENT} WHERE reference = ?1"),
            params![reference],
            map_bill_payment,
        )
        .optional()?)
}

pub fn bill_payments_for_account(conn: &Connection, account_id: &str) -> Result<Vec<BillPayment>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_BILL_PAYMENT} WHERE account_id = ?1 ORDER BY created_at, reference"
    ))?;
    let rows = stmt.query_map(params![account_id], map_bill_payment)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// === Funds transfers ===

const SELECT_FUNDS_TRANSFER: &str = "SELECT reference, account_id, beneficiary_account,
        beneficiary_name, beneficiary_bank, amount, charges, narration, created_by, created_at
     FROM funds_transfers";

fn map_funds_transfer(row: &Row<'_>) -> rusqlite::Result<FundsTransfer> {
    Ok(FundsTransfer {
        reference: row.get(0)?,
        account_id: row.get(1)?,
        beneficiary: Beneficiary {
            account: row.get(2)?,
            name: row.get(3)?,
            bank: row.get(4)?,
        },
        amount: codec::parsed_col(row, 5)?,
        charges: codec::parsed_col(row, 6)?,
        narration: row.get(7)?,
        created_by: row.get(8)?,
        created_at: codec::timestamp_col(row, 9)?,
    })
}

pub(crate) fn insert_funds_transfer(conn: &Connection, transfer: &FundsTransfer) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO funds_transfers
         (reference, account_id, beneficiary_account, beneficiary_name, beneficiary_bank,
          amount, charges, narration, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            transfer.reference,
            transfer.account_id,
            transfer.beneficiary.account.trim(),
            transfer.beneficiary.name.trim(),
            transfer.beneficiary.bank,
            codec::decimal(transfer.amount.value()),
            codec::decimal(transfer.charges.value()),
            transfer.narration,
            transfer.created_by,
            codec::timestamp(transfer.created_at),
        ],
    )?;
    Ok(())
}

pub fn find_funds_transfer(conn: &Connection, reference: &str) -> Result<Option<FundsTransfer>, StoreError> {
    Ok(conn
        .query_row(
            &format!("{SELECT_FUNDS_TRANSFER} WHERE reference = ?1"),
            params![reference],
            map_funds_transfer,
        )
        .optional()?)
}

pub fn funds_transfers_for_account(conn: &Connection, account_id: &str) -> Result<Vec<FundsTransfer>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_FUNDS_TRANSFER} WHERE account_id = ?1 ORDER BY created_at, reference"
    ))?;
    let rows = stmt.query_map(params![account_id], map_funds_transfer)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

// === Standing orders ===

const SELECT_STANDING_ORDER: &str = "SELECT id, account_id, payee_account_id, beneficiary_account,
        beneficiary_name, beneficiary_bank, amount, frequency, start_date, end_date, is_active,
        last_run_on, created_by, created_at, updated_at
     FROM standing_orders";

fn map_standing_order(row: &Row<'_>) -> rusqlite::Result<StandingOrder> {
    let payee_account_id: Option<String> = row.get(2)?;
    let payee = match payee_account_id {
        Some(account_id) => Payee::Internal { account_id },
        None => Payee::External(Beneficiary {
            account: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            bank: row.get(5)?,
        }),
    };
    Ok(StandingOrder {
        id: row.get(0)?,
        account_id: row.get(1)?,
        payee,
        amount: codec::parsed_col(row, 6)?,
        frequency: codec::parsed_col(row, 7)?,
        start_date: codec::parsed_col(row, 8)?,
        end_date: codec::opt_parsed_col(row, 9)?,
        is_active: row.get(10)?,
        last_run_on: codec::opt_parsed_col(row, 11)?,
        created_by: row.get(12)?,
        created_at: codec::timestamp_col(row, 13)?,
        updated_at: codec::timestamp_col(row, 14)?,
    })
}

pub(crate) fn insert_standing_order(
    conn: &Connection,
    id: &str,
    new: &NewStandingOrder,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<StandingOrder, StoreError> {
    let (payee_account_id, beneficiary) = match &new.payee {
        Payee::Internal { account_id } => (Some(account_id.as_str()), None),
        Payee::External(beneficiary) => (None, Some(beneficiary)),
    };
    conn.execute(
        "INSERT INTO standing_orders
         (id, account_id, payee_account_id, beneficiary_account, beneficiary_name, beneficiary_bank,
          amount, frequency, start_date, end_date, is_active, last_run_on, created_by, created_at,
          updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, NULL, ?11, ?12, ?12)",
        params![
            id,
            new.account_id,
            payee_account_id,
            beneficiary.map(|b| b.account.trim()),
            beneficiary.map(|b| b.name.trim()),
            beneficiary.and_then(|b| b.bank.as_deref()),
            codec::decimal(new.amount.value()),
            new.frequency.as_ref(),
            new.start_date.to_string(),
            new.end_date.map(|d| d.to_string()),
            actor.id(),
            codec::timestamp(now),
        ],
    )?;
    get_standing_order(conn, id)
}

pub fn get_standing_order(conn: &Connection, id: &str) -> Result<StandingOrder, StoreError> {
    conn.query_row(
        &format!("{SELECT_STANDING_ORDER} WHERE id = ?1"),
        params![id],
        map_standing_order,
    )
    .or_not_found("standing order", id)
}

pub fn standing_orders_for_account(conn: &Connection, account_id: &str) -> Result<Vec<StandingOrder>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_STANDING_ORDER} WHERE account_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![account_id], map_standing_order)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn deactivate_standing_order(
    conn: &Connection,
    id: &str,
    now: DateTime<Utc>,
) -> Result<StandingOrder, StoreError> {
    let updated = conn.execute(
        "UPDATE standing_orders SET is_active = 0, updated_at = ?1 WHERE id = ?2",
        params![codec::timestamp(now), id],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found("standing order", id));
    }
    get_standing_order(conn, id)
}

pub(crate) fn mark_run(
    conn: &Connection,
    id: &str,
    run_on: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE standing_orders
         SET last_run_on = MAX(COALESCE(last_run_on, ''), ?1), updated_at = ?2
         WHERE id = ?3",
        params![run_on.to_string(), codec::timestamp(now), id],
    )?;
    Ok(())
}
