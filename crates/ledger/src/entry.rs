//! Ledger entries
//!
//! Append-only. The `ledger_entries_immutable` trigger rejects updates, and
//! `(account_id, kind, reference)` is unique.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_store::{codec, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    TransferOut,
    TransferIn,
    FxBuy,
    FxSell,
    Fee,
    BillPayment,
    /// Administrative correction, either sign
    Adjustment,
}

impl EntryKind {
    pub fn is_credit(self) -> bool {
        matches!(self, EntryKind::Deposit | EntryKind::TransferIn | EntryKind::FxBuy)
    }

    pub fn is_debit(self) -> bool {
        matches!(
            self,
            EntryKind::Withdrawal
                | EntryKind::TransferOut
                | EntryKind::FxSell
                | EntryKind::Fee
                | EntryKind::BillPayment
        )
    }

    /// Reject zero amounts and amounts whose sign does not match the kind.
    pub fn check_sign(self, amount: Decimal) -> Result<(), LedgerError> {
        let ok = if amount.is_zero() {
            false
        } else if self.is_credit() {
            amount.is_sign_positive()
        } else if self.is_debit() {
            amount.is_sign_negative()
        } else {
            true
        };
        if ok {
            Ok(())
        } else {
            Err(LedgerError::SignMismatch { kind: self, amount })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: String,
    pub kind: EntryKind,
    /// Signed: credits positive, debits negative
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reference: String,
    pub actor: String,
    pub narration: Option<String>,
    pub created_at: DateTime<Utc>,
}

const SELECT_ENTRY: &str = "SELECT id, account_id, kind, amount, balance_after, reference, actor, narration, created_at
     FROM ledger_entries";

fn map_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.get(0)?,
        account_id: row.get(1)?,
        kind: codec::parsed_col(row, 2)?,
        amount: codec::decimal_col(row, 3)?,
        balance_after: codec::decimal_col(row, 4)?,
        reference: row.get(5)?,
        actor: row.get(6)?,
        narration: row.get(7)?,
        created_at: codec::timestamp_col(row, 8)?,
    })
}

pub(crate) struct NewEntry<'a> {
    pub account_id: &'a str,
    pub kind: EntryKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reference: &'a str,
    pub actor: &'a str,
    pub narration: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn insert_entry(conn: &Connection, entry: &NewEntry<'_>) -> Result<LedgerEntry, StoreError> {
    conn.execute(
        "INSERT INTO ledger_entries
         (account_id, kind, amount, balance_after, reference, actor, narration, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.account_id,
            entry.kind.as_ref(),
            codec::decimal(entry.amount),
            codec::decimal(entry.balance_after),
            entry.reference,
            entry.actor,
            entry.narration,
            codec::timestamp(entry.created_at),
        ],
    )?;
    Ok(LedgerEntry {
        id: conn.last_insert_rowid(),
        account_id: entry.account_id.to_string(),
        kind: entry.kind,
        amount: entry.amount,
        balance_after: entry.balance_after,
        reference: entry.reference.to_string(),
        actor: entry.actor.to_string(),
        narration: entry.narration.map(str::to_string),
        created_at: entry.created_at,
    })
}

pub fn find_entry(
    conn: &Connection,
    account_id: &str,
    kind: EntryKind,
    reference: &str,
) -> Result<Option<LedgerEntry>, StoreError> {
    Ok(conn
        .query_row(
            &format!("{SELECT_ENTRY} WHERE account_id = ?1 AND kind = ?2 AND reference = ?3"),
            params![account_id, kind.as_ref(), reference],
            map_entry,
        )
        .optional()?)
}

/// All entries of an account, oldest first.
pub fn entries_for_account(conn: &Connection, account_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} WHERE account_id = ?1 ORDER BY id ASC"))?;
    let rows = stmt.query_map(params![account_id], map_entry)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Every leg posted under a reference, across accounts.
pub fn entries_for_reference(conn: &Connection, reference: &str) -> Result<Vec<LedgerEntry>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} WHERE reference = ?1 ORDER BY id ASC"))?;
    let rows = stmt.query_map(params![reference], map_entry)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Exact decimal sum of an account's entry amounts.
///
/// Summed here rather than with SQL `SUM`, which would go through floats.
pub fn sum_amounts(conn: &Connection, account_id: &str) -> Result<(Decimal, usize), StoreError> {
    let mut stmt = conn.prepare("SELECT amount FROM ledger_entries WHERE account_id = ?1")?;
    let rows = stmt.query_map(params![account_id], |row| codec::decimal_col(row, 0))?;
    let mut total = Decimal::ZERO;
    let mut count = 0;
    for amount in rows {
        total += amount?;
        count += 1;
    }
    Ok((total, count))
}
