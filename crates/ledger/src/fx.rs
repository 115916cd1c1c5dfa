//! Foreign-exchange deals
//!
//! A deal converts `source_amount` of the pair's base currency into
//! `converted_amount` of the quote currency at `rate`. The source account
//! (in the base currency) is debited with an FX_SELL leg. The other side
//! depends on settlement: ACCOUNT_CREDIT credits the counter account with an
//! FX_BUY leg; CASH_COLLECTION and EXTERNAL settle outside the ledger.
//! TRANSFER deals also debit their charges as a FEE leg.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_core::{
    insert_with_fresh_reference, Actor, Amount, CurrencyPair, FxRate, ReferenceGenerator,
    ReferencePrefix,
};
use teller_store::{codec, OptionalRow, StoreError};
use uuid::Uuid;

use crate::charges::Service;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxKind {
    /// Customer buys foreign currency
    Buy,
    /// Customer sells foreign currency
    Sell,
    /// Outbound wire in foreign currency
    Transfer,
}

impl FxKind {
    pub fn reference_prefix(self) -> ReferencePrefix {
        match self {
            FxKind::Buy => ReferencePrefix::FxBuy,
            FxKind::Sell => ReferencePrefix::FxSell,
            FxKind::Transfer => ReferencePrefix::FxTransfer,
        }
    }

    pub fn service(self) -> Service {
        match self {
            FxKind::Buy => Service::FxPurchase,
            FxKind::Sell => Service::FxSale,
            FxKind::Transfer => Service::FxTransfer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Settlement {
    AccountCredit,
    CashCollection,
    /// Correspondent bank; only for transfers
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxStatus {
    Pending,
    Validation,
    Completed,
    Rejected,
}

impl FxStatus {
    pub fn can_become(self, target: FxStatus) -> bool {
        use FxStatus::*;
        matches!(
            (self, target),
            (Pending, Validation) | (Pending, Completed) | (Pending, Rejected)
                | (Validation, Completed) | (Validation, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FxStatus::Completed | FxStatus::Rejected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxTransaction {
    pub id: String,
    pub reference: String,
    pub kind: FxKind,
    pub account_id: String,
    pub counter_account_id: Option<String>,
    pub pair: CurrencyPair,
    pub rate: FxRate,
    pub source_amount: Amount,
    pub converted_amount: Amount,
    pub charges: Amount,
    pub settlement: Settlement,
    pub beneficiary: Option<String>,
    pub status: FxStatus,
    pub approval_request_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A deal as submitted, before a reference is assigned.
#[derive(Debug, Clone)]
pub struct FxDeal {
    pub kind: FxKind,
    pub account_id: String,
    pub counter_account_id: Option<String>,
    pub pair: CurrencyPair,
    pub rate: FxRate,
    pub source_amount: Amount,
    pub settlement: Settlement,
    pub beneficiary: Option<String>,
}

impl FxDeal {
    pub fn converted_amount(&self) -> Amount {
        self.rate.convert(self.source_amount)
    }
}

const SELECT_FX: &str = "SELECT id, reference, kind, account_id, counter_account_id, base_currency,
        quote_currency, rate, source_amount, converted_amount, charges, settlement, beneficiary,
        status, approval_request_id, created_by, created_at, completed_at
     FROM fx_transactions";

fn map_fx(row: &Row<'_>) -> rusqlite::Result<FxTransaction> {
    Ok(FxTransaction {
        id: row.get(0)?,
        reference: row.get(1)?,
        kind: codec::parsed_col(row, 2)?,
        account_id: row.get(3)?,
        counter_account_id: row.get(4)?,
        pair: CurrencyPair {
            base: codec::parsed_col(row, 5)?,
            quote: codec::parsed_col(row, 6)?,
        },
        rate: codec::parsed_col(row, 7)?,
        source_amount: codec::parsed_col(row, 8)?,
        converted_amount: codec::parsed_col(row, 9)?,
        charges: codec::parsed_col(row, 10)?,
        settlement: codec::parsed_col(row, 11)?,
        beneficiary: row.get(12)?,
        status: codec::parsed_col(row, 13)?,
        approval_request_id: row.get(14)?,
        created_by: row.get(15)?,
        created_at: codec::timestamp_col(row, 16)?,
        completed_at: codec::opt_timestamp_col(row, 17)?,
    })
}

/// Book a PENDING deal under a fresh FXB/FXS/FXT reference.
pub fn insert_fx(
    conn: &Connection,
    deal: &FxDeal,
    charges: Amount,
    generator: &ReferenceGenerator,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<FxTransaction, StoreError> {
    let id = format!("FX-{}", Uuid::new_v4().simple());
    let prefix = deal.kind.reference_prefix();

    insert_with_fresh_reference(
        generator.retry_limit(),
        prefix.as_ref(),
        || generator.generate(prefix),
        |reference| {
            conn.execute(
                "INSERT INTO fx_transactions
                 (id, reference, kind, account_id, counter_account_id, base_currency, quote_currency,
                  rate, source_amount, converted_amount, charges, settlement, beneficiary, status,
                  created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    id,
                    reference,
                    deal.kind.as_ref(),
                    deal.account_id,
                    deal.counter_account_id,
                    deal.pair.base.code(),
                    deal.pair.quote.code(),
                    codec::decimal(deal.rate.value()),
                    codec::decimal(deal.source_amount.value()),
                    codec::decimal(deal.converted_amount().value()),
                    codec::decimal(charges.value()),
                    deal.settlement.as_ref(),
                    deal.beneficiary,
                    FxStatus::Pending.as_ref(),
                    actor.id(),
                    codec::timestamp(now),
                ],
            )
            .map_err(StoreError::from)
        },
    )?;

    get_fx(conn, &id)
}

pub fn get_fx(conn: &Connection, id: &str) -> Result<FxTransaction, StoreError> {
    conn.query_row(&format!("{SELECT_FX} WHERE id = ?1"), params![id], map_fx)
        .or_not_found("fx transaction", id)
}

pub fn get_fx_by_reference(conn: &Connection, reference: &str) -> Result<FxTransaction, StoreError> {
    conn.query_row(
        &format!("{SELECT_FX} WHERE reference = ?1"),
        params![reference],
        map_fx,
    )
    .or_not_found("fx transaction", reference)
}

pub fn list_fx_by_status(conn: &Connection, status: FxStatus) -> Result<Vec<FxTransaction>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_FX} WHERE status = ?1 ORDER BY created_at"))?;
    let rows = stmt.query_map(params![status.as_ref()], map_fx)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Move a deal from `from` to `to`. Zero rows means someone else moved it.
pub(crate) fn update_fx_status(
    conn: &Connection,
    fx: &FxTransaction,
    to: FxStatus,
    approval_request_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<FxTransaction, StoreError> {
    let completed_at = to.is_terminal().then(|| codec::timestamp(now));
    let updated = conn.execute(
        "UPDATE fx_transactions
         SET status = ?1, approval_request_id = COALESCE(?2, approval_request_id), completed_at = ?3
         WHERE id = ?4 AND status = ?5",
        params![
            to.as_ref(),
            approval_request_id,
            completed_at,
            fx.id,
            fx.status.as_ref(),
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::LockTimeout {
            resource: format!("fx transaction {} in status {}", fx.reference, fx.status),
            waited_ms: 0,
        });
    }
    get_fx(conn, &fx.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_edges() {
        assert!(FxStatus::Pending.can_become(FxStatus::Validation));
        assert!(FxStatus::Validation.can_become(FxStatus::Completed));
        assert!(!FxStatus::Completed.can_become(FxStatus::Rejected));
        assert!(!FxStatus::Rejected.can_become(FxStatus::Completed));
        assert!(!FxStatus::Validation.can_become(FxStatus::Pending));
    }

    #[test]
    fn test_kind_prefixes() {
        assert_eq!(FxKind::Buy.reference_prefix().as_ref(), "FXB");
        assert_eq!(FxKind::Transfer.reference_prefix().as_ref(), "FXT");
        assert_eq!(FxKind::Sell.service(), Service::FxSale);
    }
}
