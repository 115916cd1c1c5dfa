//! Card records

use chrono::{DateTime, Months, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_core::{insert_with_fresh_reference, Actor, Amount, ReferenceGenerator};
use teller_store::{codec, OptionalRow, StoreError};
use uuid::Uuid;

/// Cards are valid for four years from issue.
const VALIDITY_MONTHS: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Pending,
    Active,
    Blocked,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardType {
    Debit,
    Prepaid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLimits {
    pub pos_daily: Amount,
    pub atm_daily: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub card_number: String,
    pub account_id: String,
    pub card_type: CardType,
    pub status: CardStatus,
    pub limits: CardLimits,
    pub expires_on: NaiveDate,
    pub replaces_card_id: Option<String>,
    pub issued_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Last four digits, for logs and receipts
    pub fn masked_number(&self) -> String {
        let tail = &self.card_number[self.card_number.len().saturating_sub(4)..];
        format!("**** **** **** {tail}")
    }
}

#[derive(Debug, Clone)]
pub struct NewCard {
    pub account_id: String,
    pub card_type: CardType,
    pub limits: CardLimits,
    pub replaces_card_id: Option<String>,
}

const SELECT_CARD: &str = "SELECT id, card_number, account_id, card_type, status, pos_daily_limit,
        atm_daily_limit, expires_on, replaces_card_id, issued_by, created_at, updated_at
     FROM cards";

fn map_card(row: &Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        card_number: row.get(1)?,
        account_id: row.get(2)?,
        card_type: codec::parsed_col(row, 3)?,
        status: codec::parsed_col(row, 4)?,
        limits: CardLimits {
            pos_daily: codec::parsed_col(row, 5)?,
            atm_daily: codec::parsed_col(row, 6)?,
        },
        expires_on: codec::parsed_col(row, 7)?,
        replaces_card_id: row.get(8)?,
        issued_by: row.get(9)?,
        created_at: codec::timestamp_col(row, 10)?,
        updated_at: codec::timestamp_col(row, 11)?,
    })
}

/// Insert a PENDING card with a fresh 16-digit number under `bin`.
pub(crate) fn insert_card(
    conn: &Connection,
    new: &NewCard,
    generator: &ReferenceGenerator,
    bin: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Card, StoreError> {
    let id = format!("CRD-{}", Uuid::new_v4().simple());
    let stamp = codec::timestamp(now);
    let expires_on = now
        .date_naive()
        .checked_add_months(Months::new(VALIDITY_MONTHS))
        .unwrap_or(NaiveDate::MAX)
        .to_string();

    insert_with_fresh_reference(
        generator.retry_limit(),
        "card number",
        || generator.card_number(bin),
        |number| {
            conn.execute(
                "INSERT INTO cards
                 (id, card_number, account_id, card_type, status, pos_daily_limit, atm_daily_limit,
                  expires_on, replaces_card_id, issued_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    id,
                    number,
                    new.account_id,
                    new.card_type.as_ref(),
                    CardStatus::Pending.as_ref(),
                    codec::decimal(new.limits.pos_daily.value()),
                    codec::decimal(new.limits.atm_daily.value()),
                    expires_on,
                    new.replaces_card_id,
                    actor.id(),
                    stamp,
                ],
            )
            .map_err(StoreError::from)
        },
    )?;

    get_card(conn, &id)
}

pub fn get_card(conn: &Connection, id: &str) -> Result<Card, StoreError> {
    conn.query_row(&format!("{SELECT_CARD} WHERE id = ?1"), params![id], map_card)
        .or_not_found("card", id)
}

pub fn cards_for_account(conn: &Connection, account_id: &str) -> Result<Vec<Card>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_CARD} WHERE account_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![account_id], map_card)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Status compare-and-swap against the status the caller read.
pub(crate) fn update_card_status(
    conn: &Connection,
    card: &Card,
    to: CardStatus,
    now: DateTime<Utc>,
) -> Result<Card, StoreError> {
    let updated = conn.execute(
        "UPDATE cards SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_ref(), codec::timestamp(now), card.id, card.status.as_ref()],
    )?;
    if updated == 0 {
        return Err(StoreError::LockTimeout {
            resource: format!("card {} in status {}", card.id, card.status),
            waited_ms: 0,
        });
    }
    get_card(conn, &card.id)
}

/// Replace both daily limits. Only an approved CARD_LIMIT_UPDATE calls this.
pub fn update_card_limits(
    conn: &Connection,
    card_id: &str,
    limits: &CardLimits,
    now: DateTime<Utc>,
) -> Result<Card, StoreError> {
    let updated = conn.execute(
        "UPDATE cards SET pos_daily_limit = ?1, atm_daily_limit = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            codec::decimal(limits.pos_daily.value()),
            codec::decimal(limits.atm_daily.value()),
            codec::timestamp(now),
            card_id,
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found("card", card_id));
    }
    get_card(conn, card_id)
}
