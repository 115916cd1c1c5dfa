//! Daily card usage counters
//!
//! One row per (card, business date, channel). The business date is the
//! calendar date at a fixed UTC offset, so the window rolls at local
//! midnight regardless of server time zone.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_lifecycle::{Card, CardLimits};
use teller_store::{codec, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Pos,
    Atm,
}

impl Channel {
    pub fn limit(self, limits: &CardLimits) -> Decimal {
        match self {
            Channel::Pos => limits.pos_daily.value(),
            Channel::Atm => limits.atm_daily.value(),
        }
    }
}

/// Outcome of a successful limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub card_id: String,
    pub channel: Channel,
    pub business_date: NaiveDate,
    pub limit: Decimal,
    /// Usage including the amount just approved
    pub used: Decimal,
}

impl LimitCheck {
    pub fn remaining(&self) -> Decimal {
        (self.limit - self.used).max(Decimal::ZERO)
    }
}

pub fn business_date(at: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_minutes * 60) {
        Some(offset) => at.with_timezone(&offset).date_naive(),
        None => at.date_naive(),
    }
}

pub fn usage(
    conn: &Connection,
    card: &Card,
    date: NaiveDate,
    channel: Channel,
) -> Result<Decimal, StoreError> {
    let used: Option<Decimal> = conn
        .query_row(
            "SELECT used FROM card_usage WHERE card_id = ?1 AND business_date = ?2 AND channel = ?3",
            params![card.id, date.to_string(), channel.as_ref()],
            |row| codec::decimal_col(row, 0),
        )
        .optional()?;
    Ok(used.unwrap_or(Decimal::ZERO))
}

pub(crate) fn store_usage(
    conn: &Connection,
    card: &Card,
    date: NaiveDate,
    channel: Channel,
    used: Decimal,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO card_usage (card_id, business_date, channel, used) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(card_id, business_date, channel) DO UPDATE SET used = excluded.used",
        params![card.id, date.to_string(), channel.as_ref(), codec::decimal(used)],
    )?;
    Ok(())
}
