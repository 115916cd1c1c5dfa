//! PIN records
//!
//! Only a salted argon2 PHC string is stored. The failed-attempt counter and
//! the block flag live beside it; the block flag is independent of the card's
//! administrative status.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use teller_store::{codec, OptionalRow, StoreError};

use crate::error::GuardError;

const PIN_MIN_LEN: usize = 4;
const PIN_MAX_LEN: usize = 6;

/// Counter state without the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinState {
    pub failed_attempts: u32,
    pub is_blocked: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PinRecord {
    pub hash: String,
    pub state: PinState,
}

pub(crate) fn validate_format(pin: &str) -> Result<(), GuardError> {
    if !(PIN_MIN_LEN..=PIN_MAX_LEN).contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GuardError::InvalidPin(format!(
            "expected {PIN_MIN_LEN} to {PIN_MAX_LEN} digits"
        )));
    }
    Ok(())
}

pub(crate) fn hash_pin(pin: &str) -> Result<String, GuardError> {
    validate_format(pin)?;
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GuardError::PinHash(e.to_string()))
}

pub(crate) fn verify_pin(pin: &str, hash: &str) -> Result<bool, GuardError> {
    let parsed = PasswordHash::new(hash).map_err(|e| GuardError::PinHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok())
}

pub(crate) fn load(conn: &Connection, card_id: &str) -> Result<Option<PinRecord>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT pin_hash, failed_attempts, is_blocked FROM card_pins WHERE card_id = ?1",
            params![card_id],
            |row| {
                Ok(PinRecord {
                    hash: row.get(0)?,
                    state: PinState {
                        failed_attempts: row.get(1)?,
                        is_blocked: row.get(2)?,
                    },
                })
            },
        )
        .optional()?)
}

/// Store a new hash and clear the counter and block.
pub(crate) fn store_hash(
    conn: &Connection,
    card_id: &str,
    hash: &str,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO card_pins (card_id, pin_hash, failed_attempts, is_blocked, updated_at)
         VALUES (?1, ?2, 0, 0, ?3)
         ON CONFLICT(card_id) DO UPDATE SET
            pin_hash = excluded.pin_hash, failed_attempts = 0, is_blocked = 0,
            updated_at = excluded.updated_at",
        params![card_id, hash, codec::timestamp(now)],
    )?;
    Ok(())
}

/// Bump the counter, blocking at `max_attempts`. Returns the new state.
pub(crate) fn register_failure(
    conn: &Connection,
    card_id: &str,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> Result<PinState, StoreError> {
    conn.query_row(
        "UPDATE card_pins SET
            failed_attempts = failed_attempts + 1,
            is_blocked = CASE WHEN failed_attempts + 1 >= ?2 THEN 1 ELSE is_blocked END,
            updated_at = ?3
         WHERE card_id = ?1
         RETURNING failed_attempts, is_blocked",
        params![card_id, max_attempts, codec::timestamp(now)],
        |row| {
            Ok(PinState {
                failed_attempts: row.get(0)?,
                is_blocked: row.get(1)?,
            })
        },
    )
    .or_not_found("card PIN", card_id)
}

/// Clear the counter. With `only_if_unblocked` a blocked record is left alone
/// and `false` is returned.
pub(crate) fn clear_failures(
    conn: &Connection,
    card_id: &str,
    only_if_unblocked: bool,
    now: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let sql = if only_if_unblocked {
        "UPDATE card_pins SET failed_attempts = 0, updated_at = ?2 WHERE card_id = ?1 AND is_blocked = 0"
    } else {
        "UPDATE card_pins SET failed_attempts = 0, is_blocked = 0, updated_at = ?2 WHERE card_id = ?1"
    };
    let updated = conn.execute(sql, params![card_id, codec::timestamp(now)])?;
    Ok(updated > 0)
}
