//! Reference generation
//!
//! Transaction references look like `DEP260301143005K7QX2M9`:
//! prefix, UTC `yyMMddHHmmss`, six random Crockford base-32 characters and one
//! check character. Account and card numbers are random digits closed by a
//! Luhn check digit.
//!
//! Nothing here guarantees uniqueness on its own. The storage layer's unique
//! index does; callers insert, and on a collision generate again through
//! [`insert_with_fresh_reference`].

use crate::clock::{Clock, SystemClock};
use rand::Rng;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const SUFFIX_LEN: usize = 6;

/// Default number of fresh references tried before giving up.
pub const DEFAULT_RETRY_LIMIT: u32 = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("Reference space exhausted for {prefix} after {attempts} collisions")]
    Exhausted { prefix: String, attempts: u32 },
}

/// Prefixes for generated references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum ReferencePrefix {
    #[strum(serialize = "DEP")]
    Deposit,
    #[strum(serialize = "WDL")]
    Withdrawal,
    #[strum(serialize = "TRF")]
    Transfer,
    #[strum(serialize = "FXB")]
    FxBuy,
    #[strum(serialize = "FXS")]
    FxSell,
    #[strum(serialize = "FXT")]
    FxTransfer,
    #[strum(serialize = "CRD")]
    CardSpend,
    #[strum(serialize = "BIL")]
    BillPayment,
    #[strum(serialize = "STO")]
    StandingOrder,
    #[strum(serialize = "FEE")]
    Fee,
    #[strum(serialize = "ADJ")]
    Adjustment,
    #[strum(serialize = "APR")]
    Approval,
    #[strum(serialize = "CUS")]
    Customer,
}

/// Errors that can tell a unique-index collision apart from other failures.
pub trait Collision {
    fn is_collision(&self) -> bool;
}

#[derive(Clone)]
pub struct ReferenceGenerator {
    clock: Arc<dyn Clock>,
    retry_limit: u32,
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ReferenceGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit.max(1);
        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// A fresh transaction reference for `prefix`.
    pub fn generate(&self, prefix: ReferencePrefix) -> String {
        self.generate_with(prefix.as_ref())
    }

    pub fn generate_with(&self, prefix: &str) -> String {
        let mut rng = rand::thread_rng();
        let mut body = String::with_capacity(prefix.len() + 12 + SUFFIX_LEN + 1);
        body.push_str(&prefix.to_uppercase());
        body.push_str(&self.clock.now().format("%y%m%d%H%M%S").to_string());
        for _ in 0..SUFFIX_LEN {
            body.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
        }
        let check = check_char(&body);
        body.push(check);
        body
    }

    /// Account number: two-digit branch/product prefix, ten random digits, Luhn digit.
    pub fn account_number(&self, prefix: &str) -> String {
        numeric_with_luhn(prefix, 13)
    }

    /// 16-digit card number under the given BIN.
    pub fn card_number(&self, bin: &str) -> String {
        numeric_with_luhn(bin, 16)
    }
}

/// Run `insert` with freshly generated references until it stops colliding.
///
/// A collision is only ever learned from the insert itself; there is no
/// pre-check. After `limit` consecutive collisions the reference space is
/// treated as exhausted.
pub fn insert_with_fresh_reference<T, E>(
    limit: u32,
    prefix: &str,
    mut generate: impl FnMut() -> String,
    mut insert: impl FnMut(&str) -> Result<T, E>,
) -> Result<T, E>
where
    E: Collision + From<ReferenceError>,
{
    for _ in 0..limit.max(1) {
        let candidate = generate();
        match insert(&candidate) {
            Err(e) if e.is_collision() => continue,
            other => return other,
        }
    }
    Err(ReferenceError::Exhausted {
        prefix: prefix.to_string(),
        attempts: limit.max(1),
    }
    .into())
}

/// True when the last character of `reference` is its check character.
pub fn verify_reference(reference: &str) -> bool {
    let Some((idx, last)) = reference.char_indices().last() else {
        return false;
    };
    idx > 0 && check_char(&reference[..idx]) == last
}

fn check_char(body: &str) -> char {
    let sum: usize = body
        .bytes()
        .enumerate()
        .map(|(i, b)| (i + 1) * b as usize)
        .sum();
    ALPHABET[sum % ALPHABET.len()] as char
}

fn numeric_with_luhn(prefix: &str, total_len: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut digits: String = prefix.chars().filter(|c| c.is_ascii_digit()).collect();
    while digits.len() < total_len - 1 {
        digits.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }
    digits.truncate(total_len - 1);
    let check = luhn_check_digit(&digits);
    digits.push(check);
    digits
}

/// Luhn check digit for a string of ASCII digits.
pub fn luhn_check_digit(digits: &str) -> char {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 0 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    char::from(b'0' + ((10 - sum % 10) % 10) as u8)
}

pub fn luhn_valid(number: &str) -> bool {
    if number.len() < 2 || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let (body, check) = number.split_at(number.len() - 1);
    check.starts_with(luhn_check_digit(body))
}
