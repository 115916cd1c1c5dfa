//! Teller Core - Domain types
//!
//! Fixed-point money, currencies, FX rates, actor identity, the clock seam
//! and reference generation. Everything above this crate builds on these.

pub mod actor;
pub mod amount;
pub mod clock;
pub mod currency;
pub mod error;
pub mod rate;
pub mod reference;

pub use actor::Actor;
pub use amount::{Amount, AmountError, MAX_AMOUNT, MONEY_SCALE};
pub use clock::{Clock, ManualClock, SystemClock};
pub use currency::{Currency, CurrencyError};
pub use error::{DomainError, ErrorKind};
pub use rate::{CurrencyPair, FxRate, RateError, MAX_RATE, RATE_SCALE};
pub use reference::{
    insert_with_fresh_reference, luhn_check_digit, luhn_valid, verify_reference, Collision,
    ReferenceError, ReferenceGenerator, ReferencePrefix, DEFAULT_RETRY_LIMIT,
};
