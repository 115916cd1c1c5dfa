//! Teller Risk - Limits and risk guard
//!
//! - Per-card POS/ATM daily limits keyed by business date
//! - PIN verification with a failed-attempt lockout
//! - Single-debit ceilings by customer risk rating

pub mod error;
pub mod guard;
pub mod limits;
pub mod pin;
pub mod rating;

pub use error::GuardError;
pub use guard::{GuardConfig, PinVerdict, RiskGuard};
pub use limits::{business_date, Channel, LimitCheck};
pub use pin::PinState;
pub use rating::{RiskCeilings, RiskRating};
