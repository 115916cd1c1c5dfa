//! Amount - Non-negative monetary value with at most two decimal places
//!
//! Every amount accepted at the boundary of the core (deposits, limits, FX
//! source amounts) goes through this type. Signed values only exist inside
//! ledger entries, where the sign is derived from the entry kind.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decimal places carried by every stored monetary value.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount or balance a 15-digit money column holds: 9,999,999,999,999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_319, 232_830, 0, false, MONEY_SCALE);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    Negative(Decimal),

    #[error("Amount has more than {MONEY_SCALE} decimal places: {0}")]
    TooPrecise(Decimal),

    #[error("Amount exceeds {MAX_AMOUNT}: {0}")]
    TooLarge(Decimal),

    #[error("Amount is not a number: {0}")]
    Unparseable(String),
}

/// A non-negative amount with at most [`MONEY_SCALE`] decimal places, no
/// larger than [`MAX_AMOUNT`].
///
/// ```
/// use teller_core::Amount;
/// use rust_decimal::Decimal;
///
/// let amount = Amount::new(Decimal::new(10050, 2)).unwrap();
/// assert_eq!(amount.to_string(), "100.50");
///
/// assert!(Amount::new(Decimal::new(-1, 0)).is_err());
/// assert!(Amount::new(Decimal::new(1, 3)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Validate and wrap a decimal. Trailing zeros do not count against the scale.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }
        if value.normalize().scale() > MONEY_SCALE {
            return Err(AmountError::TooPrecise(value));
        }
        if value > MAX_AMOUNT {
            return Err(AmountError::TooLarge(value));
        }
        let mut value = value;
        value.rescale(MONEY_SCALE);
        Ok(Self(value))
    }

    /// Round a computed value (fees, FX conversions) half away from zero to
    /// the money scale. Negative inputs clamp to zero.
    pub fn round_from(value: Decimal) -> Self {
        let mut rounded = value
            .round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
            .max(Decimal::ZERO);
        rounded.rescale(MONEY_SCALE);
        Self(rounded)
    }

    /// Whole units, e.g. `Amount::units(500)` is 500.00.
    pub fn units(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The amount as a debit (negative) ledger movement.
    #[inline]
    pub fn as_debit(&self) -> Decimal {
        -self.0
    }

    /// The amount as a credit (positive) ledger movement.
    #[inline]
    pub fn as_credit(&self) -> Decimal {
        self.0
    }

    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Returns None if the result would be negative
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Amount(result))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| AmountError::Unparseable(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_rescaled_to_two_places() {
        let amount = Amount::new(dec!(100)).unwrap();
        assert_eq!(amount.to_string(), "100.00");
        assert_eq!(amount.value(), dec!(100));
    }

    #[test]
    fn test_trailing_zeros_are_not_precision() {
        assert!(Amount::new(dec!(10.500)).is_ok());
        assert!(matches!(
            Amount::new(dec!(10.505)),
            Err(AmountError::TooPrecise(_))
        ));
    }

    #[test]
    fn test_capped_at_fifteen_digits() {
        assert_eq!(MAX_AMOUNT, dec!(9999999999999.99));
        assert!(Amount::new(dec!(9999999999999.99)).is_ok());
        assert!(matches!(
            Amount::new(dec!(10000000000000)),
            Err(AmountError::TooLarge(_))
        ));
        assert!(matches!(
            Amount::new(Decimal::from(u64::MAX)),
            Err(AmountError::TooLarge(_))
        ));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(matches!(
            Amount::new(dec!(-0.01)),
            Err(AmountError::Negative(_))
        ));
    }

    #[test]
    fn test_round_from_half_away_from_zero() {
        assert_eq!(Amount::round_from(dec!(12.345)).value(), dec!(12.35));
        assert_eq!(Amount::round_from(dec!(12.344)).value(), dec!(12.34));
        assert_eq!(Amount::round_from(dec!(-3)), Amount::ZERO);
    }

    #[test]
    fn test_debit_credit_sign() {
        let amount = Amount::units(500).unwrap();
        assert_eq!(amount.as_debit(), dec!(-500));
        assert_eq!(amount.as_credit(), dec!(500));
    }

    #[test]
    fn test_checked_sub_prevents_negative() {
        let a = Amount::units(50).unwrap();
        let b = Amount::units(100).unwrap();
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(b.checked_sub(&a).unwrap().value(), dec!(50));
    }

    #[test]
    fn test_parse() {
        let amount: Amount = " 1500.5 ".parse().unwrap();
        assert_eq!(amount.value(), dec!(1500.50));
        assert!("abc".parse::<Amount>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let amount = Amount::new(dec!(123.45)).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"123.45\"");
        let parsed: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, amount);
    }
}
