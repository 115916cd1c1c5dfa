//! FX rates quoted to four decimal places

use crate::amount::Amount;
use crate::currency::Currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const RATE_SCALE: u32 = 4;

/// Largest quotable rate: ten digits, four of them decimals.
pub const MAX_RATE: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, RATE_SCALE);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    #[error("FX rate must be positive: {0}")]
    NotPositive(Decimal),

    #[error("FX rate has more than {RATE_SCALE} decimal places: {0}")]
    TooPrecise(Decimal),

    #[error("FX rate exceeds {MAX_RATE}: {0}")]
    TooLarge(Decimal),

    #[error("Currency pair must use two different currencies: {0}")]
    SameCurrency(Currency),

    #[error("FX rate is not a number: {0}")]
    Unparseable(String),
}

/// Units of quote currency per one unit of base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct FxRate(Decimal);

impl FxRate {
    pub fn new(value: Decimal) -> Result<Self, RateError> {
        if value <= Decimal::ZERO {
            return Err(RateError::NotPositive(value));
        }
        if value.normalize().scale() > RATE_SCALE {
            return Err(RateError::TooPrecise(value));
        }
        if value > MAX_RATE {
            return Err(RateError::TooLarge(value));
        }
        let mut value = value;
        value.rescale(RATE_SCALE);
        Ok(Self(value))
    }

    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Base amount to quote amount, rounded to the money scale.
    pub fn convert(&self, base_amount: Amount) -> Amount {
        Amount::round_from(base_amount.value() * self.0)
    }
}

impl fmt::Display for FxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FxRate {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|_| RateError::Unparseable(s.to_string()))?;
        Self::new(value)
    }
}

impl TryFrom<Decimal> for FxRate {
    type Error = RateError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FxRate> for Decimal {
    fn from(rate: FxRate) -> Self {
        rate.0
    }
}

/// A traded pair, e.g. USD/KES.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    pub base: Currency,
    pub quote: Currency,
}

impl CurrencyPair {
    pub fn new(base: Currency, quote: Currency) -> Result<Self, RateError> {
        if base == quote {
            return Err(RateError::SameCurrency(base));
        }
        Ok(Self { base, quote })
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rate_scale() {
        let rate = FxRate::new(dec!(129.5)).unwrap();
        assert_eq!(rate.to_string(), "129.5000");
        assert!(matches!(
            FxRate::new(dec!(129.12345)),
            Err(RateError::TooPrecise(_))
        ));
        assert!(matches!(FxRate::new(dec!(0)), Err(RateError::NotPositive(_))));
        assert_eq!(MAX_RATE, dec!(999999.9999));
        assert!(matches!(
            FxRate::new(dec!(1000000)),
            Err(RateError::TooLarge(_))
        ));
    }

    #[test]
    fn test_convert_rounds_to_cents() {
        let rate = FxRate::new(dec!(129.3456)).unwrap();
        let converted = rate.convert(Amount::new(dec!(100.01)).unwrap());
        // 100.01 * 129.3456 = 12935.853456
        assert_eq!(converted.value(), dec!(12935.85));
    }

    #[test]
    fn test_pair_rejects_same_currency() {
        assert!(CurrencyPair::new(Currency::Kes, Currency::Kes).is_err());
        let pair = CurrencyPair::new(Currency::Usd, Currency::Kes).unwrap();
        assert_eq!(pair.to_string(), "USD/KES");
    }
}
