//! Currency - ISO 4217 currency codes
//!
//! The branches trade a handful of currencies over the counter; those get a
//! variant each. Anything else that looks like an ISO code is carried in `Other`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("Empty currency code")]
    EmptyCode,

    #[error("Currency code must be three ASCII letters: {0}")]
    InvalidFormat(String),
}

/// Currency code
///
/// ```
/// use teller_core::Currency;
///
/// let kes: Currency = "kes".parse().unwrap();
/// assert_eq!(kes, Currency::Kes);
/// assert_eq!(Currency::Usd.to_string(), "USD");
///
/// let chf: Currency = "CHF".parse().unwrap();
/// assert!(matches!(chf, Currency::Other(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Currency {
    /// Kenyan Shilling (settlement currency)
    Kes,
    Usd,
    Eur,
    Gbp,
    /// Ugandan Shilling
    Ugx,
    /// Tanzanian Shilling
    Tzs,
    /// South African Rand
    Zar,
    /// UAE Dirham
    Aed,
    Other(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::Kes => "KES",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Ugx => "UGX",
            Currency::Tzs => "TZS",
            Currency::Zar => "ZAR",
            Currency::Aed => "AED",
            Currency::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        if s.is_empty() {
            return Err(CurrencyError::EmptyCode);
        }
        if s.len() != 3 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyError::InvalidFormat(s));
        }

        Ok(match s.as_str() {
            "KES" => Currency::Kes,
            "USD" => Currency::Usd,
            "EUR" => Currency::Eur,
            "GBP" => Currency::Gbp,
            "UGX" => Currency::Ugx,
            "TZS" => Currency::Tzs,
            "ZAR" => Currency::Zar,
            "AED" => Currency::Aed,
            _ => Currency::Other(s),
        })
    }
}

impl TryFrom<String> for Currency {
    type Error = CurrencyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_currencies() {
        assert_eq!("KES".parse::<Currency>().unwrap(), Currency::Kes);
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(" gbp ".parse::<Currency>().unwrap(), Currency::Gbp);
    }

    #[test]
    fn test_parse_other_iso_code() {
        let chf: Currency = "chf".parse().unwrap();
        assert_eq!(chf, Currency::Other("CHF".to_string()));
        assert_eq!(chf.to_string(), "CHF");
    }

    #[test]
    fn test_invalid_codes() {
        assert!(matches!("".parse::<Currency>(), Err(CurrencyError::EmptyCode)));
        assert!(matches!(
            "USDT".parse::<Currency>(),
            Err(CurrencyError::InvalidFormat(_))
        ));
        assert!(matches!(
            "U$D".parse::<Currency>(),
            Err(CurrencyError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_serde_as_code() {
        let json = serde_json::to_string(&Currency::Eur).unwrap();
        assert_eq!(json, "\"EUR\"");
        let parsed: Currency = serde_json::from_str("\"zar\"").unwrap();
        assert_eq!(parsed, Currency::Zar);
    }
}
