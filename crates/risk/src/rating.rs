//! Customer risk ratings and their single-debit ceilings

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskRating {
    #[default]
    Low,
    Medium,
    High,
}

/// Largest single debit allowed per rating. `None` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCeilings {
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default = "default_medium")]
    pub medium: Option<Decimal>,
    #[serde(default = "default_high")]
    pub high: Option<Decimal>,
}

fn default_medium() -> Option<Decimal> {
    Some(Decimal::new(1_000_000, 0))
}

fn default_high() -> Option<Decimal> {
    Some(Decimal::new(100_000, 0))
}

impl Default for RiskCeilings {
    fn default() -> Self {
        Self {
            low: None,
            medium: default_medium(),
            high: default_high(),
        }
    }
}

impl RiskCeilings {
    pub fn ceiling(&self, rating: RiskRating) -> Option<Decimal> {
        match rating {
            RiskRating::Low => self.low,
            RiskRating::Medium => self.medium,
            RiskRating::High => self.high,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_ceilings() {
        let ceilings = RiskCeilings::default();
        assert_eq!(ceilings.ceiling(RiskRating::Low), None);
        assert_eq!(ceilings.ceiling(RiskRating::Medium), Some(dec!(1000000)));
        assert_eq!(ceilings.ceiling(RiskRating::High), Some(dec!(100000)));
    }

    #[test]
    fn test_rating_parse() {
        assert_eq!("HIGH".parse::<RiskRating>().unwrap(), RiskRating::High);
        assert_eq!(RiskRating::Medium.to_string(), "MEDIUM");
    }
}
