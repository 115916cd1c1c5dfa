//! Service charges
//!
//! Fee schedule per service and customer segment. The charged amount is the
//! larger of the flat fee and the percentage fee (clamped to its min/max
//! when those are set). Excise duty is 20% of the fee and VAT 16% of fee plus
//! duty, both rounded to whole units.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};
use teller_core::Amount;

/// 16%
pub const VAT_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2);
/// 20%
pub const EXCISE_DUTY_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Service {
    CashDeposit,
    CashWithdrawal,
    FundsTransfer,
    BillPayment,
    StandingOrder,
    FxPurchase,
    FxSale,
    FxTransfer,
    CardIssuance,
    CardReplacement,
    PinManagement,
    CardLimit,
    ChequeBook,
    StatementRequest,
    DenominationExchange,
    AccountOpening,
    KycUpdate,
    AccountModification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Segment {
    HighValue,
    Sme,
    Retail,
    YoungProfessional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeStructure {
    pub service_fee: Decimal,
    pub percentage_fee: Decimal,
    pub min_charge: Decimal,
    pub max_charge: Decimal,
}

impl ChargeStructure {
    /// Whole-unit flat fee, percentage in thousandths.
    const fn new(service_fee: i64, per_mille: i64, min_charge: i64, max_charge: i64) -> Self {
        Self {
            service_fee: Decimal::from_parts(service_fee as u32, 0, 0, false, 0),
            percentage_fee: Decimal::from_parts(per_mille as u32, 0, 0, false, 3),
            min_charge: Decimal::from_parts(min_charge as u32, 0, 0, false, 0),
            max_charge: Decimal::from_parts(max_charge as u32, 0, 0, false, 0),
        }
    }

    const fn flat(service_fee: i64) -> Self {
        Self::new(service_fee, 0, 0, 0)
    }
}

/// Charge for services outside the schedule
pub const DEFAULT_CHARGE: ChargeStructure = ChargeStructure::flat(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub service_fee: Amount,
    pub excise_duty: Amount,
    pub vat: Amount,
    pub total: Amount,
}

impl ChargeBreakdown {
    pub fn is_free(&self) -> bool {
        self.total.is_zero()
    }
}

pub fn structure(service: Service, segment: Segment) -> ChargeStructure {
    use Segment::*;
    use Service::*;

    let row = |hv, sme, retail, yp| match segment {
        HighValue => hv,
        Sme => sme,
        Retail => retail,
        YoungProfessional => yp,
    };
    let s = ChargeStructure::new;
    let f = ChargeStructure::flat;

    match service {
        CashDeposit => row(f(0), f(50), f(100), f(50)),
        CashWithdrawal => row(
            s(0, 1, 0, 500),
            s(100, 2, 100, 2000),
            s(100, 3, 100, 3000),
            s(50, 2, 50, 1500),
        ),
        FundsTransfer => row(
            s(0, 1, 0, 1000),
            s(50, 3, 50, 5000),
            s(50, 5, 50, 5000),
            s(30, 3, 30, 3000),
        ),
        BillPayment => row(f(0), f(50), f(50), f(30)),
        StandingOrder => row(f(0), f(100), f(150), f(75)),
        FxPurchase | FxSale => row(
            s(0, 2, 0, 5000),
            s(200, 5, 200, 10000),
            s(200, 8, 200, 10000),
            s(100, 5, 100, 5000),
        ),
        FxTransfer => row(
            s(500, 3, 500, 15000),
            s(1000, 5, 1000, 25000),
            s(1500, 8, 1500, 25000),
            s(750, 5, 750, 15000),
        ),
        CardIssuance => row(f(0), f(500), f(500), f(250)),
        CardReplacement => row(f(0), f(500), f(1000), f(500)),
        PinManagement => row(f(0), f(0), f(100), f(0)),
        CardLimit | KycUpdate => row(f(0), f(0), f(0), f(0)),
        ChequeBook => row(f(0), f(500), f(750), f(500)),
        StatementRequest => row(f(0), f(100), f(200), f(100)),
        DenominationExchange => row(f(0), f(50), f(100), f(50)),
        AccountOpening => row(f(0), f(500), f(250), f(0)),
        AccountModification => row(f(0), f(200), f(200), f(100)),
    }
}

fn whole_units(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

pub fn compute(structure: &ChargeStructure, transaction_amount: Option<Amount>) -> ChargeBreakdown {
    let mut fee = structure.service_fee;

    if let Some(amount) = transaction_amount.filter(|a| !a.is_zero()) {
        if structure.percentage_fee > Decimal::ZERO {
            let mut percent_fee = amount.value() * structure.percentage_fee;
            if structure.min_charge > Decimal::ZERO {
                percent_fee = percent_fee.max(structure.min_charge);
            }
            if structure.max_charge > Decimal::ZERO {
                percent_fee = percent_fee.min(structure.max_charge);
            }
            fee = fee.max(percent_fee);
        }
    }

    let service_fee = Amount::round_from(fee);
    let excise_duty = Amount::round_from(whole_units(service_fee.value() * EXCISE_DUTY_RATE));
    let vat = Amount::round_from(whole_units(
        (service_fee.value() + excise_duty.value()) * VAT_RATE,
    ));
    let total = Amount::round_from(service_fee.value() + excise_duty.value() + vat.value());

    ChargeBreakdown {
        service_fee,
        excise_duty,
        vat,
        total,
    }
}

/// Charges for a scheduled service.
pub fn charges_for(service: Service, segment: Segment, amount: Option<Amount>) -> ChargeBreakdown {
    compute(&structure(service, segment), amount)
}

/// Charges for a service named on the wire; unknown names get [`DEFAULT_CHARGE`].
pub fn charges_for_name(service: &str, segment: Segment, amount: Option<Amount>) -> ChargeBreakdown {
    match Service::from_str(service) {
        Ok(service) => charges_for(service, segment, amount),
        Err(_) => compute(&DEFAULT_CHARGE, amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn amount(v: Decimal) -> Option<Amount> {
        Some(Amount::new(v).unwrap())
    }

    #[test]
    fn test_flat_fee_with_duty_and_vat() {
        // retail cash deposit: 100 + 20 excise + round(120 * 0.16 = 19.2) = 19
        let c = charges_for(Service::CashDeposit, Segment::Retail, None);
        assert_eq!(c.service_fee.value(), dec!(100));
        assert_eq!(c.excise_duty.value(), dec!(20));
        assert_eq!(c.vat.value(), dec!(19));
        assert_eq!(c.total.value(), dec!(139));
    }

    #[test]
    fn test_percentage_fee_clamped_to_max() {
        // retail fx-transfer: 0.8% of 5,000,000 = 40,000, capped at 25,000
        let c = charges_for(Service::FxTransfer, Segment::Retail, amount(dec!(5000000)));
        assert_eq!(c.service_fee.value(), dec!(25000));
        assert_eq!(c.excise_duty.value(), dec!(5000));
        assert_eq!(c.vat.value(), dec!(4800));
        assert_eq!(c.total.value(), dec!(34800));
    }

    #[test]
    fn test_percentage_fee_floored_at_min() {
        // sme withdrawal of 1,000: 0.2% = 2, min 100, flat 100
        let c = charges_for(Service::CashWithdrawal, Segment::Sme, amount(dec!(1000)));
        assert_eq!(c.service_fee.value(), dec!(100));
    }

    #[test]
    fn test_percentage_beats_flat_fee() {
        // retail funds transfer of 100,000: 0.5% = 500 > 50
        let c = charges_for(Service::FundsTransfer, Segment::Retail, amount(dec!(100000)));
        assert_eq!(c.service_fee.value(), dec!(500));
        assert_eq!(c.excise_duty.value(), dec!(100));
        assert_eq!(c.vat.value(), dec!(96));
    }

    #[test]
    fn test_high_value_waived() {
        let c = charges_for(Service::CardReplacement, Segment::HighValue, None);
        assert!(c.is_free());
    }

    #[test]
    fn test_unknown_service_gets_default() {
        let c = charges_for_name("safe-deposit-box", Segment::HighValue, None);
        assert_eq!(c.service_fee.value(), dec!(100));
        assert_eq!(c.total.value(), dec!(139));

        let known = charges_for_name("cash-deposit", Segment::HighValue, None);
        assert!(known.is_free());
    }
}
