//! Shared fixture for the bank integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use teller_bank::{Bank, BankConfig, Customer, NewCustomer};
use teller_core::{Actor, Amount, Clock, Currency, ManualClock};
use teller_ledger::account::AccountType;
use teller_ledger::{Account, AccountCategory, ModeOfOperation, NewAccount, Segment};
use teller_lifecycle::{Card, CardLimits, CardType, NewCard};
use teller_risk::RiskRating;
use teller_store::Database;
use tempfile::TempDir;

pub struct Fixture {
    pub bank: Bank,
    pub clock: Arc<ManualClock>,
    pub teller: Actor,
    pub supervisor: Actor,
    _dir: TempDir,
}

pub fn fixture() -> Fixture {
    fixture_with(BankConfig::default())
}

/// On-disk bank in a temp dir, clock at 2026-03-01 09:00 UTC.
pub fn fixture_with(config: BankConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("teller.db"), &config.store_config()).unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()));
    let bank = Bank::new(db, config, clock.clone() as Arc<dyn Clock>).unwrap();

    for (code, min) in [("SAV", 0), ("CUR", 1_000), ("PRM", 50_000)] {
        bank.define_account_type(&AccountType {
            code: code.to_string(),
            name: code.to_string(),
            minimum_balance: Decimal::from(min),
        })
        .unwrap();
    }

    Fixture {
        bank,
        clock,
        teller: Actor::new("teller-01"),
        supervisor: Actor::new("supervisor-01"),
        _dir: dir,
    }
}

pub fn amount(units: i64) -> Amount {
    Amount::units(units).unwrap()
}

impl Fixture {
    pub fn customer(&self, national_id: &str, rating: RiskRating) -> Customer {
        self.bank
            .register_customer(
                &NewCustomer {
                    branch_code: "001".to_string(),
                    national_id: national_id.to_string(),
                    first_name: "Wanjiru".to_string(),
                    last_name: "Kamau".to_string(),
                    email: Some(format!("{national_id}@example.com")),
                    phone: Some("0711000222".to_string()),
                    address: Some("Moi Avenue, Nairobi".to_string()),
                    occupation: Some("Trader".to_string()),
                    segment: Segment::Retail,
                    risk_rating: rating,
                    is_pep: false,
                },
                &self.teller,
            )
            .unwrap()
    }

    /// Open, approve and activate an account.
    pub fn active_account(&self, customer_id: &str, account_type: &str, currency: Currency) -> Account {
        let account = self
            .bank
            .open_account(
                &NewAccount {
                    customer_id: customer_id.to_string(),
                    account_type: account_type.to_string(),
                    currency,
                    category: AccountCategory::Individual,
                    mode_of_operation: ModeOfOperation::Singly,
                    signatory: None,
                },
                &self.teller,
            )
            .unwrap();
        self.bank.approve_account(&account.id, &self.supervisor).unwrap();
        self.bank.activate_account(&account.id, &self.supervisor).unwrap()
    }

    /// A LOW-risk customer with an active KES savings account holding `balance`.
    pub fn funded_account(&self, national_id: &str, balance: i64) -> Account {
        let customer = self.customer(national_id, RiskRating::Low);
        let account = self.active_account(&customer.id, "SAV", Currency::Kes);
        if balance > 0 {
            self.bank
                .deposit(&account.id, amount(balance), None, &self.teller)
                .unwrap();
        }
        self.bank.account(&account.id).unwrap()
    }

    /// An ACTIVE debit card with POS 10,000 / ATM 5,000 and PIN 1234.
    pub fn active_card(&self, account_id: &str) -> Card {
        let card = self
            .bank
            .issue_card(
                &NewCard {
                    account_id: account_id.to_string(),
                    card_type: CardType::Debit,
                    limits: CardLimits {
                        pos_daily: amount(10_000),
                        atm_daily: amount(5_000),
                    },
                    replaces_card_id: None,
                },
                &self.teller,
            )
            .unwrap();
        self.bank.set_pin(&card.id, "1234", &self.teller).unwrap();
        self.bank.activate_card(&card.id, &self.teller).unwrap()
    }
}
