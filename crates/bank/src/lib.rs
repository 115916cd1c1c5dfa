//! Teller Bank - the facade over every engine
//!
//! - `Bank`: customers, accounts, cash, cards, payments, FX and approvals in one place
//! - `handlers`: side effects of the eight approval request kinds
//! - `payments`: billers, bill payments, external transfers, standing orders
//! - `customer`: customers, KYC document slots, next of kin, joint holders
//! - `config`: `BankConfig`, loaded from JSON with a default for every field

pub mod bank;
pub mod config;
pub mod customer;
pub mod error;
pub mod handlers;
pub mod payments;

pub use bank::{Bank, DEFAULT_EVENT_PAGE};
pub use config::{BankConfig, LedgerConfig, StorageConfig, WorkflowConfig};
pub use customer::{
    AmlStatus, Customer, JointHolder, KycDocument, KycField, KycSlot, NewCustomer, NextOfKin,
};
pub use error::BankError;
pub use handlers::{
    AccountModification, CardReplacement, ChequeBookOrder, FxValidation, KycChange, LimitChange,
    PinAction, StatementFormat, StatementOrder, StatementType,
};
pub use payments::{
    Beneficiary, BillPayment, Biller, BillerCategory, Frequency, FundsTransfer, NewBiller,
    NewStandingOrder, Payee, StandingOrder, StandingOrderRun,
};
