//! Ledger errors

use crate::account::AccountStatus;
use crate::entry::EntryKind;
use crate::fx::FxStatus;
use rust_decimal::Decimal;
use teller_core::{AmountError, Currency, DomainError, ErrorKind, RateError};
use teller_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Insufficient funds on {account}: balance {balance}, minimum {minimum}, debit {debit}")]
    InsufficientFunds {
        account: String,
        balance: Decimal,
        minimum: Decimal,
        debit: Decimal,
    },

    #[error("Account {account} is {status}, not ACTIVE")]
    AccountNotActive {
        account: String,
        status: AccountStatus,
    },

    #[error("Reference {reference} already used for {kind} on {account} with amount {existing}, not {requested}")]
    DuplicateReference {
        account: String,
        kind: EntryKind,
        reference: String,
        existing: Decimal,
        requested: Decimal,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{kind} amount has the wrong sign: {amount}")]
    SignMismatch { kind: EntryKind, amount: Decimal },

    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("FX deal {reference} is {status}; cannot move to {target}")]
    FxStatus {
        reference: String,
        status: FxStatus,
        target: FxStatus,
    },

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Rate(#[from] RateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError for LedgerError {
    fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::AccountNotActive { .. } => ErrorKind::AccountNotActive,
            LedgerError::DuplicateReference { .. } => ErrorKind::DuplicateReference,
            LedgerError::InvalidAmount(_)
            | LedgerError::SignMismatch { .. }
            | LedgerError::Amount(_)
            | LedgerError::Rate(_) => ErrorKind::InvalidAmount,
            LedgerError::CurrencyMismatch { .. } => ErrorKind::CurrencyMismatch,
            LedgerError::InvalidTransfer(_) => ErrorKind::InvalidPayload,
            LedgerError::FxStatus { .. } => ErrorKind::IllegalTransition,
            LedgerError::Store(e) => e.kind(),
        }
    }
}
