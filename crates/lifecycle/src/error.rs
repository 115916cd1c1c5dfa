//! Lifecycle errors

use teller_core::{AmountError, DomainError, ErrorKind};
use teller_ledger::{AccountStatus, LedgerError};
use teller_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Illegal {entity} transition for {id}: {from} -> {to}")]
    IllegalTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Account {account} is {status}, not ACTIVE")]
    AccountNotActive {
        account: String,
        status: AccountStatus,
    },

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError for LifecycleError {
    fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            LifecycleError::AccountNotActive { .. } => ErrorKind::AccountNotActive,
            LifecycleError::Amount(_) => ErrorKind::InvalidAmount,
            LifecycleError::Ledger(e) => e.kind(),
            LifecycleError::Store(e) => e.kind(),
        }
    }
}
