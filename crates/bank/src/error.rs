//! Bank errors
//!
//! Wraps the error of whichever layer failed. [`BankError::kind`] gives the
//! shared classification, so callers rarely need to match on the layers.

use teller_approval::WorkflowError;
use teller_core::{AmountError, DomainError, ErrorKind};
use teller_ledger::LedgerError;
use teller_lifecycle::LifecycleError;
use teller_risk::GuardError;
use teller_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BankError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stale request: {0}")]
    Stale(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BankError {
    pub fn kind(&self) -> ErrorKind {
        DomainError::kind(self)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<serde_json::Error> for BankError {
    fn from(err: serde_json::Error) -> Self {
        BankError::InvalidRequest(err.to_string())
    }
}

impl DomainError for BankError {
    fn kind(&self) -> ErrorKind {
        match self {
            BankError::Ledger(e) => e.kind(),
            BankError::Lifecycle(e) => e.kind(),
            BankError::Guard(e) => e.kind(),
            BankError::Workflow(e) => e.kind(),
            BankError::Store(e) => e.kind(),
            BankError::Amount(_) => ErrorKind::InvalidAmount,
            BankError::InvalidRequest(_) | BankError::Stale(_) | BankError::Config(_) => {
                ErrorKind::InvalidPayload
            }
            BankError::Io(_) => ErrorKind::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through_layers() {
        let err: BankError = StoreError::LockTimeout {
            resource: "account:acc-1".to_string(),
            waited_ms: 5000,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::LockTimeout);
        assert!(err.is_retryable());

        let err: BankError = WorkflowError::Store(StoreError::not_found("approval request", "x")).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
    }
}
