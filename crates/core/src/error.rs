//! Error classification shared by every crate
//!
//! Each crate keeps its own `thiserror` enum. Callers that only need to
//! decide what to do next (retry, correct the input, give up) look at the
//! [`ErrorKind`] instead of matching on every crate's variants.

use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InsufficientFunds,
    AccountNotActive,
    IllegalTransition,
    AlreadyResolved,
    DuplicateReference,
    CardBlocked,
    LockTimeout,
    ReferenceExhausted,
    LimitExceeded,
    NotFound,
    InvalidAmount,
    CurrencyMismatch,
    InvalidPayload,
    Storage,
}

impl ErrorKind {
    /// Only lock timeouts may be retried verbatim.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::LockTimeout)
    }
}

/// An error that knows its [`ErrorKind`].
pub trait DomainError: std::error::Error + Send + Sync + 'static {
    fn kind(&self) -> ErrorKind;

    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        assert!(ErrorKind::LockTimeout.is_retryable());
        assert!(!ErrorKind::InsufficientFunds.is_retryable());
        assert!(!ErrorKind::Storage.is_retryable());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::InsufficientFunds.to_string(), "INSUFFICIENT_FUNDS");
        assert_eq!(ErrorKind::LockTimeout.as_ref(), "LOCK_TIMEOUT");
    }
}
