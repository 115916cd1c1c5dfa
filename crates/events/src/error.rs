//! Event bus errors

use teller_core::{DomainError, ErrorKind};
use teller_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Subscriber '{name}' failed: {reason}")]
    SubscriberFailed { name: String, reason: String },

    #[error("Outbox error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError for EventError {
    fn kind(&self) -> ErrorKind {
        match self {
            EventError::SubscriberFailed { .. } => ErrorKind::Storage,
            EventError::Store(e) => e.kind(),
        }
    }
}
