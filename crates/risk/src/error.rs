//! Guard errors

use rust_decimal::Decimal;
use teller_core::{DomainError, ErrorKind};
use teller_lifecycle::{CardStatus, LifecycleError};
use teller_store::StoreError;
use thiserror::Error;

use crate::limits::Channel;
use crate::rating::RiskRating;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("{channel} daily limit exceeded for card {card_id}: limit {limit}, used {used}, requested {requested}")]
    LimitExceeded {
        card_id: String,
        channel: Channel,
        limit: Decimal,
        used: Decimal,
        requested: Decimal,
    },

    #[error("Debit of {amount} on {account} exceeds the {rating} risk ceiling of {ceiling}")]
    CeilingExceeded {
        account: String,
        rating: RiskRating,
        ceiling: Decimal,
        amount: Decimal,
    },

    #[error("Card {card_id} is blocked")]
    CardBlocked { card_id: String },

    #[error("Card {card_id} is {status}, not ACTIVE")]
    CardNotActive { card_id: String, status: CardStatus },

    #[error("No PIN set for card {card_id}")]
    PinNotSet { card_id: String },

    #[error("Invalid PIN format: {0}")]
    InvalidPin(String),

    #[error("PIN hashing failed: {0}")]
    PinHash(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError for GuardError {
    fn kind(&self) -> ErrorKind {
        match self {
            GuardError::LimitExceeded { .. } | GuardError::CeilingExceeded { .. } => {
                ErrorKind::LimitExceeded
            }
            GuardError::CardBlocked { .. } => ErrorKind::CardBlocked,
            GuardError::CardNotActive { .. } => ErrorKind::IllegalTransition,
            GuardError::PinNotSet { .. } => ErrorKind::NotFound,
            GuardError::InvalidPin(_) => ErrorKind::InvalidPayload,
            GuardError::PinHash(_) => ErrorKind::Storage,
            GuardError::Lifecycle(e) => e.kind(),
            GuardError::Store(e) => e.kind(),
        }
    }
}
