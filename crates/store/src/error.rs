//! Storage errors

use rusqlite::ErrorCode;
use teller_core::{Collision, DomainError, ErrorKind, ReferenceError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Timed out after {waited_ms}ms waiting for {resource}")]
    LockTimeout { resource: String, waited_ms: u64 },

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// A unique or primary-key index rejected the write.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == ErrorCode::ConstraintViolation
                    && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            }
            _ => false,
        }
    }

    /// A trigger aborted the write (immutable rows).
    pub fn is_trigger_abort(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER
            }
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::LockTimeout {
                    resource: "sqlite database".to_string(),
                    waited_ms: 0,
                }
            }
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("row", "query"),
            _ => StoreError::Database(err),
        }
    }
}

impl Collision for StoreError {
    fn is_collision(&self) -> bool {
        self.is_unique_violation()
    }
}

impl DomainError for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::LockTimeout { .. } => ErrorKind::LockTimeout,
            StoreError::Reference(_) => ErrorKind::ReferenceExhausted,
            StoreError::Database(_) | StoreError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

/// Map "no rows" to a typed not-found for a specific entity.
pub trait OptionalRow<T> {
    fn or_not_found(self, entity: &'static str, id: &str) -> Result<T, StoreError>;
}

impl<T> OptionalRow<T> for Result<T, rusqlite::Error> {
    fn or_not_found(self, entity: &'static str, id: &str) -> Result<T, StoreError> {
        self.map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found(entity, id),
            other => StoreError::from(other),
        })
    }
}
