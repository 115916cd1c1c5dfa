//! Side-effect handlers
//!
//! A handler owns one [`RequestKind`]. The workflow engine calls it inside
//! the transaction that resolves the request, after taking the lock keys the
//! handler declares.

use crate::request::{ApprovalRequest, RequestKind, SubjectRef};
use rusqlite::Connection;
use std::error::Error;
use std::fmt;
use teller_core::{Actor, DomainError, ErrorKind};
use teller_store::LockKey;

/// Any crate's error, boxed with its classification intact.
#[derive(Debug)]
pub struct HandlerError(Box<dyn DomainError>);

impl HandlerError {
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    pub fn inner(&self) -> &dyn DomainError {
        self.0.as_ref()
    }
}

impl<E: DomainError> From<E> for HandlerError {
    fn from(err: E) -> Self {
        HandlerError(Box::new(err))
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

pub trait ApprovalHandler: Send + Sync {
    fn kind(&self) -> RequestKind;

    /// Check a payload before the request is stored.
    fn validate(
        &self,
        _conn: &Connection,
        _subject: &SubjectRef,
        _payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Keys `on_approved` / `on_rejected` will touch.
    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey>;

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError>;

    fn on_rejected(
        &self,
        _conn: &Connection,
        _request: &ApprovalRequest,
        _approver: &Actor,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}
