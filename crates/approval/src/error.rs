//! Workflow errors

use crate::handler::HandlerError;
use crate::request::{ApprovalStatus, RequestKind};
use teller_core::{DomainError, ErrorKind};
use teller_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Approval request {id} is already {status}")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error("No handler registered for {0}")]
    NoHandler(RequestKind),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{kind} payload refused: {source}")]
    Validation {
        kind: RequestKind,
        #[source]
        source: HandlerError,
    },

    #[error("Handler for {request_id} failed: {source}")]
    Handler {
        request_id: String,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::InvalidPayload(err.to_string())
    }
}

impl DomainError for WorkflowError {
    fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::AlreadyResolved { .. } => ErrorKind::AlreadyResolved,
            WorkflowError::NoHandler(_) | WorkflowError::InvalidPayload(_) => ErrorKind::InvalidPayload,
            WorkflowError::Validation { source, .. } | WorkflowError::Handler { source, .. } => {
                source.kind()
            }
            WorkflowError::Store(e) => e.kind(),
        }
    }
}
