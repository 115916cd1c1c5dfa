//! Teller Approval - Generic request/approval workflow
//!
//! KYC updates, account modifications, FX validations and card actions all
//! share the same PENDING → APPROVED | REJECTED machine. What approval does
//! is up to the [`ApprovalHandler`] registered for the request kind.

pub mod engine;
pub mod error;
pub mod handler;
pub mod request;
pub mod store;

pub use engine::{WorkflowEngine, WorkflowStats};
pub use error::WorkflowError;
pub use handler::{ApprovalHandler, HandlerError};
pub use request::{ApprovalRequest, ApprovalStatus, Decision, RequestKind, SubjectRef, SubjectType};
