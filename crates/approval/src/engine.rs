//! Workflow engine
//!
//! One state machine for every request kind: PENDING → APPROVED | REJECTED,
//! both terminal. Resolution and the handler's side effect share a single
//! transaction; a failing handler leaves the request PENDING.

use crate::error::WorkflowError;
use crate::handler::ApprovalHandler;
use crate::request::{ApprovalRequest, ApprovalStatus, Decision, RequestKind, SubjectRef};
use crate::store;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use teller_core::{Actor, Clock, ReferenceGenerator, ReferencePrefix};
use teller_events::{outbox, CoreEvent};
use teller_store::{issue_reference, Database};
use tracing::{info, warn};

/// Request counts by status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkflowStats {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

pub struct WorkflowEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    references: ReferenceGenerator,
    handlers: HashMap<RequestKind, Arc<dyn ApprovalHandler>>,
}

impl WorkflowEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, references: ReferenceGenerator) -> Self {
        Self {
            db,
            clock,
            references,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for its kind, replacing any earlier one.
    pub fn register(&mut self, handler: Arc<dyn ApprovalHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn with_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn has_handler(&self, kind: RequestKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    fn handler(&self, kind: RequestKind) -> Result<&Arc<dyn ApprovalHandler>, WorkflowError> {
        self.handlers.get(&kind).ok_or(WorkflowError::NoHandler(kind))
    }

    // === Create ===

    pub fn create(
        &self,
        subject: SubjectRef,
        kind: RequestKind,
        payload: serde_json::Value,
        actor: &Actor,
    ) -> Result<ApprovalRequest, WorkflowError> {
        self.db.write(|tx| self.create_in(tx, subject, kind, payload, actor))
    }

    /// Store a PENDING request on an open transaction.
    pub fn create_in(
        &self,
        conn: &Connection,
        subject: SubjectRef,
        kind: RequestKind,
        payload: serde_json::Value,
        actor: &Actor,
    ) -> Result<ApprovalRequest, WorkflowError> {
        let handler = self.handler(kind)?;
        handler
            .validate(conn, &subject, &payload)
            .map_err(|source| WorkflowError::Validation { kind, source })?;

        let request = ApprovalRequest {
            id: issue_reference(conn, &self.references, ReferencePrefix::Approval)?,
            kind,
            subject,
            payload,
            status: ApprovalStatus::Pending,
            requested_by: actor.id().to_string(),
            approved_by: None,
            reason: None,
            created_at: self.clock.now(),
            resolved_at: None,
        };
        store::insert_request(conn, &request)?;
        outbox::record(
            conn,
            &CoreEvent::ApprovalRequested {
                request_id: request.id.clone(),
                kind: request.kind.to_string(),
                subject_id: request.subject.id.clone(),
            },
            actor,
        )?;

        info!(id = %request.id, kind = %request.kind, subject = %request.subject, actor = %actor, "Approval requested");
        Ok(request)
    }

    // === Resolve ===

    /// Approve or reject a PENDING request.
    ///
    /// On approval the kind's handler runs in the same transaction as the
    /// status change. Any handler error rolls both back.
    pub fn resolve(
        &self,
        request_id: &str,
        decision: Decision,
        approver: &Actor,
    ) -> Result<ApprovalRequest, WorkflowError> {
        let request = self.get(request_id)?;
        if request.status.is_terminal() {
            return Err(WorkflowError::AlreadyResolved {
                id: request.id,
                status: request.status,
            });
        }
        let handler = self.handler(request.kind)?;

        let _guard = self.db.locks().acquire(handler.lock_keys(&request))?;
        let result = self.db.write(|tx| {
            // Re-read under the write lock; another resolver may have won.
            let current = store::get_request(tx, request_id)?;
            if current.status.is_terminal() {
                return Err(WorkflowError::AlreadyResolved {
                    id: current.id,
                    status: current.status,
                });
            }

            let side_effect = match &decision {
                Decision::Approve => handler.on_approved(tx, &current, approver),
                Decision::Reject { .. } => handler.on_rejected(tx, &current, approver),
            };
            side_effect.map_err(|source| WorkflowError::Handler {
                request_id: current.id.clone(),
                source,
            })?;

            let reason = match &decision {
                Decision::Approve => None,
                Decision::Reject { reason } => reason.as_deref(),
            };
            let resolved = store::mark_resolved(
                tx,
                &current.id,
                decision.status(),
                approver.id(),
                reason,
                self.clock.now(),
            )?
            .ok_or_else(|| WorkflowError::AlreadyResolved {
                id: current.id.clone(),
                status: current.status,
            })?;

            outbox::record(
                tx,
                &CoreEvent::ApprovalResolved {
                    request_id: resolved.id.clone(),
                    kind: resolved.kind.to_string(),
                    status: resolved.status.to_string(),
                    resolved_by: approver.id().to_string(),
                },
                approver,
            )?;
            Ok(resolved)
        });

        match &result {
            Ok(resolved) => {
                info!(id = %resolved.id, kind = %resolved.kind, status = %resolved.status, approver = %approver, "Approval resolved");
            }
            Err(e) => {
                warn!(id = %request_id, kind = %request.kind, error = %e, "Approval resolution failed");
            }
        }
        result
    }

    pub fn approve(&self, request_id: &str, approver: &Actor) -> Result<ApprovalRequest, WorkflowError> {
        self.resolve(request_id, Decision::Approve, approver)
    }

    pub fn reject(
        &self,
        request_id: &str,
        reason: Option<&str>,
        approver: &Actor,
    ) -> Result<ApprovalRequest, WorkflowError> {
        self.resolve(
            request_id,
            Decision::Reject {
                reason: reason.map(str::to_string),
            },
            approver,
        )
    }

    // === Reads ===

    pub fn get(&self, request_id: &str) -> Result<ApprovalRequest, WorkflowError> {
        Ok(self.db.read(|conn| store::get_request(conn, request_id))?)
    }

    pub fn list_pending(&self) -> Result<Vec<ApprovalRequest>, WorkflowError> {
        Ok(self
            .db
            .read(|conn| store::list_by_status(conn, ApprovalStatus::Pending))?)
    }

    pub fn list_for_subject(&self, subject: &SubjectRef) -> Result<Vec<ApprovalRequest>, WorkflowError> {
        Ok(self.db.read(|conn| store::list_for_subject(conn, subject))?)
    }

    pub fn stats(&self) -> Result<WorkflowStats, WorkflowError> {
        Ok(self.db.read(|conn| -> Result<_, teller_store::StoreError> {
            Ok(WorkflowStats {
                pending: store::count_by_status(conn, ApprovalStatus::Pending)?,
                approved: store::count_by_status(conn, ApprovalStatus::Approved)?,
                rejected: store::count_by_status(conn, ApprovalStatus::Rejected)?,
            })
        })?)
    }
}
