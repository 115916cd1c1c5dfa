//! SQLite storage for approval requests

use crate::request::{ApprovalRequest, ApprovalStatus, RequestKind, SubjectRef};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use teller_store::{codec, OptionalRow, StoreError};

const SELECT_REQUEST: &str = "SELECT id, kind, subject_type, subject_id, payload, status,
        requested_by, approved_by, reason, created_at, resolved_at
     FROM approval_requests";

fn map_request(row: &Row<'_>) -> rusqlite::Result<ApprovalRequest> {
    let payload: String = row.get(4)?;
    Ok(ApprovalRequest {
        id: row.get(0)?,
        kind: codec::parsed_col(row, 1)?,
        subject: SubjectRef {
            subject_type: codec::parsed_col(row, 2)?,
            id: row.get(3)?,
        },
        payload: serde_json::from_str(&payload).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        status: codec::parsed_col(row, 5)?,
        requested_by: row.get(6)?,
        approved_by: row.get(7)?,
        reason: row.get(8)?,
        created_at: codec::timestamp_col(row, 9)?,
        resolved_at: codec::opt_timestamp_col(row, 10)?,
    })
}

pub fn insert_request(conn: &Connection, request: &ApprovalRequest) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO approval_requests
         (id, kind, subject_type, subject_id, payload, status, requested_by, approved_by,
          reason, created_at, resolved_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8, NULL)",
        params![
            request.id,
            request.kind.as_ref(),
            request.subject.subject_type.as_ref(),
            request.subject.id,
            serde_json::to_string(&request.payload)?,
            ApprovalStatus::Pending.as_ref(),
            request.requested_by,
            codec::timestamp(request.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_request(conn: &Connection, id: &str) -> Result<ApprovalRequest, StoreError> {
    conn.query_row(&format!("{SELECT_REQUEST} WHERE id = ?1"), params![id], map_request)
        .or_not_found("approval request", id)
}

pub fn list_by_status(conn: &Connection, status: ApprovalStatus) -> Result<Vec<ApprovalRequest>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_REQUEST} WHERE status = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![status.as_ref()], map_request)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_for_subject(conn: &Connection, subject: &SubjectRef) -> Result<Vec<ApprovalRequest>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_REQUEST} WHERE subject_type = ?1 AND subject_id = ?2 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![subject.subject_type.as_ref(), subject.id], map_request)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Open requests of `kind` for `subject`.
pub fn pending_for(
    conn: &Connection,
    kind: RequestKind,
    subject: &SubjectRef,
) -> Result<Vec<ApprovalRequest>, StoreError> {
    Ok(list_for_subject(conn, subject)?
        .into_iter()
        .filter(|r| r.kind == kind && r.is_pending())
        .collect())
}

pub fn count_by_status(conn: &Connection, status: ApprovalStatus) -> Result<u64, StoreError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM approval_requests WHERE status = ?1",
        params![status.as_ref()],
        |row| row.get(0),
    )?)
}

/// Move a PENDING request to `status`. Returns `None` when the request was
/// no longer PENDING.
pub fn mark_resolved(
    conn: &Connection,
    id: &str,
    status: ApprovalStatus,
    approved_by: &str,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Result<Option<ApprovalRequest>, StoreError> {
    let updated = conn.execute(
        "UPDATE approval_requests
         SET status = ?1, approved_by = ?2, reason = ?3, resolved_at = ?4
         WHERE id = ?5 AND status = 'PENDING'",
        params![status.as_ref(), approved_by, reason, codec::timestamp(at), id],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    get_request(conn, id).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestKind;
    use serde_json::json;
    use teller_store::Database;

    fn request(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            id: id.to_string(),
            kind: RequestKind::KycUpdate,
            subject: SubjectRef::customer("cus-1"),
            payload: json!({"field": "phone", "old": "0700000000", "new": "0711111111"}),
            status: ApprovalStatus::Pending,
            requested_by: "teller-1".to_string(),
            approved_by: None,
            reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[test]
    fn test_insert_and_resolve() {
        let db = Database::in_memory().unwrap();
        let resolved = db
            .write(|tx| {
                insert_request(tx, &request("APR-1"))?;
                assert_eq!(count_by_status(tx, ApprovalStatus::Pending)?, 1);
                mark_resolved(tx, "APR-1", ApprovalStatus::Rejected, "supervisor", Some("no docs"), Utc::now())
            })
            .unwrap()
            .unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Rejected);
        assert_eq!(resolved.approved_by.as_deref(), Some("supervisor"));
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.payload["new"], "0711111111");
    }

    #[test]
    fn test_second_resolution_is_a_no_op() {
        let db = Database::in_memory().unwrap();
        let second = db
            .write(|tx| {
                insert_request(tx, &request("APR-1"))?;
                mark_resolved(tx, "APR-1", ApprovalStatus::Approved, "a", None, Utc::now())?;
                mark_resolved(tx, "APR-1", ApprovalStatus::Rejected, "b", None, Utc::now())
            })
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_resolved_rows_are_immutable() {
        let db = Database::in_memory().unwrap();
        db.write(|tx| {
            insert_request(tx, &request("APR-1"))?;
            mark_resolved(tx, "APR-1", ApprovalStatus::Approved, "a", None, Utc::now())?;
            Ok::<_, StoreError>(())
        })
        .unwrap();

        let update = db.write(|tx| {
            tx.execute("UPDATE approval_requests SET reason = 'edited' WHERE id = 'APR-1'", [])
                .map_err(StoreError::from)
        });
        assert!(update.unwrap_err().is_trigger_abort());

        let delete = db.write(|tx| {
            tx.execute("DELETE FROM approval_requests WHERE id = 'APR-1'", [])
                .map_err(StoreError::from)
        });
        assert!(delete.is_err());
    }

    #[test]
    fn test_resolution_fields_follow_status() {
        let db = Database::in_memory().unwrap();
        // PENDING with an approver violates the CHECK constraint
        let result = db.write(|tx| {
            insert_request(tx, &request("APR-1"))?;
            tx.execute("UPDATE approval_requests SET approved_by = 'x' WHERE id = 'APR-1'", [])
                .map_err(StoreError::from)
        });
        assert!(result.is_err());
    }
}
