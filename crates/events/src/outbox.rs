//! Transactional outbox
//!
//! Events are appended with the same connection (and so the same
//! transaction) as the change they describe. A rolled-back change leaves no
//! event behind.

use crate::event::{CoreEvent, EventRecord};
use chrono::Utc;
use teller_core::Actor;
use rusqlite::{params, Connection};
use teller_store::{codec, StoreError};

/// Append `event` and return its sequence number.
pub fn record(conn: &Connection, event: &CoreEvent, actor: &Actor) -> Result<i64, StoreError> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO events (kind, subject_id, payload, actor, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.kind(),
            event.subject_id(),
            payload,
            actor.id(),
            codec::timestamp(Utc::now()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Events with `seq > after`, oldest first, at most `limit`.
pub fn events_since(
    conn: &Connection,
    after: i64,
    limit: usize,
) -> Result<Vec<EventRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT seq, payload, actor, created_at FROM events
         WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![after, limit as i64], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            codec::timestamp_col(row, 3)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (seq, payload, actor, created_at) = row?;
        records.push(EventRecord {
            seq,
            event: serde_json::from_str(&payload)?,
            actor,
            created_at,
        });
    }
    Ok(records)
}

/// Highest sequence written so far, 0 when empty.
pub fn latest_seq(conn: &Connection) -> Result<i64, StoreError> {
    let seq: Option<i64> = conn.query_row("SELECT MAX(seq) FROM events", [], |row| row.get(0))?;
    Ok(seq.unwrap_or(0))
}
