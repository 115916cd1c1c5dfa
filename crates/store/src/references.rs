//! Globally unique transaction references

use crate::codec;
use crate::error::StoreError;
use rusqlite::{params, Connection};
use teller_core::{insert_with_fresh_reference, ReferenceGenerator, ReferencePrefix};
use tracing::debug;

/// Generate a reference and claim it in `issued_references`.
///
/// The primary key on that table is the only uniqueness check. A collision
/// regenerates, up to the generator's retry limit.
pub fn issue_reference(
    conn: &Connection,
    generator: &ReferenceGenerator,
    prefix: ReferencePrefix,
) -> Result<String, StoreError> {
    insert_with_fresh_reference(
        generator.retry_limit(),
        prefix.as_ref(),
        || generator.generate(prefix),
        |candidate| {
            conn.execute(
                "INSERT INTO issued_references (reference, issued_at) VALUES (?1, ?2)",
                params![candidate, codec::timestamp(generator.clock().now())],
            )
            .map_err(StoreError::from)?;
            debug!(reference = candidate, "Issued reference");
            Ok(candidate.to_string())
        },
    )
}
