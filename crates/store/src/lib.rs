//! Teller Store - SQLite persistence
//!
//! - `Database`: connection handle with bounded waits and IMMEDIATE write transactions
//! - `LockTable`: ordered per-account / per-card locks
//! - `schema`: every table, index and immutability trigger
//! - `codec`: TEXT decimals and RFC 3339 timestamps

pub mod codec;
pub mod database;
pub mod error;
pub mod locks;
pub mod references;
pub mod schema;

pub use database::{Database, StoreConfig};
pub use error::{OptionalRow, StoreError};
pub use locks::{LockGuard, LockKey, LockTable};
pub use references::issue_reference;
