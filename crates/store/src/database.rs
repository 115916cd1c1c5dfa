//! SQLite database handle
//!
//! One connection behind a `parking_lot` mutex. Writers run inside an
//! IMMEDIATE transaction so the write lock is taken before any read that
//! feeds a decision. Acquisition is bounded at both levels: the mutex wait
//! and SQLite's busy timeout.

use crate::error::StoreError;
use crate::locks::LockTable;
use crate::references::issue_reference;
use crate::schema;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use teller_core::{ReferenceGenerator, ReferencePrefix};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Bound on waiting for the connection and for lock-table keys
    pub lock_timeout: Duration,
    /// SQLite busy timeout for cross-process contention
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Database {
    conn: Mutex<Connection>,
    locks: LockTable,
    lock_timeout: Duration,
}

impl Database {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Opening database");
        Self::init(conn, config)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::in_memory_with(&StoreConfig::default())
    }

    pub fn in_memory_with(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, config)
    }

    fn init(conn: Connection, config: &StoreConfig) -> Result<Self, StoreError> {
        conn.busy_timeout(config.busy_timeout)?;
        // In-memory databases answer "memory" here; that is fine.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            locks: LockTable::new(config.lock_timeout),
            lock_timeout: config.lock_timeout,
        })
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .try_lock_for(self.lock_timeout)
            .ok_or_else(|| StoreError::LockTimeout {
                resource: "database connection".to_string(),
                waited_ms: self.lock_timeout.as_millis() as u64,
            })
    }

    /// Run `f` against the connection without opening a transaction.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.connection()?;
        f(&*conn)
    }

    /// Run `f` inside an IMMEDIATE transaction.
    ///
    /// `Ok` commits. `Err` drops the transaction, which rolls back every
    /// statement `f` executed.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }

    /// Issue a globally unique reference in its own transaction.
    pub fn issue_reference(
        &self,
        generator: &ReferenceGenerator,
        prefix: ReferencePrefix,
    ) -> Result<String, StoreError> {
        self.write(|tx| issue_reference(tx, generator, prefix))
    }
}
