//! In-process lock table
//!
//! Serializes work on the same account or card across threads of one process.
//! Keys are always taken in ascending [`LockKey`] order, so two operations
//! touching overlapping key sets cannot deadlock. Every wait is bounded.

use crate::error::StoreError;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Customer(String),
    Account(String),
    Card(String),
}

impl LockKey {
    pub fn account(id: impl Into<String>) -> Self {
        LockKey::Account(id.into())
    }

    pub fn card(id: impl Into<String>) -> Self {
        LockKey::Card(id.into())
    }

    pub fn customer(id: impl Into<String>) -> Self {
        LockKey::Customer(id.into())
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Customer(id) => write!(f, "customer:{id}"),
            LockKey::Account(id) => write!(f, "account:{id}"),
            LockKey::Card(id) => write!(f, "card:{id}"),
        }
    }
}

pub struct LockTable {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire every key or none of them.
    pub fn acquire<I>(&self, keys: I) -> Result<LockGuard<'_>, StoreError>
    where
        I: IntoIterator<Item = LockKey>,
    {
        let mut wanted: Vec<LockKey> = keys.into_iter().collect();
        wanted.sort();
        wanted.dedup();

        let deadline = Instant::now() + self.timeout;
        let mut held = self.held.lock();
        let mut acquired: Vec<LockKey> = Vec::with_capacity(wanted.len());

        for key in wanted {
            while held.contains(&key) {
                if self.released.wait_until(&mut held, deadline).timed_out() && held.contains(&key) {
                    for k in &acquired {
                        held.remove(k);
                    }
                    drop(held);
                    self.released.notify_all();
                    warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "Lock wait timed out");
                    return Err(StoreError::LockTimeout {
                        resource: key.to_string(),
                        waited_ms: self.timeout.as_millis() as u64,
                    });
                }
            }
            held.insert(key.clone());
            acquired.push(key);
        }

        Ok(LockGuard {
            table: self,
            keys: acquired,
        })
    }

    fn release(&self, keys: &[LockKey]) {
        let mut held = self.held.lock();
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Releases its keys when dropped.
pub struct LockGuard<'a> {
    table: &'a LockTable,
    keys: Vec<LockKey>,
}

impl LockGuard<'_> {
    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.keys);
    }
}
