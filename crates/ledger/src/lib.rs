//! Teller Ledger - account balances and their entries
//!
//! - `account`: accounts, account types and their compare-and-swap updates
//! - `entry`: append-only ledger entries
//! - `engine`: `LedgerEngine`, the only path that moves a balance
//! - `charges`: service charge schedule
//! - `fx`: foreign-exchange deals and their settlement status

pub mod account;
pub mod charges;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fx;

pub use account::{
    Account, AccountCategory, AccountField, AccountStatus, AccountType, ModeOfOperation,
    NewAccount,
};
pub use charges::{ChargeBreakdown, Segment, Service};
pub use engine::{LedgerEngine, Posting, Reconciliation, TransferReceipt};
pub use entry::{EntryKind, LedgerEntry};
pub use error::LedgerError;
pub use fx::{FxDeal, FxKind, FxStatus, FxTransaction, Settlement};
