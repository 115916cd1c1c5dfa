//! Bank configuration
//!
//! Every value has a default, so an empty JSON object is a valid config and
//! a file only needs the settings it changes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use teller_core::{Currency, DEFAULT_RETRY_LIMIT};
use teller_lifecycle::DEFAULT_CARD_BIN;
use teller_risk::GuardConfig;
use teller_store::StoreConfig;

use crate::error::BankError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankConfig {
    /// Currency of the bank's own books
    #[serde(default = "default_base_currency")]
    pub base_currency: Currency,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Broadcast buffer for in-process subscribers
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Collisions tolerated before a reference is reported exhausted
    #[serde(default = "default_reference_retry_limit")]
    pub reference_retry_limit: u32,

    /// Leading digits of generated account numbers
    #[serde(default = "default_account_number_prefix")]
    pub account_number_prefix: String,

    #[serde(default = "default_card_bin")]
    pub card_bin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// FX deals with a source amount at or above this go through FX_VALIDATION
    #[serde(default = "default_fx_validation_threshold")]
    pub fx_validation_threshold: Decimal,
}

fn default_base_currency() -> Currency {
    Currency::Kes
}

fn default_event_buffer() -> usize {
    1024
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_reference_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

fn default_account_number_prefix() -> String {
    "01".to_string()
}

fn default_card_bin() -> String {
    DEFAULT_CARD_BIN.to_string()
}

fn default_fx_validation_threshold() -> Decimal {
    Decimal::new(1_000_000, 0)
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
            guard: GuardConfig::default(),
            workflow: WorkflowConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reference_retry_limit: default_reference_retry_limit(),
            account_number_prefix: default_account_number_prefix(),
            card_bin: default_card_bin(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            fx_validation_threshold: default_fx_validation_threshold(),
        }
    }
}

impl BankConfig {
    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, BankError> {
        serde_json::from_str(raw).map_err(|e| BankError::Config(e.to_string()))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            lock_timeout: Duration::from_millis(self.storage.lock_timeout_ms),
            busy_timeout: Duration::from_millis(self.storage.busy_timeout_ms),
        }
    }
}
