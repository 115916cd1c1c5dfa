//! Events emitted by the core
//!
//! Kinds and statuses travel as their wire strings so this crate sits below
//! the crates that own those enums.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreEvent {
    /// A ledger entry was appended and the balance moved
    EntryPosted {
        entry_id: i64,
        account_id: String,
        kind: String,
        amount: Decimal,
        balance_after: Decimal,
        reference: String,
    },

    AccountStatusChanged {
        account_id: String,
        from: String,
        to: String,
    },

    CardStatusChanged {
        card_id: String,
        from: String,
        to: String,
    },

    /// Too many wrong PINs
    CardPinBlocked { card_id: String, failed_attempts: u32 },

    ApprovalRequested {
        request_id: String,
        kind: String,
        subject_id: String,
    },

    ApprovalResolved {
        request_id: String,
        kind: String,
        status: String,
        resolved_by: String,
    },

    FxStatusChanged {
        fx_id: String,
        reference: String,
        status: String,
    },
}

impl CoreEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreEvent::EntryPosted { .. } => "ENTRY_POSTED",
            CoreEvent::AccountStatusChanged { .. } => "ACCOUNT_STATUS_CHANGED",
            CoreEvent::CardStatusChanged { .. } => "CARD_STATUS_CHANGED",
            CoreEvent::CardPinBlocked { .. } => "CARD_PIN_BLOCKED",
            CoreEvent::ApprovalRequested { .. } => "APPROVAL_REQUESTED",
            CoreEvent::ApprovalResolved { .. } => "APPROVAL_RESOLVED",
            CoreEvent::FxStatusChanged { .. } => "FX_STATUS_CHANGED",
        }
    }

    /// Id of the entity the event is about
    pub fn subject_id(&self) -> &str {
        match self {
            CoreEvent::EntryPosted { account_id, .. } => account_id,
            CoreEvent::AccountStatusChanged { account_id, .. } => account_id,
            CoreEvent::CardStatusChanged { card_id, .. } => card_id,
            CoreEvent::CardPinBlocked { card_id, .. } => card_id,
            CoreEvent::ApprovalRequested { request_id, .. } => request_id,
            CoreEvent::ApprovalResolved { request_id, .. } => request_id,
            CoreEvent::FxStatusChanged { fx_id, .. } => fx_id,
        }
    }
}

/// An event as stored in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Strictly increasing outbox position
    pub seq: i64,
    pub event: CoreEvent,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_event_json_is_tagged() {
        let event = CoreEvent::EntryPosted {
            entry_id: 1,
            account_id: "acc-1".to_string(),
            kind: "DEPOSIT".to_string(),
            amount: dec!(100.00),
            balance_after: dec!(100.00),
            reference: "DEP1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ENTRY_POSTED");
        assert_eq!(json["amount"], "100.00");
        assert_eq!(event.kind(), "ENTRY_POSTED");
        assert_eq!(event.subject_id(), "acc-1");
    }
}
