//! Approval request types

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumString};

/// Status of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        self != ApprovalStatus::Pending
    }
}

/// What kind of change a request asks for. Each kind has one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    KycUpdate,
    AccountModification,
    FxValidation,
    CardLimitUpdate,
    CardPinAction,
    CardReplacement,
    ChequeBook,
    StatementRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectType {
    Customer,
    Account,
    Card,
    FxTransaction,
}

/// The entity a request is about. Referenced, not owned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub subject_type: SubjectType,
    pub id: String,
}

impl SubjectRef {
    pub fn new(subject_type: SubjectType, id: impl Into<String>) -> Self {
        Self {
            subject_type,
            id: id.into(),
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        Self::new(SubjectType::Customer, id)
    }

    pub fn account(id: impl Into<String>) -> Self {
        Self::new(SubjectType::Account, id)
    }

    pub fn card(id: impl Into<String>) -> Self {
        Self::new(SubjectType::Card, id)
    }

    pub fn fx(id: impl Into<String>) -> Self {
        Self::new(SubjectType::FxTransaction, id)
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject { reason: Option<String> },
}

impl Decision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: Some(reason.into()),
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        match self {
            Decision::Approve => ApprovalStatus::Approved,
            Decision::Reject { .. } => ApprovalStatus::Rejected,
        }
    }
}

/// A request and, once resolved, its resolution.
///
/// `approved_by` and `resolved_at` are set exactly when the status is not
/// PENDING; the table's CHECK constraint holds the same rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub kind: RequestKind,
    pub subject: SubjectRef,
    /// Old and new values, shaped by the request kind
    pub payload: serde_json::Value,
    pub status: ApprovalStatus,
    pub requested_by: String,
    pub approved_by: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Decode the payload into the handler's own type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(RequestKind::KycUpdate.to_string(), "KYC_UPDATE");
        assert_eq!(
            "CARD_PIN_ACTION".parse::<RequestKind>().unwrap(),
            RequestKind::CardPinAction
        );
        assert_eq!(
            serde_json::to_string(&RequestKind::AccountModification).unwrap(),
            "\"ACCOUNT_MODIFICATION\""
        );
        assert_eq!(RequestKind::ChequeBook.to_string(), "CHEQUE_BOOK");
        assert_eq!(
            "STATEMENT_REQUEST".parse::<RequestKind>().unwrap(),
            RequestKind::StatementRequest
        );
    }

    #[test]
    fn test_decision_status() {
        assert_eq!(Decision::Approve.status(), ApprovalStatus::Approved);
        assert_eq!(Decision::reject("stale").status(), ApprovalStatus::Rejected);
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(!ApprovalStatus::Pending.is_terminal());
    }
}
