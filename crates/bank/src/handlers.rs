//! Approval handlers
//!
//! One handler per request kind. Each re-checks its payload against current
//! state when the request is approved, so a request that went stale while
//! pending fails instead of overwriting a newer change.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{AsRefStr, Display, EnumString};
use teller_approval::{ApprovalHandler, ApprovalRequest, HandlerError, RequestKind, SubjectRef};
use teller_core::{Actor, Clock};
use teller_ledger::account::{self, AccountField};
use teller_ledger::charges::Service;
use teller_ledger::fx::{self, FxStatus};
use teller_ledger::{Account, AccountCategory, AccountStatus, LedgerEngine, LedgerError, ModeOfOperation};
use teller_lifecycle::card::{self, CardStatus};
use teller_lifecycle::{Card, CardLimits, LifecycleManager};
use teller_risk::{GuardError, RiskGuard};
use teller_store::LockKey;
use tracing::info;

use crate::customer::{self, KycField, NextOfKin};
use crate::error::BankError;
use crate::payments::post_fee_in;

fn decode<T: DeserializeOwned>(payload: &serde_json::Value) -> Result<T, BankError> {
    Ok(T::deserialize(payload)?)
}

// === KYC_UPDATE ===

/// Payload of a KYC_UPDATE request. `old` must still be current on approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycChange {
    pub field: KycField,
    pub old: Option<String>,
    pub new: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub struct KycUpdateHandler {
    clock: Arc<dyn Clock>,
}

impl KycUpdateHandler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// The normalized new value, or an error if the change no longer applies.
    fn check(conn: &Connection, customer_id: &str, change: &KycChange) -> Result<Option<String>, BankError> {
        let customer = customer::get_customer(conn, customer_id)?;
        let current = change.field.current(&customer);
        if current != change.old {
            return Err(BankError::Stale(format!(
                "{} of {} is {:?}, request expected {:?}",
                change.field, customer.id, current, change.old
            )));
        }
        let new = change.field.normalize(change.new.as_deref())?;
        if new == current {
            return Err(BankError::InvalidRequest(format!(
                "{} of {} already has that value",
                change.field, customer.id
            )));
        }
        Ok(new)
    }
}

impl ApprovalHandler for KycUpdateHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::KycUpdate
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        Self::check(conn, &subject.id, &decode(payload)?)?;
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        vec![LockKey::customer(&request.subject.id)]
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let change: KycChange = decode(&request.payload)?;
        let new = Self::check(conn, &request.subject.id, &change)?;
        customer::update_field(conn, &request.subject.id, change.field, new.as_deref(), self.clock.now())?;
        info!(customer = %request.subject.id, field = %change.field, approver = %approver, "KYC field updated");
        Ok(())
    }
}

// === ACCOUNT_MODIFICATION ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountModification {
    AddJoint {
        customer_id: String,
        relationship: String,
    },
    ChangeMode {
        from: ModeOfOperation,
        to: ModeOfOperation,
    },
    /// Replaces the account owner's next of kin
    UpdateNok(NextOfKin),
    UpgradeAccount {
        from: String,
        to: String,
    },
    ChangeSignatory {
        from: Option<String>,
        to: Option<String>,
    },
    Reactivate,
}

impl AccountModification {
    pub fn action(&self) -> &'static str {
        match self {
            AccountModification::AddJoint { .. } => "ADD_JOINT",
            AccountModification::ChangeMode { .. } => "CHANGE_MODE",
            AccountModification::UpdateNok(_) => "UPDATE_NOK",
            AccountModification::UpgradeAccount { .. } => "UPGRADE_ACCOUNT",
            AccountModification::ChangeSignatory { .. } => "CHANGE_SIGNATORY",
            AccountModification::Reactivate => "REACTIVATE",
        }
    }
}

pub struct AccountModificationHandler {
    lifecycle: Arc<LifecycleManager>,
    clock: Arc<dyn Clock>,
}

impl AccountModificationHandler {
    pub fn new(lifecycle: Arc<LifecycleManager>, clock: Arc<dyn Clock>) -> Self {
        Self { lifecycle, clock }
    }

    fn check(conn: &Connection, account: &Account, change: &AccountModification) -> Result<(), BankError> {
        match change {
            AccountModification::AddJoint {
                customer_id,
                relationship,
            } => {
                customer::get_customer(conn, customer_id)?;
                if *customer_id == account.customer_id {
                    return Err(BankError::InvalidRequest(format!(
                        "{customer_id} already owns {}",
                        account.id
                    )));
                }
                if relationship.trim().is_empty() {
                    return Err(BankError::InvalidRequest("relationship is required".to_string()));
                }
                let holders = customer::joint_holders(conn, &account.id)?;
                if holders.iter().any(|h| h.customer_id == *customer_id) {
                    return Err(BankError::InvalidRequest(format!(
                        "{customer_id} is already a joint holder of {}",
                        account.id
                    )));
                }
            }
            AccountModification::ChangeMode { from, to } => {
                if account.mode_of_operation != *from {
                    return Err(BankError::Stale(format!(
                        "{} operates {}, request expected {from}",
                        account.id, account.mode_of_operation
                    )));
                }
                if from == to {
                    return Err(BankError::InvalidRequest(format!("{} already operates {to}", account.id)));
                }
                if *to != ModeOfOperation::Singly && account.category != AccountCategory::Joint {
                    return Err(BankError::InvalidRequest(format!(
                        "{to} needs a JOINT account; {} is {}",
                        account.id, account.category
                    )));
                }
            }
            AccountModification::UpdateNok(kin) => {
                if kin.name.trim().is_empty() || kin.relationship.trim().is_empty() {
                    return Err(BankError::InvalidRequest(
                        "next of kin needs a name and a relationship".to_string(),
                    ));
                }
            }
            AccountModification::UpgradeAccount { from, to } => {
                if account.account_type != *from {
                    return Err(BankError::Stale(format!(
                        "{} is of type {}, request expected {from}",
                        account.id, account.account_type
                    )));
                }
                if from == to {
                    return Err(BankError::InvalidRequest(format!("{} is already {to}", account.id)));
                }
                let target = account::get_account_type(conn, to)?;
                if account.balance < target.minimum_balance {
                    return Err(LedgerError::InsufficientFunds {
                        account: account.id.clone(),
                        balance: account.balance,
                        minimum: target.minimum_balance,
                        debit: rust_decimal::Decimal::ZERO,
                    }
                    .into());
                }
            }
            AccountModification::ChangeSignatory { from, to } => {
                if account.signatory != *from {
                    return Err(BankError::Stale(format!(
                        "signatory of {} is {:?}, request expected {from:?}",
                        account.id, account.signatory
                    )));
                }
                if from == to {
                    return Err(BankError::InvalidRequest("signatory is unchanged".to_string()));
                }
            }
            AccountModification::Reactivate => {
                if account.status != AccountStatus::Dormant {
                    return Err(BankError::InvalidRequest(format!(
                        "{} is {}, only DORMANT accounts are reactivated",
                        account.id, account.status
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        conn: &Connection,
        account: &Account,
        change: &AccountModification,
        approver: &Actor,
    ) -> Result<(), BankError> {
        let now = self.clock.now();
        match change {
            AccountModification::AddJoint {
                customer_id,
                relationship,
            } => {
                customer::insert_joint_holder(conn, &account.id, customer_id, relationship.trim(), approver, now)?;
                if account.category != AccountCategory::Joint {
                    account::update_field(conn, account, AccountField::Category(AccountCategory::Joint), now)?;
                }
            }
            AccountModification::ChangeMode { to, .. } => {
                account::update_field(conn, account, AccountField::Mode(*to), now)?;
            }
            AccountModification::UpdateNok(kin) => {
                customer::upsert_next_of_kin(conn, &account.customer_id, kin, now)?;
            }
            AccountModification::UpgradeAccount { to, .. } => {
                account::update_field(conn, account, AccountField::AccountType(to.clone()), now)?;
            }
            AccountModification::ChangeSignatory { to, .. } => {
                account::update_field(conn, account, AccountField::Signatory(to.clone()), now)?;
            }
            AccountModification::Reactivate => {
                self.lifecycle.reactivate_in(conn, &account.id, approver)?;
            }
        }
        Ok(())
    }
}

impl ApprovalHandler for AccountModificationHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::AccountModification
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        let change: AccountModification = decode(payload)?;
        let account = account::get_account(conn, &subject.id)?;
        Self::check(conn, &account, &change)?;
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        vec![LockKey::account(&request.subject.id)]
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let change: AccountModification = decode(&request.payload)?;
        let account = account::get_account(conn, &request.subject.id)?;
        Self::check(conn, &account, &change)?;
        self.apply(conn, &account, &change, approver)?;
        info!(account = %account.id, action = change.action(), approver = %approver, "Account modified");
        Ok(())
    }
}

// === FX_VALIDATION ===

/// Payload of an FX_VALIDATION request. Carries the accounts so their lock
/// keys are known before the deal is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxValidation {
    pub reference: String,
    pub account_id: String,
    pub counter_account_id: Option<String>,
}

pub struct FxValidationHandler {
    ledger: Arc<LedgerEngine>,
}

impl FxValidationHandler {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }
}

impl ApprovalHandler for FxValidationHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::FxValidation
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        let validation: FxValidation = decode(payload)?;
        let deal = fx::get_fx(conn, &subject.id)?;
        if deal.reference != validation.reference
            || deal.account_id != validation.account_id
            || deal.counter_account_id != validation.counter_account_id
        {
            return Err(BankError::InvalidRequest(format!(
                "payload does not describe FX deal {}",
                deal.reference
            ))
            .into());
        }
        if deal.status != FxStatus::Pending {
            return Err(LedgerError::FxStatus {
                reference: deal.reference,
                status: deal.status,
                target: FxStatus::Validation,
            }
            .into());
        }
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        match request.payload_as::<FxValidation>() {
            Ok(v) => {
                let mut keys = vec![LockKey::account(v.account_id)];
                keys.extend(v.counter_account_id.map(LockKey::account));
                keys
            }
            Err(_) => Vec::new(),
        }
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let deal = fx::get_fx(conn, &request.subject.id)?;
        self.ledger.settle_fx_in(conn, &deal, approver)?;
        Ok(())
    }

    fn on_rejected(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let deal = fx::get_fx(conn, &request.subject.id)?;
        self.ledger.reject_fx_in(conn, &deal, approver)?;
        Ok(())
    }
}

// === CARD_LIMIT_UPDATE ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitChange {
    pub old: CardLimits,
    pub new: CardLimits,
}

pub struct CardLimitHandler {
    lifecycle: Arc<LifecycleManager>,
}

impl CardLimitHandler {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    fn check(conn: &Connection, card_id: &str, change: &LimitChange) -> Result<Card, BankError> {
        let card = card::get_card(conn, card_id)?;
        if card.status == CardStatus::Cancelled {
            return Err(BankError::InvalidRequest(format!("card {} is CANCELLED", card.id)));
        }
        if card.limits != change.old {
            return Err(BankError::Stale(format!(
                "limits of card {} changed since the request was made",
                card.id
            )));
        }
        if change.old == change.new {
            return Err(BankError::InvalidRequest("limits are unchanged".to_string()));
        }
        Ok(card)
    }
}

impl ApprovalHandler for CardLimitHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::CardLimitUpdate
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        Self::check(conn, &subject.id, &decode(payload)?)?;
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        vec![LockKey::card(&request.subject.id)]
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let change: LimitChange = decode(&request.payload)?;
        let card = Self::check(conn, &request.subject.id, &change)?;
        self.lifecycle.set_card_limits_in(conn, &card.id, &change.new)?;
        info!(
            card = %card.id,
            pos = %change.new.pos_daily,
            atm = %change.new.atm_daily,
            approver = %approver,
            "Card limits updated"
        );
        Ok(())
    }
}

// === CARD_PIN_ACTION ===

/// A RESET carries only the hash of the new PIN, never the PIN itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PinAction {
    Unblock,
    Reset { pin_hash: String },
}

pub struct CardPinHandler {
    guard: Arc<RiskGuard>,
}

impl CardPinHandler {
    pub fn new(guard: Arc<RiskGuard>) -> Self {
        Self { guard }
    }
}

impl ApprovalHandler for CardPinHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::CardPinAction
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        let action: PinAction = decode(payload)?;
        let card = card::get_card(conn, &subject.id)?;
        if card.status == CardStatus::Cancelled {
            return Err(GuardError::CardNotActive {
                card_id: card.id,
                status: card.status,
            }
            .into());
        }
        if action == PinAction::Unblock && self.guard.pin_state_in(conn, &card.id)?.is_none() {
            return Err(GuardError::PinNotSet { card_id: card.id }.into());
        }
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        vec![LockKey::card(&request.subject.id)]
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        match decode::<PinAction>(&request.payload)? {
            PinAction::Unblock => {
                self.guard.unblock_pin_in(conn, &request.subject.id, approver)?;
            }
            PinAction::Reset { pin_hash } => {
                self.guard
                    .store_pin_hash_in(conn, &request.subject.id, &pin_hash, approver)?;
            }
        }
        Ok(())
    }
}

// === CARD_REPLACEMENT ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardReplacement {
    /// Account of the card being replaced
    pub account_id: String,
    pub reason: String,
    pub delivery_method: String,
}

pub struct CardReplacementHandler {
    lifecycle: Arc<LifecycleManager>,
}

impl CardReplacementHandler {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    fn check(conn: &Connection, card_id: &str, replacement: &CardReplacement) -> Result<Card, BankError> {
        let card = card::get_card(conn, card_id)?;
        if card.account_id != replacement.account_id {
            return Err(BankError::InvalidRequest(format!(
                "card {} does not belong to {}",
                card.id, replacement.account_id
            )));
        }
        if card.status == CardStatus::Cancelled {
            return Err(BankError::InvalidRequest(format!("card {} is already CANCELLED", card.id)));
        }
        Ok(card)
    }
}

impl ApprovalHandler for CardReplacementHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::CardReplacement
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        let replacement: CardReplacement = decode(payload)?;
        if replacement.reason.trim().is_empty() {
            return Err(BankError::InvalidRequest("replacement reason is required".to_string()).into());
        }
        Self::check(conn, &subject.id, &replacement)?;
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        let mut keys = vec![LockKey::card(&request.subject.id)];
        if let Ok(replacement) = request.payload_as::<CardReplacement>() {
            keys.push(LockKey::account(replacement.account_id));
        }
        keys
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let replacement: CardReplacement = decode(&request.payload)?;
        let old = Self::check(conn, &request.subject.id, &replacement)?;
        let new = self.lifecycle.replace_card_in(conn, &old.id, approver)?;
        info!(
            old = %old.id,
            new = %new.id,
            reason = %replacement.reason,
            delivery = %replacement.delivery_method,
            approver = %approver,
            "Card replaced"
        );
        Ok(())
    }
}

// === CHEQUE_BOOK / STATEMENT_REQUEST ===

/// Service requests are made against an active account and charged on approval.
fn active_account(conn: &Connection, account_id: &str) -> Result<Account, BankError> {
    let account = account::get_account(conn, account_id)?;
    if !account.is_active() {
        return Err(BankError::InvalidRequest(format!(
            "{} is {}, service requests need an ACTIVE account",
            account.id, account.status
        )));
    }
    Ok(account)
}

fn required(value: &str, what: &str) -> Result<(), BankError> {
    if value.trim().is_empty() {
        return Err(BankError::InvalidRequest(format!("{what} is required")));
    }
    Ok(())
}

/// Leaves a cheque book can be printed with
pub const CHEQUE_BOOK_LEAVES: [u32; 3] = [25, 50, 100];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChequeBookOrder {
    pub leaves: u32,
    pub collection_branch: String,
    pub contact_phone: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Start a new cheque number series
    #[serde(default)]
    pub new_series: bool,
}

impl ChequeBookOrder {
    pub fn check(&self) -> Result<(), BankError> {
        if !CHEQUE_BOOK_LEAVES.contains(&self.leaves) {
            return Err(BankError::InvalidRequest(format!(
                "cheque books have 25, 50 or 100 leaves, not {}",
                self.leaves
            )));
        }
        required(&self.collection_branch, "collection branch")?;
        required(&self.contact_phone, "contact phone")
    }
}

pub struct ChequeBookHandler {
    ledger: Arc<LedgerEngine>,
}

impl ChequeBookHandler {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }
}

impl ApprovalHandler for ChequeBookHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::ChequeBook
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        decode::<ChequeBookOrder>(payload)?.check()?;
        active_account(conn, &subject.id)?;
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        vec![LockKey::account(&request.subject.id)]
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let order: ChequeBookOrder = decode(&request.payload)?;
        let account = active_account(conn, &request.subject.id)?;
        let (charges, _) =
            post_fee_in(&self.ledger, conn, &account.id, Service::ChequeBook, None, &request.id, approver)?;
        info!(
            account = %account.id,
            leaves = order.leaves,
            branch = %order.collection_branch,
            %charges,
            approver = %approver,
            "Cheque book ordered"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Mini,
    Interim,
    Full,
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StatementFormat {
    Pdf,
    Csv,
    Printed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOrder {
    pub statement_type: StatementType,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    pub format: StatementFormat,
    #[serde(default)]
    pub delivery_email: Option<String>,
    /// Stamped copy for a third party
    #[serde(default)]
    pub certified: bool,
    #[serde(default)]
    pub purpose: Option<String>,
}

impl StatementOrder {
    pub fn check(&self) -> Result<(), BankError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => {
                return Err(BankError::InvalidRequest(format!(
                    "statement period starts {from}, after it ends {to}"
                )));
            }
            (None, _) | (_, None)
                if matches!(self.statement_type, StatementType::Interim | StatementType::Full) =>
            {
                return Err(BankError::InvalidRequest(format!(
                    "{} statements need a from and a to date",
                    self.statement_type
                )));
            }
            _ => {}
        }
        if self.certified && self.purpose.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Err(BankError::InvalidRequest(
                "certified statements need a purpose".to_string(),
            ));
        }
        if let Some(email) = &self.delivery_email {
            if !email.contains('@') {
                return Err(BankError::InvalidRequest(format!("{email} is not an email address")));
            }
        }
        Ok(())
    }
}

pub struct StatementRequestHandler {
    ledger: Arc<LedgerEngine>,
}

impl StatementRequestHandler {
    pub fn new(ledger: Arc<LedgerEngine>) -> Self {
        Self { ledger }
    }
}

impl ApprovalHandler for StatementRequestHandler {
    fn kind(&self) -> RequestKind {
        RequestKind::StatementRequest
    }

    fn validate(
        &self,
        conn: &Connection,
        subject: &SubjectRef,
        payload: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        decode::<StatementOrder>(payload)?.check()?;
        active_account(conn, &subject.id)?;
        Ok(())
    }

    fn lock_keys(&self, request: &ApprovalRequest) -> Vec<LockKey> {
        vec![LockKey::account(&request.subject.id)]
    }

    fn on_approved(
        &self,
        conn: &Connection,
        request: &ApprovalRequest,
        approver: &Actor,
    ) -> Result<(), HandlerError> {
        let order: StatementOrder = decode(&request.payload)?;
        let account = active_account(conn, &request.subject.id)?;
        let (charges, _) = post_fee_in(
            &self.ledger,
            conn,
            &account.id,
            Service::StatementRequest,
            None,
            &request.id,
            approver,
        )?;
        info!(
            account = %account.id,
            statement = %order.statement_type,
            format = %order.format,
            %charges,
            approver = %approver,
            "Statement ordered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(statement_type: StatementType) -> StatementOrder {
        StatementOrder {
            statement_type,
            from: None,
            to: None,
            format: StatementFormat::Pdf,
            delivery_email: None,
            certified: false,
            purpose: None,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_statement_period_rules() {
        assert!(statement(StatementType::Mini).check().is_ok());
        assert!(statement(StatementType::Full).check().is_err());

        let mut interim = statement(StatementType::Interim);
        interim.from = Some(date(2026, 2, 1));
        interim.to = Some(date(2026, 1, 1));
        assert!(interim.check().is_err());
        interim.to = Some(date(2026, 2, 28));
        assert!(interim.check().is_ok());

        interim.certified = true;
        assert!(interim.check().is_err());
        interim.purpose = Some("Visa application".to_string());
        assert!(interim.check().is_ok());
    }

    #[test]
    fn test_cheque_book_leaves() {
        let mut order = ChequeBookOrder {
            leaves: 50,
            collection_branch: "001".to_string(),
            contact_phone: "0711000222".to_string(),
            contact_email: None,
            new_series: false,
        };
        assert!(order.check().is_ok());
        order.leaves = 30;
        assert!(order.check().is_err());
        order.leaves = 100;
        order.collection_branch = " ".to_string();
        assert!(order.check().is_err());
    }
}
