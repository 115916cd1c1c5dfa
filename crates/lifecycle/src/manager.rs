//! Lifecycle manager
//!
//! Applies status changes to accounts and cards. Each change is checked
//! against the edge table in [`rules`](crate::rules), written with a
//! compare-and-swap, and recorded in the outbox in the same transaction.

use crate::card::{self, Card, CardLimits, CardStatus, NewCard};
use crate::error::LifecycleError;
use crate::rules;
use rusqlite::Connection;
use std::sync::Arc;
use teller_core::{Actor, Clock, ReferenceGenerator};
use teller_events::{outbox, CoreEvent};
use teller_ledger::account::{self, AccountField};
use teller_ledger::{Account, AccountStatus};
use teller_store::{Database, LockKey};
use tracing::info;

/// Default BIN for issued cards
pub const DEFAULT_CARD_BIN: &str = "457812";

pub struct LifecycleManager {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    references: ReferenceGenerator,
    card_bin: String,
}

impl LifecycleManager {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, references: ReferenceGenerator) -> Self {
        Self {
            db,
            clock,
            references,
            card_bin: DEFAULT_CARD_BIN.to_string(),
        }
    }

    pub fn with_card_bin(mut self, bin: impl Into<String>) -> Self {
        self.card_bin = bin.into();
        self
    }

    // === Accounts ===

    pub fn transition(
        &self,
        account_id: &str,
        target: AccountStatus,
        actor: &Actor,
    ) -> Result<Account, LifecycleError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        self.db.write(|tx| self.transition_in(tx, account_id, target, actor))
    }

    pub fn transition_in(
        &self,
        conn: &Connection,
        account_id: &str,
        target: AccountStatus,
        actor: &Actor,
    ) -> Result<Account, LifecycleError> {
        let account = account::get_account(conn, account_id)?;
        if !rules::account_edge(account.status, target) {
            return Err(LifecycleError::IllegalTransition {
                entity: "account",
                id: account.id,
                from: account.status.to_string(),
                to: target.to_string(),
            });
        }
        self.set_account_status(conn, &account, target, actor)
    }

    /// DORMANT -> ACTIVE. Reserved for the approved REACTIVATE modification.
    pub fn reactivate_in(
        &self,
        conn: &Connection,
        account_id: &str,
        actor: &Actor,
    ) -> Result<Account, LifecycleError> {
        let account = account::get_account(conn, account_id)?;
        if account.status != AccountStatus::Dormant {
            return Err(LifecycleError::IllegalTransition {
                entity: "account",
                id: account.id,
                from: account.status.to_string(),
                to: AccountStatus::Active.to_string(),
            });
        }
        self.set_account_status(conn, &account, AccountStatus::Active, actor)
    }

    fn set_account_status(
        &self,
        conn: &Connection,
        account: &Account,
        target: AccountStatus,
        actor: &Actor,
    ) -> Result<Account, LifecycleError> {
        let updated = account::update_field(
            conn,
            account,
            AccountField::Status(target),
            self.clock.now(),
        )?;
        outbox::record(
            conn,
            &CoreEvent::AccountStatusChanged {
                account_id: updated.id.clone(),
                from: account.status.to_string(),
                to: updated.status.to_string(),
            },
            actor,
        )?;
        info!(account = %updated.id, from = %account.status, to = %updated.status, actor = %actor, "Account status changed");
        Ok(updated)
    }

    // === Cards ===

    pub fn issue_card(&self, new: &NewCard, actor: &Actor) -> Result<Card, LifecycleError> {
        let _guard = self.db.locks().acquire([LockKey::account(&new.account_id)])?;
        self.db.write(|tx| self.issue_card_in(tx, new, actor))
    }

    /// Issue a PENDING card. The account must exist and not be REJECTED.
    pub fn issue_card_in(
        &self,
        conn: &Connection,
        new: &NewCard,
        actor: &Actor,
    ) -> Result<Card, LifecycleError> {
        let account = account::get_account(conn, &new.account_id)?;
        if account.status == AccountStatus::Rejected {
            return Err(LifecycleError::AccountNotActive {
                account: account.id,
                status: account.status,
            });
        }
        let card = card::insert_card(
            conn,
            new,
            &self.references,
            &self.card_bin,
            actor,
            self.clock.now(),
        )?;
        outbox::record(
            conn,
            &CoreEvent::CardStatusChanged {
                card_id: card.id.clone(),
                from: String::new(),
                to: card.status.to_string(),
            },
            actor,
        )?;
        info!(card = %card.id, number = %card.masked_number(), account = %card.account_id, "Card issued");
        Ok(card)
    }

    /// Cancel `old_card_id` and issue a PENDING successor with the same limits.
    pub fn replace_card_in(
        &self,
        conn: &Connection,
        old_card_id: &str,
        actor: &Actor,
    ) -> Result<Card, LifecycleError> {
        let old = card::get_card(conn, old_card_id)?;
        self.transition_card_in(conn, old_card_id, CardStatus::Cancelled, actor)?;
        self.issue_card_in(
            conn,
            &NewCard {
                account_id: old.account_id.clone(),
                card_type: old.card_type,
                limits: old.limits,
                replaces_card_id: Some(old.id.clone()),
            },
            actor,
        )
    }

    pub fn transition_card(
        &self,
        card_id: &str,
        target: CardStatus,
        actor: &Actor,
    ) -> Result<Card, LifecycleError> {
        let account_id = self.card(card_id)?.account_id;
        let _guard = self
            .db
            .locks()
            .acquire([LockKey::account(account_id), LockKey::card(card_id)])?;
        self.db.write(|tx| self.transition_card_in(tx, card_id, target, actor))
    }

    /// A card can only become ACTIVE while its account is ACTIVE.
    pub fn transition_card_in(
        &self,
        conn: &Connection,
        card_id: &str,
        target: CardStatus,
        actor: &Actor,
    ) -> Result<Card, LifecycleError> {
        let card = card::get_card(conn, card_id)?;
        if !rules::card_edge(card.status, target) {
            return Err(LifecycleError::IllegalTransition {
                entity: "card",
                id: card.id,
                from: card.status.to_string(),
                to: target.to_string(),
            });
        }
        if target == CardStatus::Active {
            let account = account::get_account(conn, &card.account_id)?;
            if !account.is_active() {
                return Err(LifecycleError::AccountNotActive {
                    account: account.id,
                    status: account.status,
                });
            }
        }

        let updated = card::update_card_status(conn, &card, target, self.clock.now())?;
        outbox::record(
            conn,
            &CoreEvent::CardStatusChanged {
                card_id: updated.id.clone(),
                from: card.status.to_string(),
                to: updated.status.to_string(),
            },
            actor,
        )?;
        info!(card = %updated.id, from = %card.status, to = %updated.status, actor = %actor, "Card status changed");
        Ok(updated)
    }

    /// Apply new daily limits (approved CARD_LIMIT_UPDATE).
    pub fn set_card_limits_in(
        &self,
        conn: &Connection,
        card_id: &str,
        limits: &CardLimits,
    ) -> Result<Card, LifecycleError> {
        let card = card::get_card(conn, card_id)?;
        if card.status == CardStatus::Cancelled {
            return Err(LifecycleError::IllegalTransition {
                entity: "card",
                id: card.id,
                from: card.status.to_string(),
                to: "LIMIT_UPDATE".to_string(),
            });
        }
        Ok(card::update_card_limits(conn, card_id, limits, self.clock.now())?)
    }

    pub fn card(&self, card_id: &str) -> Result<Card, LifecycleError> {
        Ok(self.db.read(|conn| card::get_card(conn, card_id))?)
    }

    pub fn cards_for_account(&self, account_id: &str) -> Result<Vec<Card>, LifecycleError> {
        Ok(self.db.read(|conn| card::cards_for_account(conn, account_id))?)
    }
}
