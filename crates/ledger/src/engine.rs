//! Ledger engine
//!
//! The only writer of account balances. Each posting runs under the
//! account's lock-table key and inside one IMMEDIATE transaction that:
//! reads the account, checks status and minimum balance, compare-and-swaps
//! the balance, appends the entry and appends the outbox event.
//!
//! `*_in` variants take an open connection/transaction so callers can
//! compose several postings (or a posting and an approval) atomically. They
//! expect the caller to already hold the relevant lock-table keys.

use crate::account::{self, Account};
use crate::entry::{self, EntryKind, LedgerEntry, NewEntry};
use crate::error::LedgerError;
use crate::fx::{self, FxDeal, FxKind, FxStatus, FxTransaction, Settlement};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use teller_core::{Actor, Amount, Clock, ReferenceGenerator, ReferencePrefix, MAX_AMOUNT, MONEY_SCALE};
use teller_events::{outbox, CoreEvent};
use teller_store::{issue_reference, Database, LockKey};
use tracing::{debug, info, warn};

/// One leg to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub account_id: String,
    pub kind: EntryKind,
    /// Signed amount
    pub amount: Decimal,
    pub reference: String,
    pub narration: Option<String>,
}

impl Posting {
    pub fn new(
        account_id: impl Into<String>,
        kind: EntryKind,
        amount: Decimal,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            kind,
            amount,
            reference: reference.into(),
            narration: None,
        }
    }

    pub fn credit(account_id: &str, kind: EntryKind, amount: Amount, reference: &str) -> Self {
        Self::new(account_id, kind, amount.as_credit(), reference)
    }

    pub fn debit(account_id: &str, kind: EntryKind, amount: Amount, reference: &str) -> Self {
        Self::new(account_id, kind, amount.as_debit(), reference)
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = Some(narration.into());
        self
    }
}

/// Both legs of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

/// Result of checking Σ(entries) against the stored balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub account_id: String,
    pub balance: Decimal,
    pub entries_total: Decimal,
    pub entry_count: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.entries_total
    }
}

pub struct LedgerEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    references: ReferenceGenerator,
}

impl LedgerEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, references: ReferenceGenerator) -> Self {
        Self {
            db,
            clock,
            references,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn references(&self) -> &ReferenceGenerator {
        &self.references
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // === Postings ===

    /// Post one signed amount to an account.
    pub fn post(
        &self,
        account_id: &str,
        amount: Decimal,
        kind: EntryKind,
        reference: &str,
        actor: &Actor,
    ) -> Result<LedgerEntry, LedgerError> {
        let posting = Posting::new(account_id, kind, amount, reference);
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        self.db.write(|tx| self.post_in(tx, &posting, actor))
    }

    /// Apply a posting on an open transaction.
    ///
    /// A posting whose (account, kind, reference) already exists is answered
    /// with the existing entry when the amount matches, and rejected with
    /// `DuplicateReference` when it does not.
    pub fn post_in(
        &self,
        conn: &Connection,
        posting: &Posting,
        actor: &Actor,
    ) -> Result<LedgerEntry, LedgerError> {
        posting.kind.check_sign(posting.amount)?;
        if posting.amount.normalize().scale() > MONEY_SCALE {
            return Err(LedgerError::InvalidAmount(format!(
                "{} has more than {MONEY_SCALE} decimal places",
                posting.amount
            )));
        }
        if posting.amount.abs() > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount(format!(
                "{} exceeds {MAX_AMOUNT}",
                posting.amount
            )));
        }
        if posting.reference.trim().is_empty() {
            return Err(LedgerError::InvalidAmount("posting reference is empty".to_string()));
        }
        let mut amount = posting.amount;
        amount.rescale(MONEY_SCALE);

        if let Some(existing) =
            entry::find_entry(conn, &posting.account_id, posting.kind, &posting.reference)?
        {
            if existing.amount == amount {
                debug!(
                    account = %posting.account_id,
                    reference = %posting.reference,
                    "Posting already applied"
                );
                return Ok(existing);
            }
            return Err(LedgerError::DuplicateReference {
                account: posting.account_id.clone(),
                kind: posting.kind,
                reference: posting.reference.clone(),
                existing: existing.amount,
                requested: amount,
            });
        }

        let account = account::get_account(conn, &posting.account_id)?;
        if !account.is_active() {
            return Err(LedgerError::AccountNotActive {
                account: account.id,
                status: account.status,
            });
        }

        let mut new_balance = account
            .balance
            .checked_add(amount)
            .filter(|b| b.abs() <= MAX_AMOUNT)
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!(
                    "{amount} on {} would take the balance past {MAX_AMOUNT}",
                    account.id
                ))
            })?;
        new_balance.rescale(MONEY_SCALE);
        if amount.is_sign_negative()
            && posting.kind != EntryKind::Adjustment
            && new_balance < account.minimum_balance
        {
            warn!(
                account = %account.id,
                balance = %account.balance,
                debit = %amount,
                "Insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                account: account.id,
                balance: account.balance,
                minimum: account.minimum_balance,
                debit: amount,
            });
        }

        let now = self.clock.now();
        account::update_balance(conn, &account, new_balance, now)?;

        let entry = entry::insert_entry(
            conn,
            &NewEntry {
                account_id: &account.id,
                kind: posting.kind,
                amount,
                balance_after: new_balance,
                reference: &posting.reference,
                actor: actor.id(),
                narration: posting.narration.as_deref(),
                created_at: now,
            },
        )
        .map_err(|e| {
            if e.is_unique_violation() {
                LedgerError::DuplicateReference {
                    account: account.id.clone(),
                    kind: posting.kind,
                    reference: posting.reference.clone(),
                    existing: Decimal::ZERO,
                    requested: amount,
                }
            } else {
                LedgerError::Store(e)
            }
        })?;

        outbox::record(
            conn,
            &CoreEvent::EntryPosted {
                entry_id: entry.id,
                account_id: entry.account_id.clone(),
                kind: entry.kind.to_string(),
                amount: entry.amount,
                balance_after: entry.balance_after,
                reference: entry.reference.clone(),
            },
            actor,
        )?;

        info!(
            account = %entry.account_id,
            kind = %entry.kind,
            amount = %entry.amount,
            balance = %entry.balance_after,
            reference = %entry.reference,
            "Posted entry"
        );
        Ok(entry)
    }

    /// Use `reference` or issue a fresh one under `prefix`.
    pub fn reference_or_issue(
        &self,
        conn: &Connection,
        reference: Option<&str>,
        prefix: ReferencePrefix,
    ) -> Result<String, LedgerError> {
        match reference.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => Ok(r.to_string()),
            None => Ok(issue_reference(conn, &self.references, prefix)?),
        }
    }

    /// Cash deposit. Without a reference one is generated (`DEP…`).
    pub fn deposit(
        &self,
        account_id: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<LedgerEntry, LedgerError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        self.db.write(|tx| {
            let reference = self.reference_or_issue(tx, reference, ReferencePrefix::Deposit)?;
            self.post_in(
                tx,
                &Posting::credit(account_id, EntryKind::Deposit, amount, &reference),
                actor,
            )
        })
    }

    /// Cash withdrawal. Without a reference one is generated (`WDL…`).
    pub fn withdraw(
        &self,
        account_id: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<LedgerEntry, LedgerError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        self.db.write(|tx| {
            let reference = self.reference_or_issue(tx, reference, ReferencePrefix::Withdrawal)?;
            self.post_in(
                tx,
                &Posting::debit(account_id, EntryKind::Withdrawal, amount, &reference),
                actor,
            )
        })
    }

    // === Transfers ===

    /// Move funds between two accounts of the same currency. Both legs or neither.
    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<TransferReceipt, LedgerError> {
        let _guard = self
            .db
            .locks()
            .acquire([LockKey::account(from), LockKey::account(to)])?;
        self.db.write(|tx| {
            let reference = self.reference_or_issue(tx, reference, ReferencePrefix::Transfer)?;
            self.transfer_in(tx, from, to, amount, &reference, actor)
        })
    }

    pub fn transfer_in(
        &self,
        conn: &Connection,
        from: &str,
        to: &str,
        amount: Amount,
        reference: &str,
        actor: &Actor,
    ) -> Result<TransferReceipt, LedgerError> {
        if from == to {
            return Err(LedgerError::InvalidTransfer(format!(
                "source and destination are both {from}"
            )));
        }
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("transfer amount is zero".to_string()));
        }

        let source = account::get_account(conn, from)?;
        let destination = account::get_account(conn, to)?;
        if source.currency != destination.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: source.currency,
                actual: destination.currency,
            });
        }

        let debit = self.post_in(
            conn,
            &Posting::debit(from, EntryKind::TransferOut, amount, reference),
            actor,
        )?;
        let credit = self.post_in(
            conn,
            &Posting::credit(to, EntryKind::TransferIn, amount, reference),
            actor,
        )?;

        Ok(TransferReceipt {
            reference: reference.to_string(),
            debit,
            credit,
        })
    }

    // === FX ===

    /// Lock keys a deal's settlement touches
    pub fn fx_lock_keys(deal: &FxDeal) -> Vec<LockKey> {
        let mut keys = vec![LockKey::account(&deal.account_id)];
        if let Some(counter) = &deal.counter_account_id {
            keys.push(LockKey::account(counter));
        }
        keys
    }

    /// Validate a deal against its accounts and book it as PENDING.
    pub fn book_fx_in(
        &self,
        conn: &Connection,
        deal: &FxDeal,
        charges: Amount,
        actor: &Actor,
    ) -> Result<FxTransaction, LedgerError> {
        let source = account::get_account(conn, &deal.account_id)?;
        if source.currency != deal.pair.base {
            return Err(LedgerError::CurrencyMismatch {
                expected: deal.pair.base.clone(),
                actual: source.currency,
            });
        }
        if deal.source_amount.is_zero() {
            return Err(LedgerError::InvalidAmount("FX source amount is zero".to_string()));
        }
        if deal.converted_amount().value() > MAX_AMOUNT {
            return Err(LedgerError::InvalidAmount(format!(
                "{} {} converts past {MAX_AMOUNT}",
                deal.pair, deal.source_amount
            )));
        }

        match (deal.settlement, &deal.counter_account_id) {
            (Settlement::AccountCredit, Some(counter)) => {
                let counter = account::get_account(conn, counter)?;
                if counter.currency != deal.pair.quote {
                    return Err(LedgerError::CurrencyMismatch {
                        expected: deal.pair.quote.clone(),
                        actual: counter.currency,
                    });
                }
            }
            (Settlement::AccountCredit, None) => {
                return Err(LedgerError::InvalidTransfer(
                    "ACCOUNT_CREDIT settlement needs a counter account".to_string(),
                ));
            }
            _ => {}
        }
        if (deal.kind == FxKind::Transfer) != (deal.settlement == Settlement::External) {
            return Err(LedgerError::InvalidTransfer(
                "FX transfers, and only FX transfers, settle EXTERNAL".to_string(),
            ));
        }

        let booked = fx::insert_fx(conn, deal, charges, &self.references, actor, self.clock.now())?;
        info!(
            reference = %booked.reference,
            kind = %booked.kind,
            pair = %booked.pair,
            source = %booked.source_amount,
            converted = %booked.converted_amount,
            "Booked FX deal"
        );
        Ok(booked)
    }

    /// Park a deal for validation under an approval request.
    pub fn hold_fx_in(
        &self,
        conn: &Connection,
        fx: &FxTransaction,
        approval_request_id: &str,
        actor: &Actor,
    ) -> Result<FxTransaction, LedgerError> {
        self.move_fx(conn, fx, FxStatus::Validation, Some(approval_request_id), actor)
    }

    /// Post the deal's legs and mark it COMPLETED.
    pub fn settle_fx_in(
        &self,
        conn: &Connection,
        fx: &FxTransaction,
        actor: &Actor,
    ) -> Result<FxTransaction, LedgerError> {
        if !fx.status.can_become(FxStatus::Completed) {
            return Err(LedgerError::FxStatus {
                reference: fx.reference.clone(),
                status: fx.status,
                target: FxStatus::Completed,
            });
        }

        self.post_in(
            conn,
            &Posting::debit(&fx.account_id, EntryKind::FxSell, fx.source_amount, &fx.reference)
                .with_narration(format!("{} {} @ {}", fx.kind, fx.pair, fx.rate)),
            actor,
        )?;

        if !fx.charges.is_zero() {
            self.post_in(
                conn,
                &Posting::debit(&fx.account_id, EntryKind::Fee, fx.charges, &fx.reference)
                    .with_narration("FX charges"),
                actor,
            )?;
        }

        if let (Settlement::AccountCredit, Some(counter)) = (fx.settlement, &fx.counter_account_id) {
            self.post_in(
                conn,
                &Posting::credit(counter, EntryKind::FxBuy, fx.converted_amount, &fx.reference)
                    .with_narration(format!("{} {} @ {}", fx.kind, fx.pair, fx.rate)),
                actor,
            )?;
        }

        self.move_fx(conn, fx, FxStatus::Completed, None, actor)
    }

    pub fn reject_fx_in(
        &self,
        conn: &Connection,
        fx: &FxTransaction,
        actor: &Actor,
    ) -> Result<FxTransaction, LedgerError> {
        self.move_fx(conn, fx, FxStatus::Rejected, None, actor)
    }

    fn move_fx(
        &self,
        conn: &Connection,
        fx: &FxTransaction,
        target: FxStatus,
        approval_request_id: Option<&str>,
        actor: &Actor,
    ) -> Result<FxTransaction, LedgerError> {
        if !fx.status.can_become(target) {
            return Err(LedgerError::FxStatus {
                reference: fx.reference.clone(),
                status: fx.status,
                target,
            });
        }
        let moved = fx::update_fx_status(conn, fx, target, approval_request_id, self.clock.now())?;
        outbox::record(
            conn,
            &CoreEvent::FxStatusChanged {
                fx_id: moved.id.clone(),
                reference: moved.reference.clone(),
                status: moved.status.to_string(),
            },
            actor,
        )?;
        info!(reference = %moved.reference, from = %fx.status, to = %moved.status, "FX status changed");
        Ok(moved)
    }

    // === Reads ===

    pub fn account(&self, account_id: &str) -> Result<Account, LedgerError> {
        Ok(self.db.read(|conn| account::get_account(conn, account_id))?)
    }

    pub fn balance(&self, account_id: &str) -> Result<Decimal, LedgerError> {
        Ok(self.account(account_id)?.balance)
    }

    pub fn entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.db.read(|conn| {
            account::get_account(conn, account_id)?;
            Ok(entry::entries_for_account(conn, account_id)?)
        })
    }

    pub fn fx(&self, id: &str) -> Result<FxTransaction, LedgerError> {
        Ok(self.db.read(|conn| fx::get_fx(conn, id))?)
    }

    /// Check that the entries of an account sum to its balance.
    pub fn verify_account(&self, account_id: &str) -> Result<Reconciliation, LedgerError> {
        self.db.read(|conn| reconcile(conn, account_id))
    }

    /// Reconcile every account; inconsistent ones are logged.
    pub fn verify_all(&self) -> Result<Vec<Reconciliation>, LedgerError> {
        let results = self.db.read(|conn| {
            account::list_accounts(conn)?
                .iter()
                .map(|a| reconcile(conn, &a.id))
                .collect::<Result<Vec<_>, LedgerError>>()
        })?;
        for r in results.iter().filter(|r| !r.is_consistent()) {
            warn!(account = %r.account_id, balance = %r.balance, entries = %r.entries_total, "Balance does not match entries");
        }
        Ok(results)
    }
}

fn reconcile(conn: &Connection, account_id: &str) -> Result<Reconciliation, LedgerError> {
    let account = account::get_account(conn, account_id)?;
    let (entries_total, entry_count) = entry::sum_amounts(conn, account_id)?;
    Ok(Reconciliation {
        account_id: account.id,
        balance: account.balance,
        entries_total,
        entry_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::tests::{seed_account, seed_customer};
    use crate::account::{AccountField, AccountStatus};
    use crate::fx::FxKind;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::thread;
    use teller_core::{Currency, CurrencyPair, ErrorKind, DomainError, FxRate, SystemClock};
    use teller_events::latest_seq;
    use teller_store::StoreError;

    fn engine() -> LedgerEngine {
        LedgerEngine::new(
            Arc::new(Database::in_memory().unwrap()),
            Arc::new(SystemClock),
            ReferenceGenerator::default(),
        )
    }

    fn active_account(engine: &LedgerEngine, customer: &str, min: Decimal) -> Account {
        engine
            .database()
            .write(|tx| -> Result<Account, StoreError> {
                if tx
                    .query_row("SELECT 1 FROM customers WHERE id = ?1", [customer], |_| Ok(()))
                    .is_err()
                {
                    seed_customer(tx, customer);
                }
                let account = seed_account(tx, customer, min);
                account::update_field(tx, &account, AccountField::Status(AccountStatus::Active), Utc::now())
            })
            .unwrap()
    }

    fn amount(v: Decimal) -> Amount {
        Amount::new(v).unwrap()
    }

    fn teller() -> Actor {
        Actor::new("teller-01")
    }

    #[test]
    fn test_withdrawal_example() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        engine.deposit(&a.id, amount(dec!(1000)), Some("DEP-1"), &teller()).unwrap();

        let err = engine
            .withdraw(&a.id, amount(dec!(1500)), None, &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(1000));

        let entry = engine
            .withdraw(&a.id, amount(dec!(500)), None, &teller())
            .unwrap();
        assert_eq!(entry.kind, EntryKind::Withdrawal);
        assert_eq!(entry.amount, dec!(-500));
        assert_eq!(entry.balance_after, dec!(500));
        assert!(entry.reference.starts_with("WDL"));
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(500));

        let withdrawals: Vec<_> = engine
            .entries(&a.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EntryKind::Withdrawal)
            .collect();
        assert_eq!(withdrawals.len(), 1);
    }

    #[test]
    fn test_minimum_balance_enforced_but_adjustment_bypasses() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(1000));
        engine.deposit(&a.id, amount(dec!(1500)), None, &teller()).unwrap();

        let err = engine
            .withdraw(&a.id, amount(dec!(500.01)), None, &teller())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        engine.withdraw(&a.id, amount(dec!(500)), None, &teller()).unwrap();

        engine
            .post(&a.id, dec!(-1200), EntryKind::Adjustment, "ADJ-1", &teller())
            .unwrap();
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(-200));
        assert!(engine.verify_account(&a.id).unwrap().is_consistent());
    }

    #[test]
    fn test_same_reference_posts_once() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));

        let first = engine.deposit(&a.id, amount(dec!(250)), Some("DEP-42"), &teller()).unwrap();
        let second = engine.deposit(&a.id, amount(dec!(250)), Some("DEP-42"), &teller()).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.entries(&a.id).unwrap().len(), 1);
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(250));

        let err = engine
            .deposit(&a.id, amount(dec!(300)), Some("DEP-42"), &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateReference);
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(250));
    }

    #[test]
    fn test_inactive_account_rejected() {
        let engine = engine();
        let pending = engine
            .database()
            .write(|tx| {
                seed_customer(tx, "cus-1");
                Ok::<_, StoreError>(seed_account(tx, "cus-1", dec!(0)))
            })
            .unwrap();

        let err = engine
            .deposit(&pending.id, amount(dec!(10)), None, &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotActive);
    }

    #[test]
    fn test_sign_and_scale_checked() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        let err = engine
            .post(&a.id, dec!(-10), EntryKind::Deposit, "X1", &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        let err = engine
            .post(&a.id, dec!(10.001), EntryKind::Deposit, "X2", &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
    }

    #[test]
    fn test_balance_ceiling_is_an_error_not_a_panic() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        let max = Amount::new(MAX_AMOUNT).unwrap();
        engine.deposit(&a.id, max, Some("DEP-MAX"), &teller()).unwrap();

        let err = engine
            .deposit(&a.id, amount(dec!(0.01)), Some("DEP-OVER"), &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert_eq!(engine.balance(&a.id).unwrap(), MAX_AMOUNT);

        let err = engine
            .post(&a.id, Decimal::MAX, EntryKind::Adjustment, "ADJ-HUGE", &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAmount);
        assert!(engine.verify_account(&a.id).unwrap().is_consistent());
    }

    #[test]
    fn test_transfer_moves_both_legs() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        let b = active_account(&engine, "cus-2", dec!(0));
        engine.deposit(&a.id, amount(dec!(800)), None, &teller()).unwrap();

        let receipt = engine
            .transfer(&a.id, &b.id, amount(dec!(300)), None, &teller())
            .unwrap();
        assert!(receipt.reference.starts_with("TRF"));
        assert_eq!(receipt.debit.amount, dec!(-300));
        assert_eq!(receipt.credit.amount, dec!(300));
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(500));
        assert_eq!(engine.balance(&b.id).unwrap(), dec!(300));
    }

    #[test]
    fn test_failed_credit_leg_rolls_back_debit() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        let b = active_account(&engine, "cus-2", dec!(0));
        engine.deposit(&a.id, amount(dec!(800)), None, &teller()).unwrap();
        let seq_before = engine.database().read(latest_seq).unwrap();

        // Destination goes dormant; its credit leg will fail after the debit leg posted
        engine
            .database()
            .write(|tx| -> Result<Account, StoreError> {
                let b = account::get_account(tx, &b.id)?;
                account::update_field(tx, &b, AccountField::Status(AccountStatus::Dormant), Utc::now())
            })
            .unwrap();

        let err = engine
            .transfer(&a.id, &b.id, amount(dec!(300)), Some("TRF-X"), &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotActive);
        assert_eq!(engine.balance(&a.id).unwrap(), dec!(800));
        assert_eq!(engine.balance(&b.id).unwrap(), dec!(0));
        assert!(engine
            .database()
            .read(|conn| entry::entries_for_reference(conn, "TRF-X"))
            .unwrap()
            .is_empty());
        assert_eq!(engine.database().read(latest_seq).unwrap(), seq_before);
    }

    #[test]
    fn test_transfer_currency_mismatch() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        let usd = engine
            .database()
            .write(|tx| -> Result<Account, StoreError> {
                seed_customer(tx, "cus-2");
                let acc = seed_account(tx, "cus-2", dec!(0));
                tx.execute("UPDATE accounts SET currency = 'USD' WHERE id = ?1", [&acc.id])?;
                account::update_field(tx, &account::get_account(tx, &acc.id)?, AccountField::Status(AccountStatus::Active), Utc::now())
            })
            .unwrap();
        engine.deposit(&a.id, amount(dec!(100)), None, &teller()).unwrap();

        let err = engine
            .transfer(&a.id, &usd.id, amount(dec!(50)), None, &teller())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CurrencyMismatch);
    }

    #[test]
    fn test_concurrent_postings_have_no_lost_updates() {
        let engine = Arc::new(engine());
        let a = active_account(&engine, "cus-1", dec!(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                let id = a.id.clone();
                thread::spawn(move || {
                    let mut total = Decimal::ZERO;
                    for i in 0..25 {
                        let value = Decimal::new(((t * 31 + i * 7) % 97 + 1) as i64 * 100 + 25, 2);
                        engine
                            .post(&id, value, EntryKind::Deposit, &format!("T{t}-{i}"), &Actor::new("load"))
                            .unwrap();
                        total += value;
                    }
                    total
                })
            })
            .collect();

        let expected: Decimal = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(engine.balance(&a.id).unwrap(), expected);

        let check = engine.verify_account(&a.id).unwrap();
        assert!(check.is_consistent());
        assert_eq!(check.entry_count, 200);
    }

    #[test]
    fn test_entries_are_immutable() {
        let engine = engine();
        let a = active_account(&engine, "cus-1", dec!(0));
        engine.deposit(&a.id, amount(dec!(10)), None, &teller()).unwrap();

        let result = engine.database().write(|tx| {
            tx.execute("UPDATE ledger_entries SET amount = '1000.00'", [])
                .map_err(StoreError::from)
        });
        assert!(result.unwrap_err().is_trigger_abort());
    }

    #[test]
    fn test_fx_settlement_posts_sell_and_buy_legs() {
        let engine = engine();
        let kes = active_account(&engine, "cus-1", dec!(0));
        let usd = engine
            .database()
            .write(|tx| -> Result<Account, StoreError> {
                let acc = seed_account(tx, "cus-1", dec!(0));
                tx.execute("UPDATE accounts SET currency = 'USD' WHERE id = ?1", [&acc.id])?;
                account::update_field(tx, &account::get_account(tx, &acc.id)?, AccountField::Status(AccountStatus::Active), Utc::now())
            })
            .unwrap();
        engine.deposit(&kes.id, amount(dec!(200000)), None, &teller()).unwrap();

        let deal = FxDeal {
            kind: FxKind::Buy,
            account_id: kes.id.clone(),
            counter_account_id: Some(usd.id.clone()),
            pair: CurrencyPair::new(Currency::Kes, Currency::Usd).unwrap(),
            rate: FxRate::new(dec!(0.0077)).unwrap(),
            source_amount: amount(dec!(130000)),
            settlement: Settlement::AccountCredit,
            beneficiary: None,
        };

        let _guard = engine.database().locks().acquire(LedgerEngine::fx_lock_keys(&deal)).unwrap();
        let done = engine
            .database()
            .write(|tx| {
                let booked = engine.book_fx_in(tx, &deal, Amount::ZERO, &teller())?;
                assert!(booked.reference.starts_with("FXB"));
                engine.settle_fx_in(tx, &booked, &teller())
            })
            .unwrap();

        assert_eq!(done.status, FxStatus::Completed);
        assert_eq!(done.converted_amount.value(), dec!(1001.00));
        assert_eq!(engine.balance(&kes.id).unwrap(), dec!(70000));
        assert_eq!(engine.balance(&usd.id).unwrap(), dec!(1001));

        let again = engine.database().write(|tx| engine.settle_fx_in(tx, &done, &teller()));
        assert_eq!(again.unwrap_err().kind(), ErrorKind::IllegalTransition);
    }
}
