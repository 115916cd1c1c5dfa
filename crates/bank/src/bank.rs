//! The `Bank` facade
//!
//! Owns the database and one instance of each engine, registers the approval
//! handlers and flushes the event bus after every committed change. Every
//! operation that spans engines takes its lock keys first and then runs in a
//! single write transaction.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use teller_approval::{
    ApprovalRequest, RequestKind, SubjectRef, WorkflowEngine, WorkflowStats,
};
use teller_core::{Actor, Amount, Clock, ReferenceGenerator, ReferencePrefix, SystemClock};
use teller_events::{outbox, CoreEvent, EventBus, EventRecord, EventSubscriber};
use teller_ledger::account::{self, AccountType};
use teller_ledger::charges::{charges_for, Service};
use teller_ledger::entry;
use teller_ledger::{
    Account, AccountStatus, EntryKind, FxDeal, FxKind, FxTransaction, LedgerEngine, LedgerEntry,
    LedgerError, NewAccount, Posting, Reconciliation, TransferReceipt,
};
use teller_lifecycle::{Card, CardLimits, CardStatus, LifecycleManager, NewCard};
use teller_risk::{Channel, LimitCheck, PinState, PinVerdict, RiskGuard};
use teller_store::{Database, LockKey};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::BankConfig;
use crate::customer::{self, Customer, JointHolder, KycDocument, KycField, KycSlot, NewCustomer, NextOfKin};
use crate::error::BankError;
use crate::handlers::{
    AccountModification, AccountModificationHandler, CardLimitHandler, CardPinHandler,
    CardReplacement, CardReplacementHandler, ChequeBookHandler, ChequeBookOrder, FxValidation,
    FxValidationHandler, KycChange, KycUpdateHandler, LimitChange, PinAction, StatementOrder,
    StatementRequestHandler,
};
use crate::payments::{
    self, Beneficiary, BillPayment, Biller, FundsTransfer, NewBiller, NewStandingOrder, Payee,
    StandingOrder, StandingOrderRun,
};

/// Events read per `events_since` call when the caller gives no limit
pub const DEFAULT_EVENT_PAGE: usize = 100;

pub struct Bank {
    config: BankConfig,
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    references: ReferenceGenerator,
    ledger: Arc<LedgerEngine>,
    lifecycle: Arc<LifecycleManager>,
    guard: Arc<RiskGuard>,
    workflow: WorkflowEngine,
    bus: EventBus,
}

impl Bank {
    /// Open (or create) an on-disk bank.
    pub fn open(path: impl AsRef<Path>, config: BankConfig) -> Result<Self, BankError> {
        let db = Database::open(path, &config.store_config())?;
        Self::new(db, config, Arc::new(SystemClock))
    }

    pub fn in_memory(config: BankConfig) -> Result<Self, BankError> {
        let db = Database::in_memory_with(&config.store_config())?;
        Self::new(db, config, Arc::new(SystemClock))
    }

    /// Wire every engine over `db`. The event bus starts after the last
    /// event already in the outbox.
    pub fn new(db: Database, config: BankConfig, clock: Arc<dyn Clock>) -> Result<Self, BankError> {
        let db = Arc::new(db);
        let references = ReferenceGenerator::new(clock.clone())
            .with_retry_limit(config.ledger.reference_retry_limit);

        let ledger = Arc::new(LedgerEngine::new(db.clone(), clock.clone(), references.clone()));
        let lifecycle = Arc::new(
            LifecycleManager::new(db.clone(), clock.clone(), references.clone())
                .with_card_bin(config.ledger.card_bin.clone()),
        );
        let guard = Arc::new(RiskGuard::new(db.clone(), clock.clone(), config.guard.clone()));

        let workflow = WorkflowEngine::new(db.clone(), clock.clone(), references.clone())
            .with_handler(Arc::new(KycUpdateHandler::new(clock.clone())))
            .with_handler(Arc::new(AccountModificationHandler::new(lifecycle.clone(), clock.clone())))
            .with_handler(Arc::new(FxValidationHandler::new(ledger.clone())))
            .with_handler(Arc::new(CardLimitHandler::new(lifecycle.clone())))
            .with_handler(Arc::new(CardPinHandler::new(guard.clone())))
            .with_handler(Arc::new(CardReplacementHandler::new(lifecycle.clone())))
            .with_handler(Arc::new(ChequeBookHandler::new(ledger.clone())))
            .with_handler(Arc::new(StatementRequestHandler::new(ledger.clone())));

        let start_after = db.read(outbox::latest_seq)?;
        let bus = EventBus::new(config.event_buffer, start_after);
        info!(base_currency = %config.base_currency, last_event = start_after, "Bank ready");

        Ok(Self {
            config,
            db,
            clock,
            references,
            ledger,
            lifecycle,
            guard,
            workflow,
            bus,
        })
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn guard(&self) -> &RiskGuard {
        &self.guard
    }

    pub fn workflow(&self) -> &WorkflowEngine {
        &self.workflow
    }

    // === Events ===

    /// Broadcast committed events. A failed flush is only logged; the events
    /// stay in the outbox and go out with the next flush.
    pub fn publish(&self) {
        if let Err(e) = self.bus.flush(&self.db) {
            warn!(error = %e, "Event flush failed");
        }
    }

    fn published<T, E: Into<BankError>>(&self, result: Result<T, E>) -> Result<T, BankError> {
        let value = result.map_err(Into::into)?;
        self.publish();
        Ok(value)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.bus.subscribe()
    }

    pub fn spawn_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) -> JoinHandle<()> {
        self.bus.spawn_subscriber(subscriber)
    }

    pub fn events_since(&self, seq: i64, limit: Option<usize>) -> Result<Vec<EventRecord>, BankError> {
        let limit = limit.unwrap_or(DEFAULT_EVENT_PAGE);
        Ok(self.db.read(|conn| outbox::events_since(conn, seq, limit))?)
    }

    // === Customers ===

    pub fn register_customer(&self, new: &NewCustomer, actor: &Actor) -> Result<Customer, BankError> {
        let now = self.clock.now();
        let customer = self
            .db
            .write(|tx| customer::insert_customer(tx, new, &self.references, actor, now))?;
        info!(customer = %customer.id, branch = %customer.branch_code, actor = %actor, "Customer registered");
        Ok(customer)
    }

    pub fn customer(&self, customer_id: &str) -> Result<Customer, BankError> {
        Ok(self.db.read(|conn| customer::get_customer(conn, customer_id))?)
    }

    pub fn find_customer(&self, national_id: &str) -> Result<Option<Customer>, BankError> {
        Ok(self.db.read(|conn| customer::find_by_national_id(conn, national_id))?)
    }

    pub fn customers(&self) -> Result<Vec<Customer>, BankError> {
        Ok(self.db.read(customer::list_customers)?)
    }

    /// Point a KYC slot at a document in the document store.
    pub fn record_kyc_document(
        &self,
        customer_id: &str,
        slot: KycSlot,
        document_ref: &str,
        actor: &Actor,
    ) -> Result<KycDocument, BankError> {
        if document_ref.trim().is_empty() {
            return Err(BankError::InvalidRequest("document reference is empty".to_string()));
        }
        let _guard = self.db.locks().acquire([LockKey::customer(customer_id)])?;
        let now = self.clock.now();
        Ok(self.db.write(|tx| {
            customer::set_kyc_document(tx, customer_id, slot, document_ref.trim(), actor, now)
        })?)
    }

    pub fn kyc_documents(&self, customer_id: &str) -> Result<Vec<KycDocument>, BankError> {
        Ok(self.db.read(|conn| customer::kyc_documents(conn, customer_id))?)
    }

    pub fn next_of_kin(&self, customer_id: &str) -> Result<Option<NextOfKin>, BankError> {
        Ok(self.db.read(|conn| customer::get_next_of_kin(conn, customer_id))?)
    }

    /// Ask for a KYC field change. The current value is captured as `old`.
    pub fn request_kyc_update(
        &self,
        customer_id: &str,
        field: KycField,
        new: Option<&str>,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let _guard = self.db.locks().acquire([LockKey::customer(customer_id)])?;
        let request = self.db.write(|tx| -> Result<_, BankError> {
            let current = customer::get_customer(tx, customer_id)?;
            let change = KycChange {
                field,
                old: field.current(&current),
                new: new.map(str::to_string),
                reason: reason.map(str::to_string),
            };
            self.create_request_in(tx, SubjectRef::customer(customer_id), RequestKind::KycUpdate, &change, actor)
        });
        self.published(request)
    }

    // === Account types and accounts ===

    pub fn define_account_type(&self, account_type: &AccountType) -> Result<(), BankError> {
        if account_type.code.trim().is_empty() || account_type.minimum_balance < Decimal::ZERO {
            return Err(BankError::InvalidRequest(format!(
                "account type {:?} needs a code and a non-negative minimum balance",
                account_type.code
            )));
        }
        Ok(self.db.write(|tx| account::upsert_account_type(tx, account_type))?)
    }

    pub fn account_types(&self) -> Result<Vec<AccountType>, BankError> {
        Ok(self.db.read(account::list_account_types)?)
    }

    /// Open a PENDING account for an existing customer.
    pub fn open_account(&self, new: &NewAccount, actor: &Actor) -> Result<Account, BankError> {
        let now = self.clock.now();
        let opened = self.db.write(|tx| -> Result<_, BankError> {
            customer::get_customer(tx, &new.customer_id)?;
            account::get_account_type(tx, &new.account_type)?;
            let opened = account::insert_account(
                tx,
                new,
                &self.references,
                &self.config.ledger.account_number_prefix,
                actor,
                now,
            )?;
            outbox::record(
                tx,
                &CoreEvent::AccountStatusChanged {
                    account_id: opened.id.clone(),
                    from: String::new(),
                    to: opened.status.to_string(),
                },
                actor,
            )?;
            Ok(opened)
        });
        let opened = self.published(opened)?;
        info!(account = %opened.id, number = %opened.account_number, customer = %opened.customer_id, actor = %actor, "Account opened");
        Ok(opened)
    }

    pub fn transition_account(
        &self,
        account_id: &str,
        target: AccountStatus,
        actor: &Actor,
    ) -> Result<Account, BankError> {
        self.published(self.lifecycle.transition(account_id, target, actor))
    }

    pub fn approve_account(&self, account_id: &str, actor: &Actor) -> Result<Account, BankError> {
        self.transition_account(account_id, AccountStatus::Approved, actor)
    }

    pub fn activate_account(&self, account_id: &str, actor: &Actor) -> Result<Account, BankError> {
        self.transition_account(account_id, AccountStatus::Active, actor)
    }

    pub fn reject_account(&self, account_id: &str, actor: &Actor) -> Result<Account, BankError> {
        self.transition_account(account_id, AccountStatus::Rejected, actor)
    }

    /// Inactivity signal from outside the core.
    pub fn mark_dormant(&self, account_id: &str, actor: &Actor) -> Result<Account, BankError> {
        self.transition_account(account_id, AccountStatus::Dormant, actor)
    }

    pub fn account(&self, account_id: &str) -> Result<Account, BankError> {
        Ok(self.ledger.account(account_id)?)
    }

    pub fn account_by_number(&self, number: &str) -> Result<Account, BankError> {
        self.db
            .read(|conn| account::find_by_number(conn, number))?
            .ok_or_else(|| teller_store::StoreError::not_found("account", number).into())
    }

    pub fn accounts_for_customer(&self, customer_id: &str) -> Result<Vec<Account>, BankError> {
        Ok(self.db.read(|conn| account::accounts_for_customer(conn, customer_id))?)
    }

    pub fn balance(&self, account_id: &str) -> Result<Decimal, BankError> {
        Ok(self.ledger.balance(account_id)?)
    }

    pub fn statement(&self, account_id: &str) -> Result<Vec<LedgerEntry>, BankError> {
        Ok(self.ledger.entries(account_id)?)
    }

    pub fn joint_holders(&self, account_id: &str) -> Result<Vec<JointHolder>, BankError> {
        Ok(self.db.read(|conn| customer::joint_holders(conn, account_id))?)
    }

    pub fn request_account_modification(
        &self,
        account_id: &str,
        change: &AccountModification,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        let request = self.db.write(|tx| {
            self.create_request_in(
                tx,
                SubjectRef::account(account_id),
                RequestKind::AccountModification,
                change,
                actor,
            )
        });
        self.published(request)
    }

    // === Cash ===

    pub fn deposit(
        &self,
        account_id: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<LedgerEntry, BankError> {
        self.published(self.ledger.deposit(account_id, amount, reference, actor))
    }

    /// Cash withdrawal, gated by the owner's risk ceiling.
    pub fn withdraw(
        &self,
        account_id: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<LedgerEntry, BankError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        let entry = self.db.write(|tx| -> Result<_, BankError> {
            self.guard.check_debit_in(tx, account_id, amount)?;
            let reference = self
                .ledger
                .reference_or_issue(tx, reference, ReferencePrefix::Withdrawal)?;
            Ok(self.ledger.post_in(
                tx,
                &Posting::debit(account_id, EntryKind::Withdrawal, amount, &reference),
                actor,
            )?)
        });
        self.published(entry)
    }

    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<TransferReceipt, BankError> {
        let _guard = self
            .db
            .locks()
            .acquire([LockKey::account(from), LockKey::account(to)])?;
        let receipt = self.db.write(|tx| -> Result<_, BankError> {
            self.guard.check_debit_in(tx, from, amount)?;
            let reference = self
                .ledger
                .reference_or_issue(tx, reference, ReferencePrefix::Transfer)?;
            Ok(self.ledger.transfer_in(tx, from, to, amount, &reference, actor)?)
        });
        self.published(receipt)
    }

    // === Payments ===

    pub fn register_biller(&self, new: &NewBiller, actor: &Actor) -> Result<Biller, BankError> {
        let biller = self
            .db
            .write(|tx| payments::insert_biller(tx, new, actor, self.clock.now()))?;
        info!(biller = %biller.code, paybill = %biller.paybill_number, category = %biller.category, "Biller registered");
        Ok(biller)
    }

    pub fn biller(&self, code: &str) -> Result<Biller, BankError> {
        Ok(self.db.read(|conn| payments::get_biller(conn, code))?)
    }

    /// Active billers, by category then name
    pub fn billers(&self) -> Result<Vec<Biller>, BankError> {
        Ok(self.db.read(payments::list_billers)?)
    }

    pub fn deactivate_biller(&self, code: &str, actor: &Actor) -> Result<Biller, BankError> {
        let biller = self
            .db
            .write(|tx| payments::set_biller_active(tx, code, false))?;
        info!(biller = %code, actor = %actor, "Biller deactivated");
        Ok(biller)
    }

    /// Pay a registered biller: a BILL_PAYMENT debit under a `BIL…` reference
    /// plus its FEE leg. Replaying a reference returns the first payment.
    pub fn pay_bill(
        &self,
        account_id: &str,
        biller_code: &str,
        bill_reference: &str,
        amount: Amount,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<BillPayment, BankError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        let payment = self.db.write(|tx| -> Result<_, BankError> {
            let reference = self
                .ledger
                .reference_or_issue(tx, reference, ReferencePrefix::BillPayment)?;
            let posting = Posting::debit(account_id, EntryKind::BillPayment, amount, &reference);
            if let Some(existing) = payments::find_bill_payment(tx, &reference)? {
                if existing.account_id != account_id {
                    return Err(BankError::InvalidRequest(format!(
                        "reference {reference} was paid from another account"
                    )));
                }
                self.ledger.post_in(tx, &posting, actor)?;
                return Ok(existing);
            }

            if bill_reference.trim().is_empty() {
                return Err(BankError::InvalidRequest("bill reference is required".to_string()));
            }
            let biller = payments::get_biller(tx, biller_code)?;
            if !biller.is_active {
                return Err(BankError::InvalidRequest(format!("biller {} is inactive", biller.code)));
            }
            biller.accepts(amount)?;
            self.guard.check_debit_in(tx, account_id, amount)?;

            let narration = format!("{} {}", biller.name, bill_reference.trim());
            self.ledger.post_in(tx, &posting.with_narration(narration), actor)?;
            let (charges, _) = payments::post_fee_in(
                &self.ledger,
                tx,
                account_id,
                Service::BillPayment,
                Some(amount),
                &reference,
                actor,
            )?;
            let payment = BillPayment {
                reference,
                account_id: account_id.to_string(),
                biller_code: Some(biller.code),
                biller_name: biller.name,
                paybill_number: biller.paybill_number,
                bill_reference: bill_reference.trim().to_string(),
                amount,
                charges,
                created_by: actor.id().to_string(),
                created_at: self.clock.now(),
            };
            payments::insert_bill_payment(tx, &payment)?;
            info!(account = %account_id, reference = %payment.reference, biller = %biller_code, %amount, "Bill paid");
            Ok(payment)
        });
        self.published(payment)
    }

    pub fn bill_payments(&self, account_id: &str) -> Result<Vec<BillPayment>, BankError> {
        Ok(self.db.read(|conn| payments::bill_payments_for_account(conn, account_id))?)
    }

    /// Send funds to another bank. Only the TRANSFER_OUT debit and its FEE
    /// leg are posted here; the beneficiary is kept on the transfer record.
    pub fn transfer_external(
        &self,
        account_id: &str,
        beneficiary: &Beneficiary,
        amount: Amount,
        narration: Option<&str>,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<FundsTransfer, BankError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        let transfer = self.db.write(|tx| -> Result<_, BankError> {
            let reference = self
                .ledger
                .reference_or_issue(tx, reference, ReferencePrefix::Transfer)?;
            let posting = Posting::debit(account_id, EntryKind::TransferOut, amount, &reference)
                .with_narration(format!("To {} {}", beneficiary.name.trim(), beneficiary.account.trim()));
            if let Some(existing) = payments::find_funds_transfer(tx, &reference)? {
                if existing.account_id != account_id {
                    return Err(BankError::InvalidRequest(format!(
                        "reference {reference} was sent from another account"
                    )));
                }
                self.ledger.post_in(tx, &posting, actor)?;
                return Ok(existing);
            }

            beneficiary.validate()?;
            self.guard.check_debit_in(tx, account_id, amount)?;
            self.ledger.post_in(tx, &posting, actor)?;
            let (charges, _) = payments::post_fee_in(
                &self.ledger,
                tx,
                account_id,
                Service::FundsTransfer,
                Some(amount),
                &reference,
                actor,
            )?;
            let transfer = FundsTransfer {
                reference,
                account_id: account_id.to_string(),
                beneficiary: beneficiary.clone(),
                amount,
                charges,
                narration: narration.map(str::to_string),
                created_by: actor.id().to_string(),
                created_at: self.clock.now(),
            };
            payments::insert_funds_transfer(tx, &transfer)?;
            info!(account = %account_id, reference = %transfer.reference, %amount, "External transfer sent");
            Ok(transfer)
        });
        self.published(transfer)
    }

    pub fn funds_transfers(&self, account_id: &str) -> Result<Vec<FundsTransfer>, BankError> {
        Ok(self.db.read(|conn| payments::funds_transfers_for_account(conn, account_id))?)
    }

    fn standing_order_keys(account_id: &str, payee: &Payee) -> Vec<LockKey> {
        let mut keys = vec![LockKey::account(account_id)];
        if let Payee::Internal { account_id } = payee {
            keys.push(LockKey::account(account_id));
        }
        keys
    }

    pub fn create_standing_order(&self, new: &NewStandingOrder, actor: &Actor) -> Result<StandingOrder, BankError> {
        let _guard = self
            .db
            .locks()
            .acquire(Self::standing_order_keys(&new.account_id, &new.payee))?;
        let order = self.db.write(|tx| -> Result<_, BankError> {
            let source = account::get_account(tx, &new.account_id)?;
            if !source.is_active() {
                return Err(BankError::InvalidRequest(format!(
                    "{} is {}, standing orders need an ACTIVE account",
                    source.id, source.status
                )));
            }
            if new.amount.is_zero() {
                return Err(BankError::InvalidRequest("standing order amount is zero".to_string()));
            }
            if new.end_date.is_some_and(|end| end < new.start_date) {
                return Err(BankError::InvalidRequest(format!(
                    "standing order ends before it starts on {}",
                    new.start_date
                )));
            }
            match &new.payee {
                Payee::Internal { account_id } => {
                    if *account_id == source.id {
                        return Err(BankError::InvalidRequest(format!(
                            "standing order pays {account_id} into itself"
                        )));
                    }
                    let payee = account::get_account(tx, account_id)?;
                    if payee.currency != source.currency {
                        return Err(LedgerError::CurrencyMismatch {
                            expected: source.currency,
                            actual: payee.currency,
                        }
                        .into());
                    }
                }
                Payee::External(beneficiary) => beneficiary.validate()?,
            }
            let id = self
                .ledger
                .reference_or_issue(tx, None, ReferencePrefix::StandingOrder)?;
            Ok(payments::insert_standing_order(tx, &id, new, actor, self.clock.now())?)
        })?;
        info!(order = %order.id, account = %order.account_id, frequency = %order.frequency, amount = %order.amount, "Standing order created");
        Ok(order)
    }

    pub fn standing_order(&self, order_id: &str) -> Result<StandingOrder, BankError> {
        Ok(self.db.read(|conn| payments::get_standing_order(conn, order_id))?)
    }

    pub fn standing_orders(&self, account_id: &str) -> Result<Vec<StandingOrder>, BankError> {
        Ok(self.db.read(|conn| payments::standing_orders_for_account(conn, account_id))?)
    }

    pub fn cancel_standing_order(&self, order_id: &str, actor: &Actor) -> Result<StandingOrder, BankError> {
        let order = self.standing_order(order_id)?;
        let _guard = self.db.locks().acquire([LockKey::account(&order.account_id)])?;
        let order = self.db.write(|tx| -> Result<_, BankError> {
            let order = payments::get_standing_order(tx, order_id)?;
            if !order.is_active {
                return Err(BankError::InvalidRequest(format!("standing order {order_id} is already cancelled")));
            }
            Ok(payments::deactivate_standing_order(tx, order_id, self.clock.now())?)
        })?;
        info!(order = %order_id, actor = %actor, "Standing order cancelled");
        Ok(order)
    }

    /// Run a standing order for `on`. The run is posted under
    /// `<order id>-<yyyymmdd>`, so running the same date again returns the
    /// entries of the first run. Nothing here decides when to call it.
    pub fn execute_standing_order(
        &self,
        order_id: &str,
        on: NaiveDate,
        actor: &Actor,
    ) -> Result<StandingOrderRun, BankError> {
        let order = self.standing_order(order_id)?;
        let _guard = self
            .db
            .locks()
            .acquire(Self::standing_order_keys(&order.account_id, &order.payee))?;
        let run = self.db.write(|tx| -> Result<_, BankError> {
            let order = payments::get_standing_order(tx, order_id)?;
            let reference = order.run_reference(on);
            let replay = entry::find_entry(tx, &order.account_id, EntryKind::TransferOut, &reference)?.is_some();
            if !replay {
                if !order.is_due(on) {
                    return Err(BankError::InvalidRequest(format!(
                        "standing order {} is not due on {on}",
                        order.id
                    )));
                }
                self.guard.check_debit_in(tx, &order.account_id, order.amount)?;
            }

            let (debit, credit) = match &order.payee {
                Payee::Internal { account_id } => {
                    let receipt =
                        self.ledger
                            .transfer_in(tx, &order.account_id, account_id, order.amount, &reference, actor)?;
                    (receipt.debit, Some(receipt.credit))
                }
                Payee::External(beneficiary) => {
                    let posting = Posting::debit(&order.account_id, EntryKind::TransferOut, order.amount, &reference)
                        .with_narration(format!("Standing order to {} {}", beneficiary.name, beneficiary.account));
                    (self.ledger.post_in(tx, &posting, actor)?, None)
                }
            };
            let (_, fee) = payments::post_fee_in(
                &self.ledger,
                tx,
                &order.account_id,
                Service::StandingOrder,
                Some(order.amount),
                &reference,
                actor,
            )?;
            if !replay {
                payments::mark_run(tx, &order.id, on, self.clock.now())?;
                info!(order = %order.id, %reference, amount = %order.amount, "Standing order executed");
            }
            Ok(StandingOrderRun {
                order_id: order.id,
                run_on: on,
                reference,
                debit,
                credit,
                fee,
            })
        });
        self.published(run)
    }

    // === Cards ===

    pub fn issue_card(&self, new: &NewCard, actor: &Actor) -> Result<Card, BankError> {
        self.published(self.lifecycle.issue_card(new, actor))
    }

    pub fn transition_card(&self, card_id: &str, target: CardStatus, actor: &Actor) -> Result<Card, BankError> {
        self.published(self.lifecycle.transition_card(card_id, target, actor))
    }

    pub fn activate_card(&self, card_id: &str, actor: &Actor) -> Result<Card, BankError> {
        self.transition_card(card_id, CardStatus::Active, actor)
    }

    pub fn block_card(&self, card_id: &str, actor: &Actor) -> Result<Card, BankError> {
        self.transition_card(card_id, CardStatus::Blocked, actor)
    }

    pub fn cancel_card(&self, card_id: &str, actor: &Actor) -> Result<Card, BankError> {
        self.transition_card(card_id, CardStatus::Cancelled, actor)
    }

    pub fn card(&self, card_id: &str) -> Result<Card, BankError> {
        Ok(self.lifecycle.card(card_id)?)
    }

    pub fn cards_for_account(&self, account_id: &str) -> Result<Vec<Card>, BankError> {
        Ok(self.lifecycle.cards_for_account(account_id)?)
    }

    pub fn set_pin(&self, card_id: &str, pin: &str, actor: &Actor) -> Result<PinState, BankError> {
        Ok(self.guard.set_pin(card_id, pin, actor)?)
    }

    /// Count a PIN attempt. A block reached by this attempt is committed
    /// (and published) even though the call fails with `CardBlocked`.
    pub fn verify_pin(&self, card_id: &str, pin: &str, actor: &Actor) -> Result<PinVerdict, BankError> {
        let verdict = self.guard.record_pin_attempt(card_id, pin, actor);
        self.publish();
        Ok(verdict?)
    }

    pub fn pin_state(&self, card_id: &str) -> Result<PinState, BankError> {
        Ok(self.guard.pin_state(card_id)?)
    }

    pub fn card_usage(&self, card_id: &str, channel: Channel) -> Result<LimitCheck, BankError> {
        Ok(self.guard.usage_today(card_id, channel)?)
    }

    /// POS or ATM spend: limit check, risk ceiling and the WITHDRAWAL posting
    /// commit together or not at all.
    pub fn card_spend(
        &self,
        card_id: &str,
        amount: Amount,
        channel: Channel,
        reference: Option<&str>,
        actor: &Actor,
    ) -> Result<LedgerEntry, BankError> {
        let account_id = self.lifecycle.card(card_id)?.account_id;
        let _guard = self
            .db
            .locks()
            .acquire([LockKey::account(&account_id), LockKey::card(card_id)])?;
        let entry = self.db.write(|tx| -> Result<_, BankError> {
            let reference = self
                .ledger
                .reference_or_issue(tx, reference, ReferencePrefix::CardSpend)?;
            let posting = Posting::debit(&account_id, EntryKind::Withdrawal, amount, &reference)
                .with_narration(format!("{channel} card {card_id}"));
            // A replayed reference is answered by the ledger alone; its usage
            // was counted the first time.
            if entry::find_entry(tx, &account_id, EntryKind::Withdrawal, &reference)?.is_some() {
                return Ok(self.ledger.post_in(tx, &posting, actor)?);
            }
            let check = self.guard.check_limit_in(tx, card_id, amount, channel)?;
            self.guard.check_debit_in(tx, &account_id, amount)?;
            let entry = self.ledger.post_in(tx, &posting, actor)?;
            info!(card = %card_id, %channel, used = %check.used, limit = %check.limit, "Card spend");
            Ok(entry)
        });
        self.published(entry)
    }

    pub fn request_card_limit_update(
        &self,
        card_id: &str,
        new: CardLimits,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let _guard = self.db.locks().acquire([LockKey::card(card_id)])?;
        let request = self.db.write(|tx| -> Result<_, BankError> {
            let card = teller_lifecycle::card::get_card(tx, card_id)?;
            let change = LimitChange {
                old: card.limits,
                new,
            };
            self.create_request_in(tx, SubjectRef::card(card_id), RequestKind::CardLimitUpdate, &change, actor)
        });
        self.published(request)
    }

    pub fn request_pin_unblock(&self, card_id: &str, actor: &Actor) -> Result<ApprovalRequest, BankError> {
        self.request_pin_action(card_id, &PinAction::Unblock, actor)
    }

    /// Ask for a PIN reset. Only the hash of `new_pin` is stored in the request.
    pub fn request_pin_reset(
        &self,
        card_id: &str,
        new_pin: &str,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let pin_hash = self.guard.hash_pin(new_pin)?;
        self.request_pin_action(card_id, &PinAction::Reset { pin_hash }, actor)
    }

    fn request_pin_action(
        &self,
        card_id: &str,
        action: &PinAction,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let _guard = self.db.locks().acquire([LockKey::card(card_id)])?;
        let request = self.db.write(|tx| {
            self.create_request_in(tx, SubjectRef::card(card_id), RequestKind::CardPinAction, action, actor)
        });
        self.published(request)
    }

    pub fn request_card_replacement(
        &self,
        card_id: &str,
        reason: &str,
        delivery_method: &str,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let card = self.lifecycle.card(card_id)?;
        let _guard = self
            .db
            .locks()
            .acquire([LockKey::account(&card.account_id), LockKey::card(card_id)])?;
        let replacement = CardReplacement {
            account_id: card.account_id,
            reason: reason.to_string(),
            delivery_method: delivery_method.to_string(),
        };
        let request = self.db.write(|tx| {
            self.create_request_in(
                tx,
                SubjectRef::card(card_id),
                RequestKind::CardReplacement,
                &replacement,
                actor,
            )
        });
        self.published(request)
    }

    // === Service requests ===

    pub fn request_cheque_book(
        &self,
        account_id: &str,
        order: &ChequeBookOrder,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        let request = self.db.write(|tx| {
            self.create_request_in(tx, SubjectRef::account(account_id), RequestKind::ChequeBook, order, actor)
        });
        self.published(request)
    }

    pub fn request_statement(
        &self,
        account_id: &str,
        order: &StatementOrder,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let _guard = self.db.locks().acquire([LockKey::account(account_id)])?;
        let request = self.db.write(|tx| {
            self.create_request_in(
                tx,
                SubjectRef::account(account_id),
                RequestKind::StatementRequest,
                order,
                actor,
            )
        });
        self.published(request)
    }

    // === FX ===

    /// Book an FX deal. Deals at or above the validation threshold, and every
    /// TRANSFER, wait for an FX_VALIDATION approval; the rest settle now.
    pub fn submit_fx(&self, deal: &FxDeal, actor: &Actor) -> Result<FxTransaction, BankError> {
        let _guard = self.db.locks().acquire(LedgerEngine::fx_lock_keys(deal))?;
        let threshold = self.config.workflow.fx_validation_threshold;
        let booked = self.db.write(|tx| -> Result<_, BankError> {
            let source = account::get_account(tx, &deal.account_id)?;
            let charges = if deal.kind == FxKind::Transfer {
                let owner = customer::get_customer(tx, &source.customer_id)?;
                charges_for(deal.kind.service(), owner.segment, Some(deal.source_amount)).total
            } else {
                Amount::ZERO
            };
            self.guard.check_debit_in(tx, &deal.account_id, deal.source_amount)?;

            let fx = self.ledger.book_fx_in(tx, deal, charges, actor)?;
            let needs_validation =
                deal.kind == FxKind::Transfer || deal.source_amount.value() >= threshold;
            if !needs_validation {
                return Ok(self.ledger.settle_fx_in(tx, &fx, actor)?);
            }

            // Refuse now what could never settle later.
            let debit = deal.source_amount.value() + charges.value();
            if source.is_active() && source.balance - debit < source.minimum_balance {
                return Err(LedgerError::InsufficientFunds {
                    account: source.id,
                    balance: source.balance,
                    minimum: source.minimum_balance,
                    debit: -debit,
                }
                .into());
            }
            let validation = FxValidation {
                reference: fx.reference.clone(),
                account_id: fx.account_id.clone(),
                counter_account_id: fx.counter_account_id.clone(),
            };
            let request = self.create_request_in(
                tx,
                SubjectRef::fx(&fx.id),
                RequestKind::FxValidation,
                &validation,
                actor,
            )?;
            Ok(self.ledger.hold_fx_in(tx, &fx, &request.id, actor)?)
        });
        self.published(booked)
    }

    pub fn fx(&self, fx_id: &str) -> Result<FxTransaction, BankError> {
        Ok(self.ledger.fx(fx_id)?)
    }

    // === Approvals ===

    fn create_request_in<P: serde::Serialize>(
        &self,
        conn: &Connection,
        subject: SubjectRef,
        kind: RequestKind,
        payload: &P,
        actor: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        let payload = serde_json::to_value(payload)?;
        Ok(self.workflow.create_in(conn, subject, kind, payload, actor)?)
    }

    pub fn approve(&self, request_id: &str, approver: &Actor) -> Result<ApprovalRequest, BankError> {
        self.published(self.workflow.approve(request_id, approver))
    }

    pub fn reject(
        &self,
        request_id: &str,
        reason: Option<&str>,
        approver: &Actor,
    ) -> Result<ApprovalRequest, BankError> {
        self.published(self.workflow.reject(request_id, reason, approver))
    }

    pub fn request(&self, request_id: &str) -> Result<ApprovalRequest, BankError> {
        Ok(self.workflow.get(request_id)?)
    }

    pub fn pending_requests(&self) -> Result<Vec<ApprovalRequest>, BankError> {
        Ok(self.workflow.list_pending()?)
    }

    pub fn requests_for(&self, subject: &SubjectRef) -> Result<Vec<ApprovalRequest>, BankError> {
        Ok(self.workflow.list_for_subject(subject)?)
    }

    pub fn workflow_stats(&self) -> Result<WorkflowStats, BankError> {
        Ok(self.workflow.stats()?)
    }

    // === Verification ===

    pub fn verify_account(&self, account_id: &str) -> Result<Reconciliation, BankError> {
        Ok(self.ledger.verify_account(account_id)?)
    }

    pub fn verify_all(&self) -> Result<Vec<Reconciliation>, BankError> {
        Ok(self.ledger.verify_all()?)
    }
}
