//! Database schema
//!
//! Ownership follows the foreign keys: `ON DELETE CASCADE` where the parent
//! owns the child (account → entries, cards), `RESTRICT` where a row is only
//! referenced and must stay while referenced (customer ← account), and
//! `SET NULL` for weak back references. Approval requests name their subject
//! but hold no foreign key to it.

use crate::error::StoreError;
use rusqlite::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS customers (
    id              TEXT PRIMARY KEY,
    branch_code     TEXT NOT NULL,
    national_id     TEXT NOT NULL UNIQUE,
    first_name      TEXT NOT NULL,
    last_name       TEXT NOT NULL,
    email           TEXT,
    phone           TEXT,
    address         TEXT,
    occupation      TEXT,
    segment         TEXT NOT NULL,
    risk_rating     TEXT NOT NULL,
    is_pep          INTEGER NOT NULL DEFAULT 0,
    aml_status      TEXT NOT NULL,
    created_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS kyc_documents (
    customer_id     TEXT NOT NULL REFERENCES customers(id) ON DELETE CASCADE,
    slot            TEXT NOT NULL,
    document_ref    TEXT NOT NULL,
    recorded_by     TEXT NOT NULL,
    recorded_at     TEXT NOT NULL,
    PRIMARY KEY (customer_id, slot)
);

CREATE TABLE IF NOT EXISTS next_of_kin (
    customer_id     TEXT PRIMARY KEY REFERENCES customers(id) ON DELETE CASCADE,
    name            TEXT NOT NULL,
    relationship    TEXT NOT NULL,
    phone           TEXT,
    id_number       TEXT,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS account_types (
    code            TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    minimum_balance TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS accounts (
    id                  TEXT PRIMARY KEY,
    account_number      TEXT NOT NULL UNIQUE,
    customer_id         TEXT NOT NULL REFERENCES customers(id) ON DELETE RESTRICT,
    account_type        TEXT NOT NULL REFERENCES account_types(code) ON DELETE RESTRICT,
    currency            TEXT NOT NULL,
    balance             TEXT NOT NULL,
    status              TEXT NOT NULL,
    category            TEXT NOT NULL,
    mode_of_operation   TEXT NOT NULL,
    signatory           TEXT,
    version             INTEGER NOT NULL DEFAULT 0,
    opened_by           TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_accounts_customer ON accounts(customer_id);

CREATE TABLE IF NOT EXISTS joint_holders (
    account_id      TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    customer_id     TEXT NOT NULL REFERENCES customers(id) ON DELETE RESTRICT,
    relationship    TEXT NOT NULL,
    added_by        TEXT NOT NULL,
    added_at        TEXT NOT NULL,
    PRIMARY KEY (account_id, customer_id)
);

CREATE TABLE IF NOT EXISTS issued_references (
    reference       TEXT PRIMARY KEY,
    issued_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id      TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    kind            TEXT NOT NULL,
    amount          TEXT NOT NULL,
    balance_after   TEXT NOT NULL,
    reference       TEXT NOT NULL,
    actor           TEXT NOT NULL,
    narration       TEXT,
    created_at      TEXT NOT NULL,
    UNIQUE (account_id, kind, reference)
);
CREATE INDEX IF NOT EXISTS idx_ledger_entries_reference ON ledger_entries(reference);

CREATE TRIGGER IF NOT EXISTS ledger_entries_immutable
BEFORE UPDATE ON ledger_entries
BEGIN
    SELECT RAISE(ABORT, 'ledger entries are immutable');
END;

CREATE TABLE IF NOT EXISTS approval_requests (
    id              TEXT PRIMARY KEY,
    kind            TEXT NOT NULL,
    subject_type    TEXT NOT NULL,
    subject_id      TEXT NOT NULL,
    payload         TEXT NOT NULL,
    status          TEXT NOT NULL,
    requested_by    TEXT NOT NULL,
    approved_by     TEXT,
    reason          TEXT,
    created_at      TEXT NOT NULL,
    resolved_at     TEXT,
    CHECK ((status = 'PENDING') = (approved_by IS NULL AND resolved_at IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_approval_requests_status ON approval_requests(status);
CREATE INDEX IF NOT EXISTS idx_approval_requests_subject ON approval_requests(subject_type, subject_id);

CREATE TRIGGER IF NOT EXISTS approval_requests_resolved_immutable
BEFORE UPDATE ON approval_requests
WHEN OLD.status <> 'PENDING'
BEGIN
    SELECT RAISE(ABORT, 'resolved approval requests are immutable');
END;

CREATE TRIGGER IF NOT EXISTS approval_requests_resolved_undeletable
BEFORE DELETE ON approval_requests
WHEN OLD.status <> 'PENDING'
BEGIN
    SELECT RAISE(ABORT, 'resolved approval requests are immutable');
END;

CREATE TABLE IF NOT EXISTS cards (
    id                  TEXT PRIMARY KEY,
    card_number         TEXT NOT NULL UNIQUE,
    account_id          TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    card_type           TEXT NOT NULL,
    status              TEXT NOT NULL,
    pos_daily_limit     TEXT NOT NULL,
    atm_daily_limit     TEXT NOT NULL,
    expires_on          TEXT NOT NULL,
    replaces_card_id    TEXT REFERENCES cards(id) ON DELETE SET NULL,
    issued_by           TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cards_account ON cards(account_id);

CREATE TABLE IF NOT EXISTS card_pins (
    card_id         TEXT PRIMARY KEY REFERENCES cards(id) ON DELETE CASCADE,
    pin_hash        TEXT NOT NULL,
    failed_attempts INTEGER NOT NULL DEFAULT 0,
    is_blocked      INTEGER NOT NULL DEFAULT 0,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS card_usage (
    card_id         TEXT NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
    business_date   TEXT NOT NULL,
    channel         TEXT NOT NULL,
    used            TEXT NOT NULL,
    PRIMARY KEY (card_id, business_date, channel)
);

CREATE TABLE IF NOT EXISTS fx_transactions (
    id                  TEXT PRIMARY KEY,
    reference           TEXT NOT NULL UNIQUE,
    kind                TEXT NOT NULL,
    account_id          TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    counter_account_id  TEXT REFERENCES accounts(id) ON DELETE SET NULL,
    base_currency       TEXT NOT NULL,
    quote_currency      TEXT NOT NULL,
    rate                TEXT NOT NULL,
    source_amount       TEXT NOT NULL,
    converted_amount    TEXT NOT NULL,
    charges             TEXT NOT NULL,
    settlement          TEXT NOT NULL,
    beneficiary         TEXT,
    status              TEXT NOT NULL,
    approval_request_id TEXT REFERENCES approval_requests(id) ON DELETE SET NULL,
    created_by          TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    completed_at        TEXT
);
CREATE INDEX IF NOT EXISTS idx_fx_transactions_status ON fx_transactions(status);

CREATE TABLE IF NOT EXISTS billers (
    code                    TEXT PRIMARY KEY,
    name                    TEXT NOT NULL,
    paybill_number          TEXT NOT NULL UNIQUE,
    category                TEXT NOT NULL,
    bill_fetch_supported    INTEGER NOT NULL DEFAULT 0,
    min_amount              TEXT,
    max_amount              TEXT,
    is_active               INTEGER NOT NULL DEFAULT 1,
    created_by              TEXT NOT NULL,
    created_at              TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS bill_payments (
    reference       TEXT PRIMARY KEY,
    account_id      TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    biller_code     TEXT REFERENCES billers(code) ON DELETE SET NULL,
    biller_name     TEXT NOT NULL,
    paybill_number  TEXT NOT NULL,
    bill_reference  TEXT NOT NULL,
    amount          TEXT NOT NULL,
    charges         TEXT NOT NULL,
    created_by      TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bill_payments_account ON bill_payments(account_id);

CREATE TABLE IF NOT EXISTS funds_transfers (
    reference           TEXT PRIMARY KEY,
    account_id          TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    beneficiary_account TEXT NOT NULL,
    beneficiary_name    TEXT NOT NULL,
    beneficiary_bank    TEXT,
    amount              TEXT NOT NULL,
    charges             TEXT NOT NULL,
    narration           TEXT,
    created_by          TEXT NOT NULL,
    created_at          TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_funds_transfers_account ON funds_transfers(account_id);

CREATE TABLE IF NOT EXISTS standing_orders (
    id                  TEXT PRIMARY KEY,
    account_id          TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    payee_account_id    TEXT REFERENCES accounts(id) ON DELETE RESTRICT,
    beneficiary_account TEXT,
    beneficiary_name    TEXT,
    beneficiary_bank    TEXT,
    amount              TEXT NOT NULL,
    frequency           TEXT NOT NULL,
    start_date          TEXT NOT NULL,
    end_date            TEXT,
    is_active           INTEGER NOT NULL DEFAULT 1,
    last_run_on         TEXT,
    created_by          TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    CHECK ((payee_account_id IS NULL) <> (beneficiary_account IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_standing_orders_account ON standing_orders(account_id);

CREATE TABLE IF NOT EXISTS events (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    kind            TEXT NOT NULL,
    subject_id      TEXT NOT NULL,
    payload         TEXT NOT NULL,
    actor           TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS events_immutable
BEFORE UPDATE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;
"#;

/// Create every table, index and trigger that does not exist yet.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
