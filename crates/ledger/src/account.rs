//! Accounts and account types
//!
//! Balances are only written by the ledger engine (`update_balance` is
//! crate-private). Every other column change goes through [`update_field`],
//! which, like the balance update, is a compare-and-swap on `version`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_core::{insert_with_fresh_reference, Actor, Currency, ReferenceGenerator};
use rusqlite::{params, Connection, OptionalExtension, Row};
use teller_store::{codec, OptionalRow, StoreError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Pending,
    Approved,
    Active,
    Rejected,
    Dormant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountCategory {
    Individual,
    Joint,
}

/// Who may operate the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModeOfOperation {
    Singly,
    Jointly,
    EitherOrSurvivor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountType {
    pub code: String,
    pub name: String,
    pub minimum_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub account_number: String,
    pub customer_id: String,
    pub account_type: String,
    pub currency: Currency,
    pub balance: Decimal,
    /// From the account type at read time
    pub minimum_balance: Decimal,
    pub status: AccountStatus,
    pub category: AccountCategory,
    pub mode_of_operation: ModeOfOperation,
    pub signatory: Option<String>,
    pub version: i64,
    pub opened_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// How much can be debited without breaching the minimum balance
    pub fn headroom(&self) -> Decimal {
        (self.balance - self.minimum_balance).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub customer_id: String,
    pub account_type: String,
    pub currency: Currency,
    pub category: AccountCategory,
    pub mode_of_operation: ModeOfOperation,
    pub signatory: Option<String>,
}

/// A single mutable column of an account, other than the balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountField {
    Status(AccountStatus),
    Category(AccountCategory),
    Mode(ModeOfOperation),
    Signatory(Option<String>),
    AccountType(String),
}

impl AccountField {
    fn column(&self) -> &'static str {
        match self {
            AccountField::Status(_) => "status",
            AccountField::Category(_) => "category",
            AccountField::Mode(_) => "mode_of_operation",
            AccountField::Signatory(_) => "signatory",
            AccountField::AccountType(_) => "account_type",
        }
    }

    fn value(&self) -> Option<String> {
        match self {
            AccountField::Status(s) => Some(s.to_string()),
            AccountField::Category(c) => Some(c.to_string()),
            AccountField::Mode(m) => Some(m.to_string()),
            AccountField::Signatory(s) => s.clone(),
            AccountField::AccountType(code) => Some(code.clone()),
        }
    }
}

const SELECT_ACCOUNT: &str = "SELECT a.id, a.account_number, a.customer_id, a.account_type, a.currency,
        a.balance, t.minimum_balance, a.status, a.category, a.mode_of_operation, a.signatory,
        a.version, a.opened_by, a.created_at, a.updated_at
     FROM accounts a JOIN account_types t ON t.code = a.account_type";

fn map_account(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        account_number: row.get(1)?,
        customer_id: row.get(2)?,
        account_type: row.get(3)?,
        currency: codec::parsed_col(row, 4)?,
        balance: codec::decimal_col(row, 5)?,
        minimum_balance: codec::decimal_col(row, 6)?,
        status: codec::parsed_col(row, 7)?,
        category: codec::parsed_col(row, 8)?,
        mode_of_operation: codec::parsed_col(row, 9)?,
        signatory: row.get(10)?,
        version: row.get(11)?,
        opened_by: row.get(12)?,
        created_at: codec::timestamp_col(row, 13)?,
        updated_at: codec::timestamp_col(row, 14)?,
    })
}

/// Create or replace an account type.
pub fn upsert_account_type(conn: &Connection, account_type: &AccountType) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO account_types (code, name, minimum_balance) VALUES (?1, ?2, ?3)
         ON CONFLICT(code) DO UPDATE SET name = excluded.name, minimum_balance = excluded.minimum_balance",
        params![
            account_type.code,
            account_type.name,
            codec::decimal(account_type.minimum_balance),
        ],
    )?;
    Ok(())
}

pub fn get_account_type(conn: &Connection, code: &str) -> Result<AccountType, StoreError> {
    conn.query_row(
        "SELECT code, name, minimum_balance FROM account_types WHERE code = ?1",
        params![code],
        |row| {
            Ok(AccountType {
                code: row.get(0)?,
                name: row.get(1)?,
                minimum_balance: codec::decimal_col(row, 2)?,
            })
        },
    )
    .or_not_found("account type", code)
}

pub fn list_account_types(conn: &Connection) -> Result<Vec<AccountType>, StoreError> {
    let mut stmt = conn.prepare("SELECT code, name, minimum_balance FROM account_types ORDER BY code")?;
    let rows = stmt.query_map([], |row| {
        Ok(AccountType {
            code: row.get(0)?,
            name: row.get(1)?,
            minimum_balance: codec::decimal_col(row, 2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Insert a PENDING account with a zero balance.
///
/// The account number comes from `generator`; a collision on the unique
/// index draws a new one.
pub fn insert_account(
    conn: &Connection,
    new: &NewAccount,
    generator: &ReferenceGenerator,
    number_prefix: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Account, StoreError> {
    let id = format!("ACC-{}", Uuid::new_v4().simple());
    let stamp = codec::timestamp(now);

    insert_with_fresh_reference(
        generator.retry_limit(),
        "account number",
        || generator.account_number(number_prefix),
        |number| {
            conn.execute(
                "INSERT INTO accounts
                 (id, account_number, customer_id, account_type, currency, balance, status,
                  category, mode_of_operation, signatory, version, opened_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '0.00', ?6, ?7, ?8, ?9, 0, ?10, ?11, ?11)",
                params![
                    id,
                    number,
                    new.customer_id,
                    new.account_type,
                    new.currency.code(),
                    AccountStatus::Pending.as_ref(),
                    new.category.as_ref(),
                    new.mode_of_operation.as_ref(),
                    new.signatory,
                    actor.id(),
                    stamp,
                ],
            )
            .map_err(StoreError::from)
        },
    )?;

    get_account(conn, &id)
}

pub fn get_account(conn: &Connection, id: &str) -> Result<Account, StoreError> {
    conn.query_row(&format!("{SELECT_ACCOUNT} WHERE a.id = ?1"), params![id], map_account)
        .or_not_found("account", id)
}

pub fn find_by_number(conn: &Connection, number: &str) -> Result<Option<Account>, StoreError> {
    Ok(conn
        .query_row(
            &format!("{SELECT_ACCOUNT} WHERE a.account_number = ?1"),
            params![number],
            map_account,
        )
        .optional()?)
}

pub fn accounts_for_customer(conn: &Connection, customer_id: &str) -> Result<Vec<Account>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_ACCOUNT} WHERE a.customer_id = ?1 ORDER BY a.created_at, a.id"
    ))?;
    let rows = stmt.query_map(params![customer_id], map_account)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_ACCOUNT} ORDER BY a.created_at, a.id"))?;
    let rows = stmt.query_map([], map_account)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn stale(account: &Account) -> StoreError {
    StoreError::LockTimeout {
        resource: format!("account {} at version {}", account.id, account.version),
        waited_ms: 0,
    }
}

/// Compare-and-swap the balance. Zero rows updated means another writer got
/// there first; that surfaces as a retryable lock timeout.
pub(crate) fn update_balance(
    conn: &Connection,
    account: &Account,
    new_balance: Decimal,
    now: DateTime<Utc>,
) -> Result<i64, StoreError> {
    let updated = conn.execute(
        "UPDATE accounts SET balance = ?1, version = version + 1, updated_at = ?2
         WHERE id = ?3 AND version = ?4",
        params![
            codec::decimal(new_balance),
            codec::timestamp(now),
            account.id,
            account.version,
        ],
    )?;
    if updated == 0 {
        return Err(stale(account));
    }
    Ok(account.version + 1)
}

/// Compare-and-swap one non-balance column and return the fresh row.
pub fn update_field(
    conn: &Connection,
    account: &Account,
    field: AccountField,
    now: DateTime<Utc>,
) -> Result<Account, StoreError> {
    let sql = format!(
        "UPDATE accounts SET {} = ?1, version = version + 1, updated_at = ?2
         WHERE id = ?3 AND version = ?4",
        field.column()
    );
    let updated = conn.execute(
        &sql,
        params![field.value(), codec::timestamp(now), account.id, account.version],
    )?;
    if updated == 0 {
        return Err(stale(account));
    }
    get_account(conn, &account.id)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use teller_store::Database;

    /// Insert a bare customer row so accounts have an owner.
    pub(crate) fn seed_customer(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO customers
             (id, branch_code, national_id, first_name, last_name, segment, risk_rating,
              aml_status, created_by, created_at, updated_at)
             VALUES (?1, '001', ?1, 'Test', 'Customer', 'retail', 'LOW', 'CLEAR', 'test', 't', 't')",
            params![id],
        )
        .unwrap();
    }

    pub(crate) fn seed_account(conn: &Connection, customer: &str, min: Decimal) -> Account {
        let code = format!("T{min}");
        upsert_account_type(
            conn,
            &AccountType {
                code: code.clone(),
                name: "Test".to_string(),
                minimum_balance: min,
            },
        )
        .unwrap();
        insert_account(
            conn,
            &NewAccount {
                customer_id: customer.to_string(),
                account_type: code,
                currency: Currency::Kes,
                category: AccountCategory::Individual,
                mode_of_operation: ModeOfOperation::Singly,
                signatory: None,
            },
            &ReferenceGenerator::default(),
            "01",
            &Actor::new("tester"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_account_is_pending_with_zero_balance() {
        let db = Database::in_memory().unwrap();
        let account = db
            .write(|tx| {
                seed_customer(tx, "cus-1");
                Ok::<_, StoreError>(seed_account(tx, "cus-1", dec!(500)))
            })
            .unwrap();
        assert_eq!(account.status, AccountStatus::Pending);
        assert_eq!(account.balance, dec!(0));
        assert_eq!(account.minimum_balance, dec!(500));
        assert_eq!(account.account_number.len(), 13);
        assert!(teller_core::luhn_valid(&account.account_number));
    }

    #[test]
    fn test_update_field_is_compare_and_swap() {
        let db = Database::in_memory().unwrap();
        db.write(|tx| {
            seed_customer(tx, "cus-1");
            let account = seed_account(tx, "cus-1", dec!(0));

            let updated = update_field(
                tx,
                &account,
                AccountField::Status(AccountStatus::Approved),
                Utc::now(),
            )?;
            assert_eq!(updated.status, AccountStatus::Approved);
            assert_eq!(updated.version, account.version + 1);

            // A writer still holding the old version loses
            let stale = update_field(
                tx,
                &account,
                AccountField::Mode(ModeOfOperation::Jointly),
                Utc::now(),
            );
            assert!(matches!(stale, Err(StoreError::LockTimeout { .. })));
            Ok::<_, StoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let db = Database::in_memory().unwrap();
        let err = db.read(|conn| get_account(conn, "nope")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "account", .. }));
    }

    #[test]
    fn test_customer_cannot_be_deleted_while_it_owns_accounts() {
        let db = Database::in_memory().unwrap();
        db.write(|tx| {
            seed_customer(tx, "cus-1");
            seed_account(tx, "cus-1", dec!(0));
            Ok::<_, StoreError>(())
        })
        .unwrap();

        let result = db.write(|tx| {
            tx.execute("DELETE FROM customers WHERE id = 'cus-1'", [])
                .map_err(StoreError::from)
        });
        assert!(result.is_err());
    }
}
