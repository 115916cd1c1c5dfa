//! Customers, KYC document slots, next of kin and joint holders
//!
//! KYC documents themselves live in an external document store; only their
//! reference ids are kept here, one per slot.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use teller_core::{Actor, ReferenceGenerator, ReferencePrefix};
use teller_ledger::Segment;
use teller_risk::RiskRating;
use teller_store::{codec, issue_reference, OptionalRow, StoreError};

use crate::error::BankError;

/// Result of AML screening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmlStatus {
    #[default]
    Clear,
    Pending,
    Flagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycSlot {
    NationalId,
    KraPin,
    PassportPhoto,
    Passport,
    AlienId,
    WorkPermit,
    Visa,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub branch_code: String,
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub segment: Segment,
    pub risk_rating: RiskRating,
    pub is_pep: bool,
    pub aml_status: AmlStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    pub branch_code: String,
    pub national_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub segment: Segment,
    pub risk_rating: RiskRating,
    pub is_pep: bool,
}

/// Customer fields a KYC update may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KycField {
    FirstName,
    LastName,
    Email,
    Phone,
    Address,
    Occupation,
    Segment,
    RiskRating,
    IsPep,
    AmlStatus,
}

impl KycField {
    fn column(self) -> &'static str {
        match self {
            KycField::FirstName => "first_name",
            KycField::LastName => "last_name",
            KycField::Email => "email",
            KycField::Phone => "phone",
            KycField::Address => "address",
            KycField::Occupation => "occupation",
            KycField::Segment => "segment",
            KycField::RiskRating => "risk_rating",
            KycField::IsPep => "is_pep",
            KycField::AmlStatus => "aml_status",
        }
    }

    /// The field's current value in its wire form.
    pub fn current(self, customer: &Customer) -> Option<String> {
        match self {
            KycField::FirstName => Some(customer.first_name.clone()),
            KycField::LastName => Some(customer.last_name.clone()),
            KycField::Email => customer.email.clone(),
            KycField::Phone => customer.phone.clone(),
            KycField::Address => customer.address.clone(),
            KycField::Occupation => customer.occupation.clone(),
            KycField::Segment => Some(customer.segment.to_string()),
            KycField::RiskRating => Some(customer.risk_rating.to_string()),
            KycField::IsPep => Some(customer.is_pep.to_string()),
            KycField::AmlStatus => Some(customer.aml_status.to_string()),
        }
    }

    fn required(self) -> bool {
        !matches!(
            self,
            KycField::Email | KycField::Phone | KycField::Address | KycField::Occupation
        )
    }

    /// Check `value` for this field and turn it into what the column stores.
    pub fn normalize(self, value: Option<&str>) -> Result<Option<String>, BankError> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        let Some(value) = value else {
            if self.required() {
                return Err(BankError::InvalidRequest(format!("{self} cannot be empty")));
            }
            return Ok(None);
        };
        let invalid = |_| BankError::InvalidRequest(format!("invalid {self}: {value}"));
        let normalized = match self {
            KycField::Segment => value.parse::<Segment>().map_err(invalid)?.to_string(),
            KycField::RiskRating => value.parse::<RiskRating>().map_err(invalid)?.to_string(),
            KycField::AmlStatus => value.parse::<AmlStatus>().map_err(invalid)?.to_string(),
            KycField::IsPep => match value {
                "true" => "true".to_string(),
                "false" => "false".to_string(),
                _ => return Err(BankError::InvalidRequest(format!("invalid {self}: {value}"))),
            },
            _ => value.to_string(),
        };
        Ok(Some(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycDocument {
    pub customer_id: String,
    pub slot: KycSlot,
    pub document_ref: String,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextOfKin {
    pub name: String,
    pub relationship: String,
    pub phone: Option<String>,
    pub id_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointHolder {
    pub account_id: String,
    pub customer_id: String,
    pub relationship: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

const SELECT_CUSTOMER: &str = "SELECT id, branch_code, national_id, first_name, last_name, email,
        phone, address, occupation, segment, risk_rating, is_pep, aml_status, created_by,
        created_at, updated_at
     FROM customers";

fn map_customer(row: &Row<'_>) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        branch_code: row.get(1)?,
        national_id: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        address: row.get(7)?,
        occupation: row.get(8)?,
        segment: codec::parsed_col(row, 9)?,
        risk_rating: codec::parsed_col(row, 10)?,
        is_pep: row.get(11)?,
        aml_status: codec::parsed_col(row, 12)?,
        created_by: row.get(13)?,
        created_at: codec::timestamp_col(row, 14)?,
        updated_at: codec::timestamp_col(row, 15)?,
    })
}

pub fn insert_customer(
    conn: &Connection,
    new: &NewCustomer,
    generator: &ReferenceGenerator,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Customer, BankError> {
    let national_id = new.national_id.trim();
    if national_id.is_empty() || new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
        return Err(BankError::InvalidRequest(
            "national id, first name and last name are required".to_string(),
        ));
    }

    let id = issue_reference(conn, generator, ReferencePrefix::Customer)?;
    let stamp = codec::timestamp(now);
    let inserted = conn.execute(
        "INSERT INTO customers
         (id, branch_code, national_id, first_name, last_name, email, phone, address, occupation,
          segment, risk_rating, is_pep, aml_status, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            id,
            new.branch_code,
            national_id,
            new.first_name.trim(),
            new.last_name.trim(),
            new.email,
            new.phone,
            new.address,
            new.occupation,
            new.segment.as_ref(),
            new.risk_rating.as_ref(),
            new.is_pep,
            AmlStatus::Clear.as_ref(),
            actor.id(),
            stamp,
        ],
    );
    if let Err(e) = inserted {
        let e = StoreError::from(e);
        if e.is_unique_violation() {
            return Err(BankError::InvalidRequest(format!(
                "national id {national_id} is already registered"
            )));
        }
        return Err(e.into());
    }

    Ok(get_customer(conn, &id)?)
}

pub fn get_customer(conn: &Connection, id: &str) -> Result<Customer, StoreError> {
    conn.query_row(&format!("{SELECT_CUSTOMER} WHERE id = ?1"), params![id], map_customer)
        .or_not_found("customer", id)
}

pub fn find_by_national_id(conn: &Connection, national_id: &str) -> Result<Option<Customer>, StoreError> {
    Ok(conn
        .query_row(
            &format!("{SELECT_CUSTOMER} WHERE national_id = ?1"),
            params![national_id.trim()],
            map_customer,
        )
        .optional()?)
}

pub fn list_customers(conn: &Connection) -> Result<Vec<Customer>, StoreError> {
    let mut stmt = conn.prepare(&format!("{SELECT_CUSTOMER} ORDER BY created_at, id"))?;
    let rows = stmt.query_map([], map_customer)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Write one whitelisted field. `value` must already be normalized.
pub(crate) fn update_field(
    conn: &Connection,
    customer_id: &str,
    field: KycField,
    value: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Customer, StoreError> {
    let sql = format!(
        "UPDATE customers SET {} = ?1, updated_at = ?2 WHERE id = ?3",
        field.column()
    );
    let updated = match field {
        KycField::IsPep => conn.execute(
            &sql,
            params![value == Some("true"), codec::timestamp(now), customer_id],
        )?,
        _ => conn.execute(&sql, params![value, codec::timestamp(now), customer_id])?,
    };
    if updated == 0 {
        return Err(StoreError::not_found("customer", customer_id));
    }
    get_customer(conn, customer_id)
}

pub fn set_kyc_document(
    conn: &Connection,
    customer_id: &str,
    slot: KycSlot,
    document_ref: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<KycDocument, StoreError> {
    get_customer(conn, customer_id)?;
    conn.execute(
        "INSERT INTO kyc_documents (customer_id, slot, document_ref, recorded_by, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(customer_id, slot) DO UPDATE SET
            document_ref = excluded.document_ref,
            recorded_by = excluded.recorded_by,
            recorded_at = excluded.recorded_at",
        params![customer_id, slot.as_ref(), document_ref, actor.id(), codec::timestamp(now)],
    )?;
    Ok(KycDocument {
        customer_id: customer_id.to_string(),
        slot,
        document_ref: document_ref.to_string(),
        recorded_by: actor.id().to_string(),
        recorded_at: now,
    })
}

pub fn kyc_documents(conn: &Connection, customer_id: &str) -> Result<Vec<KycDocument>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT customer_id, slot, document_ref, recorded_by, recorded_at
         FROM kyc_documents WHERE customer_id = ?1 ORDER BY slot",
    )?;
    let rows = stmt.query_map(params![customer_id], |row| {
        Ok(KycDocument {
            customer_id: row.get(0)?,
            slot: codec::parsed_col(row, 1)?,
            document_ref: row.get(2)?,
            recorded_by: row.get(3)?,
            recorded_at: codec::timestamp_col(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(crate) fn upsert_next_of_kin(
    conn: &Connection,
    customer_id: &str,
    kin: &NextOfKin,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO next_of_kin (customer_id, name, relationship, phone, id_number, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(customer_id) DO UPDATE SET
            name = excluded.name, relationship = excluded.relationship,
            phone = excluded.phone, id_number = excluded.id_number,
            updated_at = excluded.updated_at",
        params![
            customer_id,
            kin.name,
            kin.relationship,
            kin.phone,
            kin.id_number,
            codec::timestamp(now),
        ],
    )?;
    Ok(())
}

pub fn get_next_of_kin(conn: &Connection, customer_id: &str) -> Result<Option<NextOfKin>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT name, relationship, phone, id_number FROM next_of_kin WHERE customer_id = ?1",
            params![customer_id],
            |row| {
                Ok(NextOfKin {
                    name: row.get(0)?,
                    relationship: row.get(1)?,
                    phone: row.get(2)?,
                    id_number: row.get(3)?,
                })
            },
        )
        .optional()?)
}

pub(crate) fn insert_joint_holder(
    conn: &Connection,
    account_id: &str,
    customer_id: &str,
    relationship: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<JointHolder, StoreError> {
    conn.execute(
        "INSERT INTO joint_holders (account_id, customer_id, relationship, added_by, added_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![account_id, customer_id, relationship, actor.id(), codec::timestamp(now)],
    )?;
    Ok(JointHolder {
        account_id: account_id.to_string(),
        customer_id: customer_id.to_string(),
        relationship: relationship.to_string(),
        added_by: actor.id().to_string(),
        added_at: now,
    })
}

pub fn joint_holders(conn: &Connection, account_id: &str) -> Result<Vec<JointHolder>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT account_id, customer_id, relationship, added_by, added_at
         FROM joint_holders WHERE account_id = ?1 ORDER BY added_at, customer_id",
    )?;
    let rows = stmt.query_map(params![account_id], |row| {
        Ok(JointHolder {
            account_id: row.get(0)?,
            customer_id: row.get(1)?,
            relationship: row.get(2)?,
            added_by: row.get(3)?,
            added_at: codec::timestamp_col(row, 4)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
