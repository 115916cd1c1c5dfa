//! Risk guard
//!
//! Gatekeeper consulted before money leaves an account through a card or a
//! large debit. Checks read and write inside the caller's transaction so the
//! recorded usage commits or rolls back with the posting it guards.

use crate::error::GuardError;
use crate::limits::{self, Channel, LimitCheck};
use crate::pin::{self, PinRecord, PinState};
use crate::rating::{RiskCeilings, RiskRating};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use teller_core::{Actor, Amount, Clock};
use teller_events::{outbox, CoreEvent};
use teller_lifecycle::card::{self, Card};
use teller_lifecycle::CardStatus;
use teller_store::{codec, Database, LockKey, OptionalRow};
use tracing::{debug, info, warn};

/// Guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Wrong PINs in a row before the PIN is blocked
    #[serde(default = "default_pin_max_attempts")]
    pub pin_max_attempts: u32,

    /// Offset of the business day from UTC, e.g. 180 for UTC+3
    #[serde(default = "default_business_day_offset")]
    pub business_day_utc_offset_minutes: i32,

    #[serde(default)]
    pub risk_ceilings: RiskCeilings,
}

fn default_pin_max_attempts() -> u32 {
    3
}

fn default_business_day_offset() -> i32 {
    180
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            pin_max_attempts: default_pin_max_attempts(),
            business_day_utc_offset_minutes: default_business_day_offset(),
            risk_ceilings: RiskCeilings::default(),
        }
    }
}

/// Result of a PIN attempt that did not end in a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinVerdict {
    Accepted,
    Rejected { failed_attempts: u32, remaining: u32 },
}

pub struct RiskGuard {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    config: GuardConfig,
}

impl RiskGuard {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, config: GuardConfig) -> Self {
        Self { db, clock, config }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    // === Daily limits ===

    pub fn check_limit(
        &self,
        card_id: &str,
        amount: Amount,
        channel: Channel,
    ) -> Result<LimitCheck, GuardError> {
        let _guard = self.db.locks().acquire([LockKey::card(card_id)])?;
        self.db.write(|tx| self.check_limit_in(tx, card_id, amount, channel))
    }

    /// Check today's usage plus `amount` against the card's limit and record it.
    pub fn check_limit_in(
        &self,
        conn: &Connection,
        card_id: &str,
        amount: Amount,
        channel: Channel,
    ) -> Result<LimitCheck, GuardError> {
        let card = card::get_card(conn, card_id)?;
        self.ensure_usable(conn, &card)?;

        let date = limits::business_date(
            self.clock.now(),
            self.config.business_day_utc_offset_minutes,
        );
        let limit = channel.limit(&card.limits);
        let used = limits::usage(conn, &card, date, channel)?;
        let total = used + amount.value();
        if total > limit {
            warn!(card = %card.id, %channel, %limit, %used, requested = %amount, "Daily limit exceeded");
            return Err(GuardError::LimitExceeded {
                card_id: card.id,
                channel,
                limit,
                used,
                requested: amount.value(),
            });
        }

        limits::store_usage(conn, &card, date, channel, total)?;
        debug!(card = %card.id, %channel, %date, used = %total, "Card usage recorded");
        Ok(LimitCheck {
            card_id: card.id,
            channel,
            business_date: date,
            limit,
            used: total,
        })
    }

    /// Today's usage on `channel`, without recording anything.
    pub fn usage_today(&self, card_id: &str, channel: Channel) -> Result<LimitCheck, GuardError> {
        self.db.read(|conn| {
            let card = card::get_card(conn, card_id)?;
            let date = limits::business_date(
                self.clock.now(),
                self.config.business_day_utc_offset_minutes,
            );
            Ok(LimitCheck {
                limit: channel.limit(&card.limits),
                used: limits::usage(conn, &card, date, channel)?,
                card_id: card.id,
                channel,
                business_date: date,
            })
        })
    }

    fn ensure_usable(&self, conn: &Connection, card: &Card) -> Result<(), GuardError> {
        if card.status != CardStatus::Active {
            return Err(GuardError::CardNotActive {
                card_id: card.id.clone(),
                status: card.status,
            });
        }
        if pin::load(conn, &card.id)?.is_some_and(|r| r.state.is_blocked) {
            return Err(GuardError::CardBlocked {
                card_id: card.id.clone(),
            });
        }
        Ok(())
    }

    // === Risk rating ===

    pub fn risk_rating_in(&self, conn: &Connection, account_id: &str) -> Result<RiskRating, GuardError> {
        Ok(conn
            .query_row(
                "SELECT c.risk_rating FROM accounts a JOIN customers c ON c.id = a.customer_id
                 WHERE a.id = ?1",
                params![account_id],
                |row| codec::parsed_col::<RiskRating>(row, 0),
            )
            .or_not_found("account", account_id)?)
    }

    /// Refuse a single debit above the owner's risk-rating ceiling.
    pub fn check_debit_in(
        &self,
        conn: &Connection,
        account_id: &str,
        amount: Amount,
    ) -> Result<RiskRating, GuardError> {
        let rating = self.risk_rating_in(conn, account_id)?;
        if let Some(ceiling) = self.config.risk_ceilings.ceiling(rating) {
            if amount.value() > ceiling {
                warn!(account = %account_id, %rating, %ceiling, %amount, "Debit above risk ceiling");
                return Err(GuardError::CeilingExceeded {
                    account: account_id.to_string(),
                    rating,
                    ceiling,
                    amount: amount.value(),
                });
            }
        }
        Ok(rating)
    }

    // === PIN ===

    /// Hash a PIN for storage or for a pending reset request.
    pub fn hash_pin(&self, pin: &str) -> Result<String, GuardError> {
        pin::hash_pin(pin)
    }

    pub fn set_pin(&self, card_id: &str, new_pin: &str, actor: &Actor) -> Result<PinState, GuardError> {
        let hash = pin::hash_pin(new_pin)?;
        let _guard = self.db.locks().acquire([LockKey::card(card_id)])?;
        self.db.write(|tx| self.store_pin_hash_in(tx, card_id, &hash, actor))
    }

    /// Replace the PIN hash and clear the counter and block.
    pub fn store_pin_hash_in(
        &self,
        conn: &Connection,
        card_id: &str,
        pin_hash: &str,
        actor: &Actor,
    ) -> Result<PinState, GuardError> {
        argon2::PasswordHash::new(pin_hash).map_err(|e| GuardError::PinHash(e.to_string()))?;
        let card = card::get_card(conn, card_id)?;
        if card.status == CardStatus::Cancelled {
            return Err(GuardError::CardNotActive {
                card_id: card.id,
                status: card.status,
            });
        }
        pin::store_hash(conn, &card.id, pin_hash, self.clock.now())?;
        info!(card = %card.id, actor = %actor, "PIN set");
        Ok(PinState {
            failed_attempts: 0,
            is_blocked: false,
        })
    }

    /// Clear the counter and block, keeping the current PIN.
    pub fn unblock_pin_in(
        &self,
        conn: &Connection,
        card_id: &str,
        actor: &Actor,
    ) -> Result<PinState, GuardError> {
        if !pin::clear_failures(conn, card_id, false, self.clock.now())? {
            return Err(GuardError::PinNotSet {
                card_id: card_id.to_string(),
            });
        }
        info!(card = %card_id, actor = %actor, "PIN unblocked");
        Ok(PinState {
            failed_attempts: 0,
            is_blocked: false,
        })
    }

    /// PIN state on an open connection; `None` when no PIN was ever set.
    pub fn pin_state_in(&self, conn: &Connection, card_id: &str) -> Result<Option<PinState>, GuardError> {
        Ok(pin::load(conn, card_id)?.map(|r| r.state))
    }

    pub fn pin_state(&self, card_id: &str) -> Result<PinState, GuardError> {
        self.db.read(|conn| {
            pin::load(conn, card_id)?
                .map(|r| r.state)
                .ok_or_else(|| GuardError::PinNotSet {
                    card_id: card_id.to_string(),
                })
        })
    }

    /// Verify `pin` and count the result.
    ///
    /// A blocked PIN fails with `CardBlocked` whatever was entered. The
    /// attempt that reaches the threshold is committed before `CardBlocked`
    /// is returned.
    pub fn record_pin_attempt(
        &self,
        card_id: &str,
        pin: &str,
        actor: &Actor,
    ) -> Result<PinVerdict, GuardError> {
        let _guard = self.db.locks().acquire([LockKey::card(card_id)])?;

        let record = self.db.read(|conn| -> Result<_, GuardError> {
            let card = card::get_card(conn, card_id)?;
            if card.status == CardStatus::Cancelled {
                return Err(GuardError::CardNotActive {
                    card_id: card.id,
                    status: card.status,
                });
            }
            pin::load(conn, card_id)?.ok_or_else(|| GuardError::PinNotSet {
                card_id: card_id.to_string(),
            })
        })?;
        if record.state.is_blocked {
            warn!(card = %card_id, actor = %actor, "PIN attempt on blocked card");
            return Err(GuardError::CardBlocked {
                card_id: card_id.to_string(),
            });
        }

        // Hash verification is slow; keep it outside the connection lock.
        let matches = pin::verify_pin(pin, &record.hash)?;
        let max = self.config.pin_max_attempts.max(1);

        let (matches, state) = self
            .db
            .write(|tx| self.count_attempt_in(tx, card_id, &record, pin, matches, actor))?;

        if state.is_blocked {
            warn!(card = %card_id, attempts = state.failed_attempts, "PIN blocked");
            return Err(GuardError::CardBlocked {
                card_id: card_id.to_string(),
            });
        }
        if matches {
            debug!(card = %card_id, "PIN accepted");
            Ok(PinVerdict::Accepted)
        } else {
            debug!(card = %card_id, attempts = state.failed_attempts, "PIN rejected");
            Ok(PinVerdict::Rejected {
                failed_attempts: state.failed_attempts,
                remaining: max.saturating_sub(state.failed_attempts),
            })
        }
    }

    /// Count an attempt verified against `seen`, the record read before the
    /// transaction. Another process may have blocked or reset the PIN since,
    /// so the record is read again here and a block always wins.
    fn count_attempt_in(
        &self,
        conn: &Connection,
        card_id: &str,
        seen: &PinRecord,
        pin: &str,
        matches: bool,
        actor: &Actor,
    ) -> Result<(bool, PinState), GuardError> {
        let blocked = || GuardError::CardBlocked {
            card_id: card_id.to_string(),
        };
        let current = pin::load(conn, card_id)?.ok_or_else(|| GuardError::PinNotSet {
            card_id: card_id.to_string(),
        })?;
        if current.state.is_blocked {
            return Err(blocked());
        }
        let matches = if current.hash == seen.hash {
            matches
        } else {
            pin::verify_pin(pin, &current.hash)?
        };

        let now = self.clock.now();
        if matches {
            if !pin::clear_failures(conn, card_id, true, now)? {
                return Err(blocked());
            }
            return Ok((
                true,
                PinState {
                    failed_attempts: 0,
                    is_blocked: false,
                },
            ));
        }

        let state = pin::register_failure(conn, card_id, self.config.pin_max_attempts.max(1), now)?;
        if state.is_blocked {
            outbox::record(
                conn,
                &CoreEvent::CardPinBlocked {
                    card_id: card_id.to_string(),
                    failed_attempts: state.failed_attempts,
                },
                actor,
            )?;
        }
        Ok((false, state))
    }
}
