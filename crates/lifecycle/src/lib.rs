//! Teller Lifecycle - account and card status machines
//!
//! Accounts: PENDING → APPROVED → ACTIVE, PENDING → REJECTED, ACTIVE → DORMANT,
//! and DORMANT → ACTIVE only through an approved reactivation.
//! Cards: PENDING → ACTIVE ⇄ BLOCKED, any non-terminal → CANCELLED.

pub mod card;
pub mod error;
pub mod manager;
pub mod rules;

pub use card::{Card, CardLimits, CardStatus, CardType, NewCard};
pub use error::LifecycleError;
pub use manager::{LifecycleManager, DEFAULT_CARD_BIN};
