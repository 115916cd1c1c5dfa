//! Teller Events - outbox and in-process distribution
//!
//! Every state change writes a [`CoreEvent`] into the `events` table inside
//! its own transaction. After commit, [`EventBus::flush`] broadcasts new rows
//! to subscribers. Consumers that were offline catch up with
//! [`outbox::events_since`].

pub mod channel;
pub mod error;
pub mod event;
pub mod outbox;
pub mod subscriber;

pub use channel::EventBus;
pub use error::EventError;
pub use event::{CoreEvent, EventRecord};
pub use outbox::{events_since, latest_seq, record};
pub use subscriber::EventSubscriber;
