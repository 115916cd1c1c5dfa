//! Event subscriber trait for async event handling

use crate::error::EventError;
use crate::event::EventRecord;
use async_trait::async_trait;

/// Receives committed events from the [`EventBus`](crate::EventBus).
///
/// Delivery is at-least-once across restarts (a consumer resumes with
/// `events_since`), so handlers should tolerate seeing a `seq` twice.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Subscriber name (for logging)
    fn name(&self) -> &str;

    async fn handle(&self, record: &EventRecord) -> Result<(), EventError>;
}
