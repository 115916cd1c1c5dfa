//! In-process event bus
//!
//! The outbox is the source of truth. After a write transaction commits, the
//! caller flushes the bus, which reads everything past the last published
//! sequence and broadcasts it in order.

use crate::event::EventRecord;
use crate::outbox;
use crate::subscriber::EventSubscriber;
use parking_lot::Mutex;
use std::sync::Arc;
use teller_store::{Database, StoreError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const FLUSH_BATCH: usize = 256;

pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
    last_published: Mutex<i64>,
}

impl EventBus {
    /// A bus that will publish events with `seq > start_after`.
    pub fn new(capacity: usize, start_after: i64) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            last_published: Mutex::new(start_after),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn last_published(&self) -> i64 {
        *self.last_published.lock()
    }

    /// Publish every committed event not yet broadcast. Returns how many.
    ///
    /// Having no receivers is not an error; the events stay readable through
    /// the outbox.
    pub fn flush(&self, db: &Database) -> Result<usize, StoreError> {
        let mut last = self.last_published.lock();
        let mut published = 0;
        loop {
            let batch = db.read(|conn| outbox::events_since(conn, *last, FLUSH_BATCH))?;
            if batch.is_empty() {
                break;
            }
            let done = batch.len() < FLUSH_BATCH;
            for record in batch {
                *last = record.seq;
                published += 1;
                let _ = self.sender.send(record);
            }
            if done {
                break;
            }
        }
        if published > 0 {
            debug!(published, last_seq = *last, "Flushed events");
        }
        Ok(published)
    }

    /// Drive `subscriber` from this bus on the tokio runtime.
    pub fn spawn_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) -> JoinHandle<()> {
        let mut receiver = self.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(record) => {
                        if let Err(e) = subscriber.handle(&record).await {
                            error!(subscriber = subscriber.name(), seq = record.seq, error = %e, "Subscriber failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            subscriber = subscriber.name(),
                            skipped, "Subscriber lagged; resume from the outbox"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventError;
    use crate::event::CoreEvent;
    use async_trait::async_trait;
    use teller_core::Actor;

    fn card_blocked(card: &str) -> CoreEvent {
        CoreEvent::CardPinBlocked {
            card_id: card.to_string(),
            failed_attempts: 3,
        }
    }

    #[test]
    fn test_flush_publishes_once_in_order() {
        let db = Database::in_memory().unwrap();
        let bus = EventBus::new(16, 0);
        let mut rx = bus.subscribe();

        db.write(|tx| {
            outbox::record(tx, &card_blocked("c1"), &Actor::system())?;
            outbox::record(tx, &card_blocked("c2"), &Actor::system())
        })
        .unwrap();

        assert_eq!(bus.flush(&db).unwrap(), 2);
        assert_eq!(bus.flush(&db).unwrap(), 0);

        assert_eq!(rx.try_recv().unwrap().event, card_blocked("c1"));
        assert_eq!(rx.try_recv().unwrap().event, card_blocked("c2"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_flush_without_receivers_still_advances() {
        let db = Database::in_memory().unwrap();
        let bus = EventBus::new(4, 0);
        db.write(|tx| outbox::record(tx, &card_blocked("c1"), &Actor::system()))
            .unwrap();
        assert_eq!(bus.flush(&db).unwrap(), 1);
        assert!(bus.last_published() > 0);
    }

    struct Collector {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl EventSubscriber for Collector {
        fn name(&self) -> &str {
            "collector"
        }

        async fn handle(&self, record: &EventRecord) -> Result<(), EventError> {
            self.seen.lock().push(record.seq);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_spawned_subscriber_receives_events() {
        let db = Database::in_memory().unwrap();
        let bus = EventBus::new(16, 0);
        let collector = Arc::new(Collector {
            seen: Mutex::new(Vec::new()),
        });
        let handle = bus.spawn_subscriber(collector.clone());

        db.write(|tx| outbox::record(tx, &card_blocked("c1"), &Actor::system()))
            .unwrap();
        bus.flush(&db).unwrap();

        for _ in 0..50 {
            if !collector.seen.lock().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(collector.seen.lock().len(), 1);
        handle.abort();
    }
}
