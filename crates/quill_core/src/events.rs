//! Event bus for observing store maintenance.

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// An event emitted by a datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbEvent {
    /// The datafile was rewritten (manual or scheduled compaction).
    CompactionDone,
}

/// Distributes store events to subscribers.
///
/// Subscribers receive events in emission order. Disconnected
/// subscribers are pruned on the next emit.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<DbEvent>>>,
}

impl EventBus {
    /// Creates a new event bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to store events.
    pub fn subscribe(&self) -> Receiver<DbEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Emits an event to all live subscribers.
    pub fn emit(&self, event: DbEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_events() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        bus.emit(DbEvent::CompactionDone);

        assert_eq!(rx.recv().unwrap(), DbEvent::CompactionDone);
    }

    #[test]
    fn dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        drop(rx);

        bus.emit(DbEvent::CompactionDone);
        assert!(bus.subscribers.read().is_empty());
    }

    #[test]
    fn multiple_subscribers() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.emit(DbEvent::CompactionDone);

        assert!(rx1.recv().is_ok());
        assert!(rx2.recv().is_ok());
    }
}
