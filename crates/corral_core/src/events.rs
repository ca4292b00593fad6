//! Typed notification channel for collaborators.
//!
//! The query cache, collection proxies and monitoring subsystems are
//! outside the core; they learn about committed changes through this bus.
//! Two delivery paths exist:
//! - channel subscribers ([`EventBus::subscribe`]), decoupled, one receiver
//!   per collaborator thread
//! - synchronous [`CommitListener`]s, registered once at startup and run
//!   inline during commit (the transaction tracker guards these against
//!   reentrant notification)

use crate::types::{Timestamp, TransactionId};
use corral_meta::{ObjectKey, TypeId};
use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A single engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// An object version was created for the first time.
    ObjectCreated {
        /// Key of the created object.
        key: ObjectKey,
        /// Version stamp of the new row.
        stamp: Timestamp,
    },
    /// An object got a new current version.
    ObjectModified {
        /// Key of the modified object.
        key: ObjectKey,
        /// Version stamp of the new row.
        stamp: Timestamp,
    },
    /// An object's current version was closed with no successor.
    ObjectRemoved {
        /// Key of the removed object.
        key: ObjectKey,
        /// Stamp at which the last version closed.
        stamp: Timestamp,
    },
    /// A transaction is about to commit physically.
    Committing {
        /// The committing transaction.
        txn: TransactionId,
    },
    /// A transaction committed physically.
    Committed {
        /// The committed transaction.
        txn: TransactionId,
    },
    /// A transaction rolled back physically.
    RolledBack {
        /// The rolled-back transaction.
        txn: TransactionId,
    },
    /// Local caches were invalidated, for one type or wholesale.
    CachesInvalidated {
        /// The invalidated type, or `None` for a full invalidation.
        type_id: Option<TypeId>,
    },
}

/// An event with its bus-assigned sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedEvent {
    /// Position in the bus's total order.
    pub sequence: u64,
    /// The event itself.
    pub event: EngineEvent,
}

/// A synchronous commit listener, registered at engine startup.
///
/// Listeners run inline on the committing thread. They may open their own
/// transactions; commits issued from inside a listener do not re-enter
/// notification.
pub trait CommitListener: Send + Sync {
    /// Called for every event the bus emits.
    fn on_event(&self, event: &EngineEvent);
}

/// The notification bus.
///
/// Preserves emit order, supports multiple channel subscribers, and keeps a
/// bounded history for cursor-based polling.
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<SequencedEvent>>>,
    listeners: RwLock<Vec<Arc<dyn CommitListener>>>,
    history: RwLock<Vec<SequencedEvent>>,
    max_history: usize,
    next_seq: AtomicU64,
}

impl EventBus {
    /// Creates a bus retaining `max_history` events for polling.
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            max_history,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Subscribes a channel receiver to all future events.
    pub fn subscribe(&self) -> Receiver<SequencedEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Registers a synchronous listener. Startup-time only; there is no
    /// unregistration, which keeps mid-transaction registration impossible.
    pub fn add_listener(&self, listener: Arc<dyn CommitListener>) {
        self.listeners.write().push(listener);
    }

    /// Emits an event to every listener and subscriber.
    pub fn emit(&self, event: EngineEvent) {
        let sequence = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let sequenced = SequencedEvent {
            sequence,
            event: event.clone(),
        };

        {
            let mut history = self.history.write();
            history.push(sequenced.clone());
            if history.len() > self.max_history {
                let overflow = history.len() - self.max_history;
                history.drain(0..overflow);
            }
        }

        // Synchronous listeners first, then channels (drop the dead ones).
        let listeners: Vec<Arc<dyn CommitListener>> = self.listeners.read().clone();
        for listener in listeners {
            listener.on_event(&event);
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(sequenced.clone()).is_ok());
    }

    /// Returns events with sequence greater than `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<SequencedEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest emitted sequence number.
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().last().map(|e| e.sequence).unwrap_or(0)
    }

    /// Returns the number of active channel subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_meta::PersistenceId;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn event() -> EngineEvent {
        EngineEvent::ObjectCreated {
            key: ObjectKey::new(TypeId::new(1), PersistenceId::generate()),
            stamp: Timestamp::from_millis(5),
        }
    }

    #[test]
    fn emit_and_receive() {
        let bus = EventBus::new(100);
        let rx = bus.subscribe();

        let e = event();
        bus.emit(e.clone());

        let received = rx.recv_timeout(Duration::from_millis(100)).unwrap();
        assert_eq!(received.event, e);
        assert_eq!(received.sequence, 1);
    }

    #[test]
    fn multiple_subscribers_all_receive() {
        let bus = EventBus::new(100);
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        bus.emit(event());
        assert!(rx1.recv_timeout(Duration::from_millis(100)).is_ok());
        assert!(rx2.recv_timeout(Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn dead_subscriber_removed_on_emit() {
        let bus = EventBus::new(100);
        let rx = bus.subscribe();
        drop(rx);

        bus.emit(event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn sync_listener_runs_inline() {
        struct Counter(AtomicUsize);
        impl CommitListener for Counter {
            fn on_event(&self, _event: &EngineEvent) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let bus = EventBus::new(100);
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        bus.add_listener(counter.clone());

        bus.emit(event());
        bus.emit(event());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn poll_from_cursor() {
        let bus = EventBus::new(100);
        for _ in 0..5 {
            bus.emit(event());
        }

        let events = bus.poll(2, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence, 3);
    }

    #[test]
    fn history_bounded() {
        let bus = EventBus::new(3);
        for _ in 0..10 {
            bus.emit(event());
        }

        let events = bus.poll(0, 100);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].sequence, 8);
        assert_eq!(bus.latest_sequence(), 10);
    }
}
