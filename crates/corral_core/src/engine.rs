//! Engine facade wiring the core components together.

use crate::config::CoreConfig;
use crate::error::CoreResult;
use crate::events::{EngineEvent, EventBus, SequencedEvent};
use crate::lock::{LockTable, LockTracker};
use crate::ports::{CommitFanout, LockRelay};
use crate::stats::CoreStats;
use crate::transaction::{Propagation, Transaction, TransactionTracker};
use crate::types::NodeIndex;
use crate::version::{LogicalClock, ModificationCache, VersionLedger};
use corral_meta::{TypeId, TypeRegistry};
use corral_store::RowStore;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::debug;

/// One node's view of the shared object space.
///
/// Owns the version ledger, lock tracker, transaction tracker, recency
/// cache and event bus of a single process. Several engines sharing one
/// [`RowStore`] model several processes sharing one backing store; the
/// cluster layer connects them through the [`crate::ports`] traits.
pub struct Engine {
    store: Arc<dyn RowStore>,
    registry: Arc<TypeRegistry>,
    config: CoreConfig,
    stats: Arc<CoreStats>,
    events: Arc<EventBus>,
    cache: Arc<ModificationCache>,
    ledger: Arc<VersionLedger>,
    locks: Arc<LockTracker>,
    transactions: Arc<TransactionTracker>,
}

impl Engine {
    /// Creates an engine over a shared store and type registry.
    pub fn new(
        store: Arc<dyn RowStore>,
        registry: Arc<TypeRegistry>,
        config: CoreConfig,
    ) -> Self {
        let clock = Arc::new(LogicalClock::new());
        let stats = Arc::new(CoreStats::new());
        let events = Arc::new(EventBus::new(config.event_history));
        let cache = Arc::new(ModificationCache::new(
            config.recency_max_items,
            config.recency_max_age,
            Arc::clone(&stats),
        ));
        let ledger = Arc::new(VersionLedger::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&clock),
            Arc::clone(&cache),
            Arc::clone(&stats),
        ));
        let table = Arc::new(LockTable::new(Arc::clone(&registry), Arc::clone(&stats)));
        let locks = Arc::new(LockTracker::new(
            table,
            Arc::clone(&ledger),
            Arc::clone(&registry),
            Arc::clone(&stats),
            config.default_lock_timeout,
        ));
        let transactions = Arc::new(TransactionTracker::new(
            Arc::clone(&ledger),
            Arc::clone(&locks),
            Arc::clone(&events),
            Arc::clone(&stats),
            Arc::clone(&clock),
        ));

        Self {
            store,
            registry,
            config,
            stats,
            events,
            cache,
            ledger,
            locks,
            transactions,
        }
    }

    /// Returns the transaction tracker.
    #[must_use]
    pub fn transactions(&self) -> &TransactionTracker {
        &self.transactions
    }

    /// Returns the lock tracker.
    #[must_use]
    pub fn locks(&self) -> &LockTracker {
        &self.locks
    }

    /// Returns the version ledger.
    #[must_use]
    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the engine statistics.
    #[must_use]
    pub fn stats(&self) -> &CoreStats {
        &self.stats
    }

    /// Returns the type registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Subscribes a channel receiver to engine events.
    pub fn subscribe(&self) -> Receiver<SequencedEvent> {
        self.events.subscribe()
    }

    /// Sets this node's cluster index. Called by the coordinator on join,
    /// before any transaction takes locks.
    pub fn set_node_index(&self, node: NodeIndex) {
        self.locks.set_node_index(node);
    }

    /// Wires in the cross-process lock relay.
    pub fn set_lock_relay(&self, relay: Arc<dyn LockRelay>) {
        self.locks.set_relay(relay);
    }

    /// Wires in the commit-time invalidation fan-out.
    pub fn set_commit_fanout(&self, fanout: Arc<dyn CommitFanout>) {
        self.transactions.set_fanout(fanout);
    }

    /// Invalidates local caches for a type and its subtypes.
    ///
    /// Called when another node commits a change to the type.
    pub fn invalidate_type(&self, type_id: TypeId) -> CoreResult<()> {
        for member in self.registry.subtree(type_id)? {
            self.cache.remove_type(member);
        }
        self.stats.record_invalidation();
        self.events
            .emit(EngineEvent::CachesInvalidated {
                type_id: Some(type_id),
            });
        debug!(%type_id, "type caches invalidated");
        Ok(())
    }

    /// Invalidates every local cache unconditionally.
    ///
    /// Required when a node restarts from scratch: no continuity of server
    /// identity may be assumed, so nothing cached stays trustworthy.
    pub fn invalidate_all(&self) {
        self.cache.clear();
        self.stats.record_invalidation();
        self.events
            .emit(EngineEvent::CachesInvalidated { type_id: None });
        debug!("all caches invalidated");
    }

    /// Runs a closure inside a `Required` transaction, committing on
    /// success and rolling back on error (scoped acquisition discipline).
    pub fn run_in_transaction<F, R>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&Transaction) -> CoreResult<R>,
    {
        let txn = self
            .transactions
            .get(Propagation::Required)
            .expect("required propagation always yields a transaction");
        self.transactions.begin(&txn)?;
        match f(&txn) {
            Ok(result) => {
                self.transactions.commit(&txn)?;
                Ok(result)
            }
            Err(err) => {
                self.transactions.rollback(&txn)?;
                Err(err)
            }
        }
    }
}
