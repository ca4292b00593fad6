//! The process-facing lock tracker.

use crate::error::{CoreError, CoreResult};
use crate::lock::table::LockTable;
use crate::lock::{HolderId, LockMode};
use crate::ports::LockRelay;
use crate::stats::CoreStats;
use crate::transaction::Transaction;
use crate::types::{LockTarget, NodeIndex, Timestamp};
use crate::version::VersionLedger;
use corral_meta::TypeRegistry;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Acquires and releases locks on behalf of transactions.
///
/// Wraps the local [`LockTable`] arena and, when a relay is wired in,
/// mirrors every acquisition at the cluster's server arbiter so locks are
/// visible to all nodes sharing the store.
pub struct LockTracker {
    table: Arc<LockTable>,
    ledger: Arc<VersionLedger>,
    registry: Arc<TypeRegistry>,
    stats: Arc<CoreStats>,
    node: AtomicU32,
    relay: RwLock<Option<Arc<dyn LockRelay>>>,
    default_timeout: Option<Duration>,
}

impl LockTracker {
    /// Creates a tracker over the given arena and ledger.
    pub fn new(
        table: Arc<LockTable>,
        ledger: Arc<VersionLedger>,
        registry: Arc<TypeRegistry>,
        stats: Arc<CoreStats>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            table,
            ledger,
            registry,
            stats,
            node: AtomicU32::new(0),
            relay: RwLock::new(None),
            default_timeout,
        }
    }

    /// Sets the node index used to qualify holders cluster-wide.
    ///
    /// Must happen before the first transaction acquires a lock; the
    /// coordinator calls this during join.
    pub fn set_node_index(&self, node: NodeIndex) {
        self.node.store(node.as_u32(), Ordering::SeqCst);
    }

    /// Wires in the cross-process relay.
    pub fn set_relay(&self, relay: Arc<dyn LockRelay>) {
        *self.relay.write() = Some(relay);
    }

    /// Acquires an exclusive lock.
    ///
    /// Reentrant per holding transaction; each call needs a matching
    /// [`LockTracker::unlock`]. `None` blocks until the configured default
    /// timeout, or indefinitely when none is configured.
    pub fn lock(
        &self,
        txn: &Transaction,
        target: LockTarget,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        self.acquire(txn, target, LockMode::Exclusive, timeout)
    }

    /// Acquires a shared (read-only) lock.
    pub fn lock_read_only(
        &self,
        txn: &Transaction,
        target: LockTarget,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        self.acquire(txn, target, LockMode::Shared, timeout)
    }

    /// Releases one acquisition. Unlocking an unheld target is a no-op.
    pub fn unlock(&self, txn: &Transaction, target: LockTarget) -> CoreResult<()> {
        txn.ensure_owner()?;
        let holder = self.holder(txn);
        self.table.release(holder, &target)?;
        if let Some(relay) = self.relay.read().clone() {
            relay.release(holder, &target)?;
        }
        Ok(())
    }

    /// Acquires an exclusive lock and verifies the caller's copy is still
    /// current, consulting the recency cache before going physical.
    ///
    /// `reference` is the version stamp the caller last read
    /// ([`Timestamp::ZERO`] for a never-persisted object); for a type
    /// target it is the point in time since which no instance of the type
    /// or its subtypes may have changed. On mismatch the acquisition is
    /// undone and a concurrent-modification error raised, leaving no lock
    /// held.
    pub fn lock_ensure_current(
        &self,
        txn: &Transaction,
        target: LockTarget,
        reference: Timestamp,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        self.acquire(txn, target, LockMode::Exclusive, timeout)?;

        let current = match target {
            LockTarget::Object(key) => {
                match self.ledger.cache().check_object(key, reference) {
                    Some(answer) => answer,
                    None => self.ledger.is_current(key, reference)?,
                }
            }
            LockTarget::Type(type_id) => {
                let subtree = self.registry.subtree(type_id)?;
                match self.ledger.cache().check_type_set(&subtree, reference) {
                    Some(answer) => answer,
                    None => self.ledger.latest_change(&subtree)? <= reference,
                }
            }
        };

        if !current {
            debug!(%target, %reference, "currency check failed, dropping lock");
            self.unlock(txn, target)?;
            return Err(CoreError::ConcurrentModification { target });
        }
        Ok(())
    }

    /// Releases everything the transaction still holds, locally and at the
    /// server. Called by the transaction tracker on physical completion.
    pub(crate) fn release_all(&self, txn: &Transaction) -> CoreResult<()> {
        let holder = self.holder(txn);
        let freed = self.table.release_all(holder);
        if freed > 0 {
            debug!(%holder, freed, "released remaining locks");
        }
        if let Some(relay) = self.relay.read().clone() {
            relay.release_all(holder)?;
        }
        Ok(())
    }

    /// Returns the cluster-wide holder id of a transaction.
    #[must_use]
    pub fn holder(&self, txn: &Transaction) -> HolderId {
        HolderId::new(NodeIndex::new(self.node.load(Ordering::SeqCst)), txn.id())
    }

    /// Returns the underlying arena (for tests and diagnostics).
    #[must_use]
    pub fn table(&self) -> &LockTable {
        &self.table
    }

    fn acquire(
        &self,
        txn: &Transaction,
        target: LockTarget,
        mode: LockMode,
        timeout: Option<Duration>,
    ) -> CoreResult<()> {
        txn.ensure_owner()?;
        txn.ensure_active()?;
        let holder = self.holder(txn);
        let session = txn.session();
        let effective = timeout.or(self.default_timeout);

        self.table
            .acquire(holder, &session, target, mode, effective)?;

        if let Some(relay) = self.relay.read().clone() {
            if let Err(err) = relay.acquire(holder, &target, mode, effective, &session) {
                // Remote denial: the local grant must not survive.
                self.table.release(holder, &target)?;
                if matches!(err, CoreError::LockTimeout { .. }) {
                    self.stats.record_lock_timeout();
                }
                return Err(err);
            }
        }
        Ok(())
    }
}
