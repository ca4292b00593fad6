//! Transaction state.

use crate::error::{CoreError, CoreResult};
use crate::session::SessionInfo;
use crate::types::{Timestamp, TransactionId};
use crate::version::{LogicalClock, VersionRecord};
use corral_meta::ObjectKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Transaction propagation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Reuse the thread's ambient transaction, creating one if absent.
    Required,
    /// Always create a fresh independent transaction, suspending any
    /// ambient one.
    New,
    /// Return the ambient transaction, or nothing. Never creates.
    Optional,
}

/// Per-transaction operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounters {
    /// Select operations issued.
    pub selects: u64,
    /// Insert operations recorded.
    pub inserts: u64,
    /// Update operations recorded.
    pub updates: u64,
    /// Delete operations recorded.
    pub deletes: u64,
    /// Schema operations triggered.
    pub schema_ops: u64,
}

/// A buffered write, invisible to other transactions until commit.
#[derive(Debug, Clone)]
pub enum PendingOp {
    /// First version of an object.
    Create {
        /// The payload to store.
        payload: Vec<u8>,
        /// Payload digest, for no-op save detection.
        digest: [u8; 32],
    },
    /// Replacement version of an object.
    Update {
        /// The payload to store.
        payload: Vec<u8>,
        /// Payload digest, for no-op save detection.
        digest: [u8; 32],
    },
    /// Close the current version with no successor.
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Committed,
    RolledBack,
}

#[derive(Debug)]
struct TxnInner {
    depth: u32,
    rollback_only: bool,
    completion: Option<Completion>,
    snapshot: Option<Timestamp>,
    writes: HashMap<ObjectKey, PendingOp>,
    counters: OpCounters,
    session: SessionInfo,
}

#[derive(Debug)]
pub(crate) struct TxnShared {
    id: TransactionId,
    owner: ThreadId,
    inner: Mutex<TxnInner>,
}

/// Handle onto one transaction.
///
/// Handles are cheap to clone and all refer to the same underlying record;
/// `Required` propagation hands out clones of the ambient handle, which is
/// what makes "the identical transaction" observable. A transaction belongs
/// to the thread that created it - use from any other thread is a fatal
/// programming error.
#[derive(Debug, Clone)]
pub struct Transaction {
    shared: Arc<TxnShared>,
}

impl Transaction {
    pub(crate) fn create(id: TransactionId, session: SessionInfo) -> Self {
        Self {
            shared: Arc::new(TxnShared {
                id,
                owner: thread::current().id(),
                inner: Mutex::new(TxnInner {
                    depth: 0,
                    rollback_only: false,
                    completion: None,
                    snapshot: None,
                    writes: HashMap::new(),
                    counters: OpCounters::default(),
                    session,
                }),
            }),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.shared.id
    }

    /// Returns true if both handles refer to the same transaction.
    #[must_use]
    pub fn same(&self, other: &Transaction) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Returns the current nesting depth.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.shared.inner.lock().depth
    }

    /// Returns true if a rollback has poisoned this transaction.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.shared.inner.lock().rollback_only
    }

    /// Returns true while the transaction has neither committed nor rolled
    /// back physically.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.inner.lock().completion.is_none()
    }

    /// Returns true once the transaction committed physically.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.shared.inner.lock().completion == Some(Completion::Committed)
    }

    /// Returns true once the transaction rolled back physically.
    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.shared.inner.lock().completion == Some(Completion::RolledBack)
    }

    /// Returns a copy of the session info.
    #[must_use]
    pub fn session(&self) -> SessionInfo {
        self.shared.inner.lock().session.clone()
    }

    /// Sets a session parameter, for contention diagnostics.
    pub fn set_session_param(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> CoreResult<()> {
        self.ensure_owner()?;
        self.shared.inner.lock().session.set(name, value);
        Ok(())
    }

    /// Returns a copy of the per-transaction operation counters.
    #[must_use]
    pub fn counters(&self) -> OpCounters {
        self.shared.inner.lock().counters
    }

    /// Rejects use from any thread but the owner.
    pub(crate) fn ensure_owner(&self) -> CoreResult<()> {
        if thread::current().id() == self.shared.owner {
            Ok(())
        } else {
            Err(CoreError::WrongThread {
                txn: self.shared.id,
            })
        }
    }

    /// Rejects operations outside an active `begin`/`commit` span.
    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        let inner = self.shared.inner.lock();
        if inner.completion.is_some() || inner.depth == 0 {
            Err(CoreError::TransactionClosed {
                txn: self.shared.id,
            })
        } else {
            Ok(())
        }
    }

    pub(crate) fn enter(&self) -> u32 {
        let mut inner = self.shared.inner.lock();
        inner.depth += 1;
        inner.depth
    }

    pub(crate) fn exit(&self) -> u32 {
        let mut inner = self.shared.inner.lock();
        inner.depth = inner.depth.saturating_sub(1);
        inner.depth
    }

    pub(crate) fn poison(&self) {
        self.shared.inner.lock().rollback_only = true;
    }

    pub(crate) fn complete_committed(&self) {
        self.shared.inner.lock().completion = Some(Completion::Committed);
    }

    pub(crate) fn complete_rolled_back(&self) {
        self.shared.inner.lock().completion = Some(Completion::RolledBack);
    }

    /// Pins the read snapshot at the first read, not transaction start.
    pub(crate) fn snapshot_or(&self, clock: &LogicalClock) -> Timestamp {
        let mut inner = self.shared.inner.lock();
        match inner.snapshot {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = clock.now();
                inner.snapshot = Some(snapshot);
                snapshot
            }
        }
    }

    pub(crate) fn pending_op(&self, key: &ObjectKey) -> Option<PendingOp> {
        self.shared.inner.lock().writes.get(key).cloned()
    }

    pub(crate) fn put_pending(&self, key: ObjectKey, op: PendingOp) {
        self.shared.inner.lock().writes.insert(key, op);
    }

    pub(crate) fn drop_pending(&self, key: &ObjectKey) {
        self.shared.inner.lock().writes.remove(key);
    }

    pub(crate) fn take_writes(&self) -> Vec<(ObjectKey, PendingOp)> {
        self.shared.inner.lock().writes.drain().collect()
    }

    pub(crate) fn count_select(&self) {
        self.shared.inner.lock().counters.selects += 1;
    }

    pub(crate) fn count_insert(&self) {
        self.shared.inner.lock().counters.inserts += 1;
    }

    pub(crate) fn count_update(&self) {
        self.shared.inner.lock().counters.updates += 1;
    }

    pub(crate) fn count_delete(&self) {
        self.shared.inner.lock().counters.deletes += 1;
    }

    pub(crate) fn count_schema(&self) {
        self.shared.inner.lock().counters.schema_ops += 1;
    }

    pub(crate) fn bind_reading(&self, value: Option<VersionRecord>) -> Reading {
        Reading {
            txn: Arc::downgrade(&self.shared),
            txn_id: self.shared.id,
            owner: self.shared.owner,
            value,
        }
    }
}

/// A read result bound to its originating transaction.
///
/// While that transaction is still open, the value may only be touched on
/// the owning thread; afterwards it is freely usable. This catches results
/// leaking out of one unit of work into another.
#[derive(Debug)]
pub struct Reading {
    txn: Weak<TxnShared>,
    txn_id: TransactionId,
    owner: ThreadId,
    value: Option<VersionRecord>,
}

impl Reading {
    /// Returns the read version, or `None` for an absent object.
    pub fn get(&self) -> CoreResult<Option<&VersionRecord>> {
        if let Some(shared) = self.txn.upgrade() {
            let open = shared.inner.lock().completion.is_none();
            if open && thread::current().id() != self.owner {
                return Err(CoreError::ResultOutsideTransaction { txn: self.txn_id });
            }
        }
        Ok(self.value.as_ref())
    }

    /// Returns the version stamp of the read, if the object existed.
    pub fn stamp(&self) -> CoreResult<Option<Timestamp>> {
        Ok(self.get()?.map(|record| record.stamp))
    }

    /// Returns the transaction that produced this reading.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.txn_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> Transaction {
        Transaction::create(TransactionId::new(1), SessionInfo::new())
    }

    #[test]
    fn fresh_transaction_is_idle() {
        let t = txn();
        assert_eq!(t.depth(), 0);
        assert!(t.is_open());
        assert!(!t.is_rollback_only());
        assert!(t.ensure_active().is_err());
    }

    #[test]
    fn enter_exit_track_depth() {
        let t = txn();
        assert_eq!(t.enter(), 1);
        assert_eq!(t.enter(), 2);
        assert_eq!(t.exit(), 1);
        assert_eq!(t.exit(), 0);
    }

    #[test]
    fn clones_are_same_transaction() {
        let t = txn();
        let u = t.clone();
        assert!(t.same(&u));
        assert!(!t.same(&txn()));
    }

    #[test]
    fn wrong_thread_rejected() {
        let t = txn();
        let handle = std::thread::spawn(move || t.ensure_owner());
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(CoreError::WrongThread { .. })));
    }

    #[test]
    fn snapshot_pinned_at_first_call() {
        let clock = LogicalClock::new();
        let t = txn();
        let first = t.snapshot_or(&clock);
        clock.now();
        assert_eq!(t.snapshot_or(&clock), first);
    }

    #[test]
    fn reading_blocked_on_foreign_thread_while_open() {
        let t = txn();
        t.enter();
        let reading = t.bind_reading(None);

        let handle = std::thread::spawn(move || {
            let err = reading.get().unwrap_err();
            matches!(err, CoreError::ResultOutsideTransaction { .. })
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn reading_free_once_transaction_closed() {
        let t = txn();
        t.enter();
        let reading = t.bind_reading(None);
        t.complete_committed();

        let handle = std::thread::spawn(move || reading.get().map(|v| v.is_none()));
        assert!(handle.join().unwrap().unwrap());
    }
}
