//! The transaction tracker.

use crate::error::{CoreError, CoreResult};
use crate::events::{EngineEvent, EventBus};
use crate::lock::LockTracker;
use crate::ports::CommitFanout;
use crate::session::SessionInfo;
use crate::stats::CoreStats;
use crate::transaction::state::{Propagation, Transaction};
use crate::types::TransactionId;
use crate::version::{ChangeKind, LogicalClock, VersionLedger};
use corral_meta::TypeId;
use parking_lot::RwLock;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Ambient transaction stacks, one per tracker on this thread.
    static AMBIENT: RefCell<HashMap<u64, Vec<Transaction>>> = RefCell::new(HashMap::new());
    /// Set while commit notifications run, so a listener's own transaction
    /// cannot re-enter notification.
    static IN_NOTIFICATION: Cell<bool> = const { Cell::new(false) };
}

/// Thread-scoped unit-of-work management.
///
/// Logical nesting is a depth counter on one transaction record; the
/// physical unit begins at depth 0→1 and commits or rolls back exactly once
/// when the depth returns to zero. A rollback at any depth sticks: the
/// outermost commit then rolls back physically instead.
pub struct TransactionTracker {
    ledger: Arc<VersionLedger>,
    locks: Arc<LockTracker>,
    events: Arc<EventBus>,
    stats: Arc<CoreStats>,
    clock: Arc<LogicalClock>,
    fanout: RwLock<Option<Arc<dyn CommitFanout>>>,
    scope: u64,
    next_txn: AtomicU64,
    open_gauge: AtomicU64,
}

impl TransactionTracker {
    /// Creates a tracker wired to the given collaborators.
    pub fn new(
        ledger: Arc<VersionLedger>,
        locks: Arc<LockTracker>,
        events: Arc<EventBus>,
        stats: Arc<CoreStats>,
        clock: Arc<LogicalClock>,
    ) -> Self {
        Self {
            ledger,
            locks,
            events,
            stats,
            clock,
            fanout: RwLock::new(None),
            scope: NEXT_SCOPE.fetch_add(1, Ordering::SeqCst),
            next_txn: AtomicU64::new(1),
            open_gauge: AtomicU64::new(0),
        }
    }

    /// Wires in the cluster's commit fan-out.
    pub fn set_fanout(&self, fanout: Arc<dyn CommitFanout>) {
        *self.fanout.write() = Some(fanout);
    }

    /// Returns a transaction per the propagation contract.
    ///
    /// `Required` returns the thread's ambient transaction, creating one if
    /// none exists; `New` always creates a fresh independent transaction,
    /// suspending the ambient one; `Optional` returns the ambient one or
    /// `None` and never creates.
    pub fn get(&self, propagation: Propagation) -> Option<Transaction> {
        match propagation {
            Propagation::Required => Some(
                self.ambient()
                    .unwrap_or_else(|| self.create_and_push()),
            ),
            Propagation::New => Some(self.create_and_push()),
            Propagation::Optional => self.ambient(),
        }
    }

    /// Opens a nesting level; depth 0→1 starts the physical unit of work.
    pub fn begin(&self, txn: &Transaction) -> CoreResult<()> {
        txn.ensure_owner()?;
        if !txn.is_open() {
            return Err(CoreError::TransactionClosed { txn: txn.id() });
        }
        let depth = txn.enter();
        if depth == 1 {
            self.stats.record_transaction_start();
            self.open_gauge.fetch_add(1, Ordering::SeqCst);
            debug!(txn = %txn.id(), "transaction begun");
        }
        Ok(())
    }

    /// Closes a nesting level; at depth zero the transaction commits
    /// physically, unless a rollback at any level poisoned it, in which
    /// case it rolls back physically instead.
    pub fn commit(&self, txn: &Transaction) -> CoreResult<()> {
        txn.ensure_owner()?;
        txn.ensure_active()?;
        if txn.exit() > 0 {
            return Ok(());
        }
        if txn.is_rollback_only() {
            self.finish_rollback(txn);
            Ok(())
        } else {
            self.finish_commit(txn)
        }
    }

    /// Closes a nesting level and poisons the transaction: regardless of
    /// depth, the physical outcome is now a rollback.
    pub fn rollback(&self, txn: &Transaction) -> CoreResult<()> {
        txn.ensure_owner()?;
        txn.ensure_active()?;
        txn.poison();
        if txn.exit() == 0 {
            self.finish_rollback(txn);
        }
        Ok(())
    }

    /// Returns the number of physically open transactions on this tracker.
    #[must_use]
    pub fn open_transactions(&self) -> u64 {
        self.open_gauge.load(Ordering::SeqCst)
    }

    fn create_and_push(&self) -> Transaction {
        let id = TransactionId::new(self.next_txn.fetch_add(1, Ordering::SeqCst));
        let txn = Transaction::create(id, SessionInfo::new());
        AMBIENT.with(|ambient| {
            ambient
                .borrow_mut()
                .entry(self.scope)
                .or_default()
                .push(txn.clone());
        });
        txn
    }

    fn ambient(&self) -> Option<Transaction> {
        AMBIENT.with(|ambient| {
            ambient
                .borrow()
                .get(&self.scope)
                .and_then(|stack| stack.last().cloned())
        })
    }

    fn pop_ambient(&self, txn: &Transaction) {
        AMBIENT.with(|ambient| {
            let mut ambient = ambient.borrow_mut();
            if let Some(stack) = ambient.get_mut(&self.scope) {
                stack.retain(|t| !t.same(txn));
                if stack.is_empty() {
                    ambient.remove(&self.scope);
                }
            }
        });
    }

    fn finish_commit(&self, txn: &Transaction) -> CoreResult<()> {
        let writes = txn.take_writes();
        let mut types: Vec<TypeId> = writes.iter().map(|(key, _)| key.type_id).collect();
        types.sort();
        types.dedup();

        let guard = NotificationGuard::enter();
        if guard.is_some() {
            self.events.emit(EngineEvent::Committing { txn: txn.id() });
        }

        // Fan-out goes first: a node whose server link is dead must fail
        // the commit rather than silently succeed.
        if !types.is_empty() {
            if let Some(fanout) = self.fanout.read().clone() {
                if let Err(err) = fanout.content_changed(&types) {
                    drop(guard);
                    self.finish_rollback(txn);
                    return Err(err);
                }
            }
        }

        let commit_ts = self.clock.now();
        let changes = match self.ledger.apply(txn.id(), writes, commit_ts) {
            Ok(changes) => changes,
            Err(err) => {
                drop(guard);
                self.finish_rollback(txn);
                return Err(err);
            }
        };

        txn.complete_committed();
        self.stats.record_transaction_commit();
        self.open_gauge.fetch_sub(1, Ordering::SeqCst);

        if guard.is_some() {
            for change in &changes {
                let event = match change.kind {
                    ChangeKind::Created => EngineEvent::ObjectCreated {
                        key: change.key,
                        stamp: change.stamp,
                    },
                    ChangeKind::Modified => EngineEvent::ObjectModified {
                        key: change.key,
                        stamp: change.stamp,
                    },
                    ChangeKind::Removed => EngineEvent::ObjectRemoved {
                        key: change.key,
                        stamp: change.stamp,
                    },
                };
                self.events.emit(event);
            }
            self.events.emit(EngineEvent::Committed { txn: txn.id() });
        }
        drop(guard);

        debug!(txn = %txn.id(), stamp = %commit_ts, "transaction committed");
        self.locks.release_all(txn)?;
        self.pop_ambient(txn);
        Ok(())
    }

    fn finish_rollback(&self, txn: &Transaction) {
        drop(txn.take_writes());
        txn.complete_rolled_back();
        self.stats.record_transaction_rollback();
        self.open_gauge.fetch_sub(1, Ordering::SeqCst);

        let guard = NotificationGuard::enter();
        if guard.is_some() {
            self.events.emit(EngineEvent::RolledBack { txn: txn.id() });
        }
        drop(guard);

        debug!(txn = %txn.id(), "transaction rolled back");
        // Rollback paths must always release; relay failures are logged by
        // the tracker rather than masking the caller's outcome.
        if let Err(err) = self.locks.release_all(txn) {
            tracing::warn!(txn = %txn.id(), %err, "lock release after rollback failed");
        }
        self.pop_ambient(txn);
    }
}

/// RAII flag marking "inside commit notification" on this thread.
struct NotificationGuard;

impl NotificationGuard {
    /// Enters the notification scope, or returns `None` if already inside
    /// (a listener's own transaction committing must stay silent).
    fn enter() -> Option<NotificationGuard> {
        IN_NOTIFICATION.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(NotificationGuard)
            }
        })
    }
}

impl Drop for NotificationGuard {
    fn drop(&mut self) {
        IN_NOTIFICATION.with(|flag| flag.set(false));
    }
}
