//! Engine statistics and telemetry.
//!
//! Atomic counters read by the (external) monitoring subsystem. All values
//! are monotonically increasing; point-in-time reads while operations are
//! in progress are fine.

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics.
#[derive(Debug, Default)]
pub struct CoreStats {
    // Operation counters
    selects: AtomicU64,
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    schema_ops: AtomicU64,
    noop_saves: AtomicU64,

    // Transaction counters
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,

    // Lock counters
    lock_waits: AtomicU64,
    lock_timeouts: AtomicU64,

    // Recency cache counters
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    physical_checks: AtomicU64,

    // Cluster counters
    invalidations: AtomicU64,
}

impl CoreStats {
    /// Creates a zeroed stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_select(&self) {
        self.selects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_schema_op(&self) {
        self.schema_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_noop_save(&self) {
        self.noop_saves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_rollback(&self) {
        self.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_physical_check(&self) {
        self.physical_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the total number of select operations.
    pub fn selects(&self) -> u64 {
        self.selects.load(Ordering::Relaxed)
    }

    /// Returns the total number of insert operations.
    pub fn inserts(&self) -> u64 {
        self.inserts.load(Ordering::Relaxed)
    }

    /// Returns the total number of update operations.
    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Returns the total number of delete operations.
    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Returns the total number of schema operations.
    pub fn schema_ops(&self) -> u64 {
        self.schema_ops.load(Ordering::Relaxed)
    }

    /// Returns the number of saves skipped because nothing changed.
    pub fn noop_saves(&self) -> u64 {
        self.noop_saves.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the total number of transactions rolled back.
    pub fn transactions_rolled_back(&self) -> u64 {
        self.transactions_rolled_back.load(Ordering::Relaxed)
    }

    /// Returns the number of lock requests that had to wait.
    pub fn lock_waits(&self) -> u64 {
        self.lock_waits.load(Ordering::Relaxed)
    }

    /// Returns the number of lock requests that timed out.
    pub fn lock_timeouts(&self) -> u64 {
        self.lock_timeouts.load(Ordering::Relaxed)
    }

    /// Returns the number of recency-cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of recency-cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    /// Returns the number of physical currency checks performed.
    pub fn physical_checks(&self) -> u64 {
        self.physical_checks.load(Ordering::Relaxed)
    }

    /// Returns the number of cache invalidations applied.
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            selects: self.selects(),
            inserts: self.inserts(),
            updates: self.updates(),
            deletes: self.deletes(),
            schema_ops: self.schema_ops(),
            noop_saves: self.noop_saves(),
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_rolled_back: self.transactions_rolled_back(),
            lock_waits: self.lock_waits(),
            lock_timeouts: self.lock_timeouts(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            physical_checks: self.physical_checks(),
            invalidations: self.invalidations(),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
///
/// Unlike [`CoreStats`], this is a plain struct that can be compared or
/// passed across threads without atomics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub selects: u64,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub schema_ops: u64,
    pub noop_saves: u64,
    pub transactions_started: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
    pub lock_waits: u64,
    pub lock_timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub physical_checks: u64,
    pub invalidations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = CoreStats::new();
        assert_eq!(stats.selects(), 0);
        assert_eq!(stats.transactions_committed(), 0);
    }

    #[test]
    fn counters_accumulate() {
        let stats = CoreStats::new();
        stats.record_select();
        stats.record_select();
        stats.record_insert();
        stats.record_cache_hit();

        assert_eq!(stats.selects(), 2);
        assert_eq!(stats.inserts(), 1);
        assert_eq!(stats.cache_hits(), 1);
    }

    #[test]
    fn snapshot_copies_counters() {
        let stats = CoreStats::new();
        stats.record_update();
        stats.record_lock_timeout();

        let snap = stats.snapshot();
        assert_eq!(snap.updates, 1);
        assert_eq!(snap.lock_timeouts, 1);
        assert_eq!(snap.selects, 0);
    }
}
