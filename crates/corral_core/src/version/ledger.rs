//! The bitemporal version ledger.

use crate::error::{CoreError, CoreResult};
use crate::stats::CoreStats;
use crate::transaction::{PendingOp, Reading, Transaction};
use crate::types::{Timestamp, TransactionId};
use crate::version::clock::LogicalClock;
use crate::version::recency::ModificationCache;
use corral_meta::{ObjectKey, TypeId, TypeRegistry};
use corral_store::{Filter, Predicate, Row, RowId, RowStore, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

const COL_PID: &str = "pid";
const COL_VALID_FROM: &str = "valid_from";
const COL_VALID_TO: &str = "valid_to";
const COL_WRITER: &str = "writer";
const COL_DIGEST: &str = "digest";
const COL_PAYLOAD: &str = "payload";

/// One materialized object version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    /// The stored payload.
    pub payload: Vec<u8>,
    /// Version stamp (the row's `valid_from`). [`Timestamp::ZERO`] marks an
    /// uncommitted pending write seen by its own transaction.
    pub stamp: Timestamp,
    /// Transaction that produced the row.
    pub writer: TransactionId,
}

/// Kind of change applied at commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// First version of the object.
    Created,
    /// New current version of an existing object.
    Modified,
    /// Current version closed with no successor.
    Removed,
}

/// One change applied by a physical commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    /// Key of the changed object.
    pub key: ObjectKey,
    /// What happened to it.
    pub kind: ChangeKind,
    /// Commit stamp of the change.
    pub stamp: Timestamp,
}

/// Maintains the bitemporal validity window of each persisted object.
///
/// Writes are buffered in the issuing transaction and applied physically at
/// commit; saves carry the caller's known version stamp so staleness is
/// caught optimistically at record time and again at apply time. Exactly one
/// row per persistence id has a null `valid_to` at any instant, or zero
/// once the object is removed.
pub struct VersionLedger {
    store: Arc<dyn RowStore>,
    registry: Arc<TypeRegistry>,
    clock: Arc<LogicalClock>,
    cache: Arc<ModificationCache>,
    stats: Arc<CoreStats>,
}

impl VersionLedger {
    /// Creates a ledger over the shared store.
    pub fn new(
        store: Arc<dyn RowStore>,
        registry: Arc<TypeRegistry>,
        clock: Arc<LogicalClock>,
        cache: Arc<ModificationCache>,
        stats: Arc<CoreStats>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            cache,
            stats,
        }
    }

    /// Records the first version of an object in the transaction.
    pub fn record_create(
        &self,
        txn: &Transaction,
        key: ObjectKey,
        payload: Vec<u8>,
    ) -> CoreResult<()> {
        txn.ensure_owner()?;
        txn.ensure_active()?;

        match txn.pending_op(&key) {
            Some(PendingOp::Remove) => return Err(CoreError::ObjectRemoved { key }),
            Some(_) => return Err(CoreError::DuplicateObject { key }),
            None => {}
        }

        let table = self.registry.table_of(key.type_id)?;
        if self.store.ensure_table(&table)? {
            txn.count_schema();
            self.stats.record_schema_op();
        }

        if self.fetch_current(&table, &key)?.is_some() {
            return Err(CoreError::DuplicateObject { key });
        }
        if !self.fetch_history(&table, &key)?.is_empty() {
            return Err(CoreError::ObjectRemoved { key });
        }

        let digest = payload_digest(&payload);
        txn.put_pending(key, PendingOp::Create { payload, digest });
        txn.count_insert();
        self.stats.record_insert();
        Ok(())
    }

    /// Records a new version of an object, validating the caller's copy.
    ///
    /// Returns `false` without buffering anything when the payload is
    /// byte-identical to the current version - such a save issues zero
    /// physical writes.
    pub fn record_update(
        &self,
        txn: &Transaction,
        key: ObjectKey,
        payload: Vec<u8>,
        known: Timestamp,
    ) -> CoreResult<bool> {
        txn.ensure_owner()?;
        txn.ensure_active()?;

        let digest = payload_digest(&payload);

        match txn.pending_op(&key) {
            Some(PendingOp::Remove) => return Err(CoreError::ObjectRemoved { key }),
            Some(PendingOp::Create { digest: prev, .. }) => {
                if prev == digest {
                    self.stats.record_noop_save();
                    return Ok(false);
                }
                // Still unsaved: fold into the pending create.
                txn.put_pending(key, PendingOp::Create { payload, digest });
                txn.count_update();
                self.stats.record_update();
                return Ok(true);
            }
            Some(PendingOp::Update { digest: prev, .. }) => {
                if prev == digest {
                    self.stats.record_noop_save();
                    return Ok(false);
                }
                txn.put_pending(key, PendingOp::Update { payload, digest });
                txn.count_update();
                self.stats.record_update();
                return Ok(true);
            }
            None => {}
        }

        let table = self.registry.table_of(key.type_id)?;
        let current = self.require_current(&table, &key)?;
        if current.stamp != known {
            return Err(CoreError::ConcurrentModification {
                target: crate::types::LockTarget::Object(key),
            });
        }
        if row_digest(&current.row) == Some(digest) {
            self.stats.record_noop_save();
            return Ok(false);
        }

        txn.put_pending(key, PendingOp::Update { payload, digest });
        txn.count_update();
        self.stats.record_update();
        Ok(true)
    }

    /// Records the removal of an object, validating the caller's copy.
    ///
    /// Removal closes the current version and opens none; it is terminal.
    pub fn record_remove(
        &self,
        txn: &Transaction,
        key: ObjectKey,
        known: Timestamp,
    ) -> CoreResult<()> {
        txn.ensure_owner()?;
        txn.ensure_active()?;

        match txn.pending_op(&key) {
            Some(PendingOp::Remove) => return Err(CoreError::ObjectRemoved { key }),
            Some(PendingOp::Create { .. }) => {
                // Never persisted: dropping the pending create removes it.
                txn.drop_pending(&key);
                txn.count_delete();
                self.stats.record_delete();
                return Ok(());
            }
            Some(PendingOp::Update { .. }) => {
                txn.put_pending(key, PendingOp::Remove);
                txn.count_delete();
                self.stats.record_delete();
                return Ok(());
            }
            None => {}
        }

        let table = self.registry.table_of(key.type_id)?;
        let current = self.require_current(&table, &key)?;
        if current.stamp != known {
            return Err(CoreError::ConcurrentModification {
                target: crate::types::LockTarget::Object(key),
            });
        }

        txn.put_pending(key, PendingOp::Remove);
        txn.count_delete();
        self.stats.record_delete();
        Ok(())
    }

    /// Reads an object within a transaction.
    ///
    /// The transaction sees its own pending writes; otherwise the read is
    /// served as of the transaction's snapshot, which is pinned at the
    /// *first* read, not at transaction start. The result stays bound to
    /// the transaction while it is open.
    pub fn read_in(&self, txn: &Transaction, key: ObjectKey) -> CoreResult<Reading> {
        txn.ensure_owner()?;
        txn.ensure_active()?;
        txn.count_select();
        self.stats.record_select();

        match txn.pending_op(&key) {
            Some(PendingOp::Create { payload, .. }) | Some(PendingOp::Update { payload, .. }) => {
                return Ok(txn.bind_reading(Some(VersionRecord {
                    payload,
                    stamp: Timestamp::ZERO,
                    writer: txn.id(),
                })));
            }
            Some(PendingOp::Remove) => return Ok(txn.bind_reading(None)),
            None => {}
        }

        let snapshot = txn.snapshot_or(&self.clock);
        let record = self.fetch_as_of(key, snapshot)?;
        Ok(txn.bind_reading(record))
    }

    /// Reads the authoritative current version of an object.
    pub fn read_current(&self, key: ObjectKey) -> CoreResult<Option<VersionRecord>> {
        self.stats.record_select();
        let table = self.registry.table_of(key.type_id)?;
        Ok(self.fetch_current(&table, &key)?.map(|c| c.record))
    }

    /// Reads the version of an object that was current at `at`.
    ///
    /// Deterministic and idempotent for a fixed timestamp once the
    /// producing transaction has committed.
    pub fn read_as_of(&self, key: ObjectKey, at: Timestamp) -> CoreResult<Option<VersionRecord>> {
        self.stats.record_select();
        self.fetch_as_of(key, at)
    }

    /// Physically checks whether `known` is the object's current stamp.
    ///
    /// A caller holding a never-persisted object passes
    /// [`Timestamp::ZERO`]; that is current exactly when no committed
    /// version exists. Any other stamp fails once the object was removed
    /// or rewritten: a stale copy can never pass.
    pub fn is_current(&self, key: ObjectKey, known: Timestamp) -> CoreResult<bool> {
        self.stats.record_physical_check();
        let table = self.registry.table_of(key.type_id)?;
        Ok(match self.fetch_current(&table, &key)? {
            Some(current) => current.stamp == known,
            None => known == Timestamp::ZERO && self.fetch_history(&table, &key)?.is_empty(),
        })
    }

    /// Returns the latest modification stamp across the given types.
    ///
    /// Both openings and closings of version windows count as
    /// modifications. Returns [`Timestamp::ZERO`] when nothing was ever
    /// written.
    pub fn latest_change(&self, types: &[TypeId]) -> CoreResult<Timestamp> {
        self.stats.record_physical_check();
        let mut latest = Timestamp::ZERO;
        for type_id in types {
            let table = self.registry.table_of(*type_id)?;
            for (_, row) in self.store.select(&table, &Filter::all())? {
                if let Some(from) = row.u64(COL_VALID_FROM) {
                    latest = latest.max(Timestamp::from_millis(from));
                }
                if let Some(to) = row.u64(COL_VALID_TO) {
                    latest = latest.max(Timestamp::from_millis(to));
                }
            }
        }
        Ok(latest)
    }

    /// Gives the recency cache access for the lock tracker's shortcut path.
    #[must_use]
    pub fn cache(&self) -> &ModificationCache {
        &self.cache
    }

    /// Applies a transaction's buffered operations with one commit stamp.
    ///
    /// Returns the applied changes for event fan-out. A conflicting change
    /// committed elsewhere between record time and apply time surfaces as a
    /// concurrent-modification error.
    pub(crate) fn apply(
        &self,
        txn_id: TransactionId,
        writes: Vec<(ObjectKey, PendingOp)>,
        commit_ts: Timestamp,
    ) -> CoreResult<Vec<AppliedChange>> {
        let mut changes = Vec::with_capacity(writes.len());

        for (key, op) in writes {
            let table = self.registry.table_of(key.type_id)?;
            self.store.ensure_table(&table)?;

            match op {
                PendingOp::Create { payload, digest } => {
                    if self.fetch_current(&table, &key)?.is_some() {
                        return Err(CoreError::DuplicateObject { key });
                    }
                    self.store
                        .insert(&table, version_row(&key, commit_ts, txn_id, digest, payload))?;
                    self.cache.note_object(key, commit_ts);
                    changes.push(AppliedChange {
                        key,
                        kind: ChangeKind::Created,
                        stamp: commit_ts,
                    });
                }
                PendingOp::Update { payload, digest } => {
                    let current = self.require_current(&table, &key)?;
                    self.close_row(&table, current.row_id, &current.row, commit_ts)?;
                    self.store
                        .insert(&table, version_row(&key, commit_ts, txn_id, digest, payload))?;
                    self.cache.note_object(key, commit_ts);
                    changes.push(AppliedChange {
                        key,
                        kind: ChangeKind::Modified,
                        stamp: commit_ts,
                    });
                }
                PendingOp::Remove => {
                    let current = self.require_current(&table, &key)?;
                    self.close_row(&table, current.row_id, &current.row, commit_ts)?;
                    self.cache.forget_object(key);
                    changes.push(AppliedChange {
                        key,
                        kind: ChangeKind::Removed,
                        stamp: commit_ts,
                    });
                }
            }
            self.cache.note_type(key.type_id, commit_ts);
        }

        debug!(txn = %txn_id, stamp = %commit_ts, count = changes.len(), "applied version changes");
        Ok(changes)
    }

    fn close_row(
        &self,
        table: &str,
        row_id: RowId,
        row: &Row,
        commit_ts: Timestamp,
    ) -> CoreResult<()> {
        let mut closed = row.clone();
        closed.set(COL_VALID_TO, Value::U64(commit_ts.as_millis()));
        self.store.update(table, row_id, closed)?;
        Ok(())
    }

    fn require_current(&self, table: &str, key: &ObjectKey) -> CoreResult<CurrentRow> {
        match self.fetch_current(table, key)? {
            Some(current) => Ok(current),
            None => {
                if self.fetch_history(table, key)?.is_empty() {
                    Err(CoreError::UnknownObject { key: *key })
                } else {
                    Err(CoreError::ObjectRemoved { key: *key })
                }
            }
        }
    }

    fn fetch_current(&self, table: &str, key: &ObjectKey) -> CoreResult<Option<CurrentRow>> {
        let filter = Filter::eq(COL_PID, Value::Bytes(key.id.as_bytes().to_vec()))
            .and(COL_VALID_TO, Predicate::IsNull);
        let mut rows = self.store.select(table, &filter)?;
        Ok(rows.pop().map(|(row_id, row)| {
            let stamp = Timestamp::from_millis(row.u64(COL_VALID_FROM).unwrap_or(0));
            self.clock.observe(stamp);
            CurrentRow {
                stamp,
                record: row_record(&row, stamp),
                row_id,
                row,
            }
        }))
    }

    fn fetch_history(&self, table: &str, key: &ObjectKey) -> CoreResult<Vec<Row>> {
        let filter = Filter::eq(COL_PID, Value::Bytes(key.id.as_bytes().to_vec()));
        Ok(self
            .store
            .select(table, &filter)?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    fn fetch_as_of(&self, key: ObjectKey, at: Timestamp) -> CoreResult<Option<VersionRecord>> {
        let table = self.registry.table_of(key.type_id)?;
        for row in self.fetch_history(&table, &key)? {
            let from = Timestamp::from_millis(row.u64(COL_VALID_FROM).unwrap_or(0));
            let to = row.u64(COL_VALID_TO).map(Timestamp::from_millis);
            let covers = from <= at && to.map(|t| t > at).unwrap_or(true);
            if covers {
                return Ok(Some(row_record(&row, from)));
            }
        }
        Ok(None)
    }
}

struct CurrentRow {
    stamp: Timestamp,
    record: VersionRecord,
    row_id: RowId,
    row: Row,
}

fn version_row(
    key: &ObjectKey,
    commit_ts: Timestamp,
    writer: TransactionId,
    digest: [u8; 32],
    payload: Vec<u8>,
) -> Row {
    Row::new()
        .with(COL_PID, Value::Bytes(key.id.as_bytes().to_vec()))
        .with(COL_VALID_FROM, Value::U64(commit_ts.as_millis()))
        .with(COL_VALID_TO, Value::Null)
        .with(COL_WRITER, Value::U64(writer.as_u64()))
        .with(COL_DIGEST, Value::Bytes(digest.to_vec()))
        .with(COL_PAYLOAD, Value::Bytes(payload))
}

fn row_record(row: &Row, stamp: Timestamp) -> VersionRecord {
    VersionRecord {
        payload: row.bytes(COL_PAYLOAD).unwrap_or_default().to_vec(),
        stamp,
        writer: TransactionId::new(row.u64(COL_WRITER).unwrap_or(0)),
    }
}

fn row_digest(row: &Row) -> Option<[u8; 32]> {
    let bytes = row.bytes(COL_DIGEST)?;
    let mut digest = [0u8; 32];
    if bytes.len() != 32 {
        return None;
    }
    digest.copy_from_slice(bytes);
    Some(digest)
}

pub(crate) fn payload_digest(payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}
