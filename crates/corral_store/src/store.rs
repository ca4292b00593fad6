//! Row store trait definition.

use crate::error::StoreResult;
use crate::row::{Filter, Row, RowId};

/// A minimal row store shared by every Corral node.
///
/// Stores are **dumb tables**. They provide insert/update/select/delete over
/// named tables of rows and nothing else: no locking, no transactions, no
/// triggers. Corral owns all concurrency and versioning semantics - several
/// of the supported backends have no usable locking primitives of their own,
/// which is the reason this layer exists.
///
/// # Invariants
///
/// - `insert` assigns a fresh [`RowId`] unique within the table, never reused
/// - `select` returns rows in row-id order
/// - every operation is individually atomic and immediately visible to all
///   handles onto the same store
/// - implementations must be `Send + Sync`; one store instance is shared by
///   all threads of a node, and (via the backing medium) by all nodes
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - for tests and single-process use
/// - [`crate::FileStore`] - CBOR snapshot persistence
pub trait RowStore: Send + Sync {
    /// Ensures a table exists, returning true if it was created.
    ///
    /// The creation flag feeds the caller's schema-operation accounting.
    fn ensure_table(&self, table: &str) -> StoreResult<bool>;

    /// Inserts a row, returning its assigned id.
    fn insert(&self, table: &str, row: Row) -> StoreResult<RowId>;

    /// Replaces an existing row.
    ///
    /// # Errors
    ///
    /// Returns an error if the table or the row does not exist.
    fn update(&self, table: &str, row_id: RowId, row: Row) -> StoreResult<()>;

    /// Returns all rows matching the filter, in row-id order.
    ///
    /// Selecting from a table that was never created returns an empty set,
    /// not an error; callers probe tables they may not have written yet.
    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<(RowId, Row)>>;

    /// Deletes a row. Deleting an absent row is a no-op.
    fn delete(&self, table: &str, row_id: RowId) -> StoreResult<()>;

    /// Returns the names of all existing tables.
    fn table_names(&self) -> StoreResult<Vec<String>>;
}
