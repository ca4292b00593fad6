//! File-backed row store with CBOR snapshot persistence.

use crate::error::{StoreError, StoreResult};
use crate::memory::{select_from, Table, TableMap};
use crate::row::{Filter, Row, RowId};
use crate::store::RowStore;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};

/// A row store persisted as a single CBOR snapshot file.
///
/// Every mutation rewrites the snapshot through a temp-file rename, so a
/// crash leaves either the old or the new state, never a torn file. Suited
/// for inspection tooling and small shared deployments; the abstraction it
/// implements is [`RowStore`], same as [`crate::MemoryStore`].
pub struct FileStore {
    path: PathBuf,
    tables: Mutex<TableMap>,
}

impl FileStore {
    /// Opens a store at `path`, creating an empty one if the file is absent.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tables = if path.exists() {
            Self::load(&path)?
        } else {
            TableMap::default()
        };
        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> StoreResult<TableMap> {
        let bytes = fs::read(path)?;
        ciborium::from_reader(bytes.as_slice())
            .map_err(|e| StoreError::snapshot_corruption(e.to_string()))
    }

    fn persist(&self, tables: &TableMap) -> StoreResult<()> {
        let mut buf = Vec::new();
        ciborium::into_writer(tables, &mut buf)
            .map_err(|e| StoreError::snapshot_corruption(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl RowStore for FileStore {
    fn ensure_table(&self, table: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), Table::default());
        self.persist(&tables)?;
        Ok(true)
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<RowId> {
        let mut tables = self.tables.lock();
        let t = tables
            .entry(table.to_string())
            .or_insert_with(Table::default);
        t.next_id += 1;
        let id = t.next_id;
        t.rows.insert(id, row);
        self.persist(&tables)?;
        Ok(RowId::new(id))
    }

    fn update(&self, table: &str, row_id: RowId, row: Row) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::unknown_table(table))?;
        match t.rows.get_mut(&row_id.as_u64()) {
            Some(slot) => *slot = row,
            None => return Err(StoreError::row_not_found(table, row_id.as_u64())),
        }
        self.persist(&tables)
    }

    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<(RowId, Row)>> {
        Ok(select_from(&self.tables.lock(), table, filter))
    }

    fn delete(&self, table: &str, row_id: RowId) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        let removed = match tables.get_mut(table) {
            Some(t) => t.rows.remove(&row_id.as_u64()).is_some(),
            None => false,
        };
        if removed {
            self.persist(&tables)?;
        }
        Ok(())
    }

    fn table_names(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.tables.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;
    use tempfile::TempDir;

    #[test]
    fn data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.cbor");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .insert("t", Row::new().with("v", Value::U64(7)))
                .unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        let rows = store.select("t", &Filter::all()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.u64("v"), Some(7));
    }

    #[test]
    fn row_ids_continue_after_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.cbor");

        let first = {
            let store = FileStore::open(&path).unwrap();
            store.insert("t", Row::new()).unwrap()
        };

        let store = FileStore::open(&path).unwrap();
        let second = store.insert("t", Row::new()).unwrap();
        assert!(second > first);
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path().join("fresh.cbor")).unwrap();
        assert!(store.table_names().unwrap().is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.cbor");
        fs::write(&path, b"not cbor at all").unwrap();

        let result = FileStore::open(&path);
        assert!(matches!(
            result,
            Err(StoreError::SnapshotCorruption { .. })
        ));
    }
}
