//! In-memory row store.

use crate::error::{StoreError, StoreResult};
use crate::row::{Filter, Row, RowId};
use crate::store::RowStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One in-memory table.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Table {
    pub(crate) next_id: u64,
    pub(crate) rows: BTreeMap<u64, Row>,
}

impl Table {
    fn insert(&mut self, row: Row) -> RowId {
        self.next_id += 1;
        let id = self.next_id;
        self.rows.insert(id, row);
        RowId::new(id)
    }
}

pub(crate) type TableMap = HashMap<String, Table>;

pub(crate) fn select_from(tables: &TableMap, table: &str, filter: &Filter) -> Vec<(RowId, Row)> {
    match tables.get(table) {
        Some(t) => t
            .rows
            .iter()
            .filter(|(_, row)| filter.matches(row))
            .map(|(id, row)| (RowId::new(*id), row.clone()))
            .collect(),
        None => Vec::new(),
    }
}

/// An in-memory row store.
///
/// Cloned or `Arc`-shared handles all observe the same tables, which lets a
/// test process stand several Corral "nodes" on one shared store the way
/// separate OS processes would share a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<TableMap>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every table. Test helper.
    pub fn clear(&self) {
        self.tables.write().clear();
    }
}

impl RowStore for MemoryStore {
    fn ensure_table(&self, table: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            Ok(false)
        } else {
            tables.insert(table.to_string(), Table::default());
            Ok(true)
        }
    }

    fn insert(&self, table: &str, row: Row) -> StoreResult<RowId> {
        let mut tables = self.tables.write();
        let t = tables
            .entry(table.to_string())
            .or_insert_with(Table::default);
        Ok(t.insert(row))
    }

    fn update(&self, table: &str, row_id: RowId, row: Row) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::unknown_table(table))?;
        match t.rows.get_mut(&row_id.as_u64()) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(StoreError::row_not_found(table, row_id.as_u64())),
        }
    }

    fn select(&self, table: &str, filter: &Filter) -> StoreResult<Vec<(RowId, Row)>> {
        Ok(select_from(&self.tables.read(), table, filter))
    }

    fn delete(&self, table: &str, row_id: RowId) -> StoreResult<()> {
        let mut tables = self.tables.write();
        if let Some(t) = tables.get_mut(table) {
            t.rows.remove(&row_id.as_u64());
        }
        Ok(())
    }

    fn table_names(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Value;
    use std::sync::Arc;

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.insert("t", Row::new()).unwrap();
        let b = store.insert("t", Row::new()).unwrap();
        assert!(b > a);
    }

    #[test]
    fn update_replaces_row() {
        let store = MemoryStore::new();
        let id = store
            .insert("t", Row::new().with("v", Value::U64(1)))
            .unwrap();
        store
            .update("t", id, Row::new().with("v", Value::U64(2)))
            .unwrap();

        let rows = store.select("t", &Filter::all()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.u64("v"), Some(2));
    }

    #[test]
    fn update_missing_row_errors() {
        let store = MemoryStore::new();
        store.ensure_table("t").unwrap();
        let result = store.update("t", RowId::new(99), Row::new());
        assert!(matches!(result, Err(StoreError::RowNotFound { .. })));
    }

    #[test]
    fn select_unknown_table_is_empty() {
        let store = MemoryStore::new();
        assert!(store.select("nope", &Filter::all()).unwrap().is_empty());
    }

    #[test]
    fn select_applies_filter() {
        let store = MemoryStore::new();
        store
            .insert("t", Row::new().with("k", Value::Str("a".into())))
            .unwrap();
        store
            .insert("t", Row::new().with("k", Value::Str("b".into())))
            .unwrap();

        let rows = store
            .select("t", &Filter::eq("k", Value::Str("b".into())))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.str("k"), Some("b"));
    }

    #[test]
    fn delete_absent_row_is_noop() {
        let store = MemoryStore::new();
        store.delete("t", RowId::new(1)).unwrap();
    }

    #[test]
    fn ensure_table_reports_creation() {
        let store = MemoryStore::new();
        assert!(store.ensure_table("t").unwrap());
        assert!(!store.ensure_table("t").unwrap());
    }

    #[test]
    fn shared_handles_see_same_data() {
        let store = Arc::new(MemoryStore::new());
        let other = Arc::clone(&store);

        store
            .insert("t", Row::new().with("v", Value::U64(42)))
            .unwrap();
        let rows = other.select("t", &Filter::all()).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
