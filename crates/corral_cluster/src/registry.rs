//! The shared node table.

use crate::error::ClusterResult;
use corral_core::{NodeIndex, Timestamp};
use corral_store::{Filter, Row, RowId, RowStore, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Name of the shared membership table.
pub const NODES_TABLE: &str = "nodes";

const COL_INDEX: &str = "index";
const COL_ADDRESSES: &str = "addresses";
const COL_PORT: &str = "command_port";
const COL_HEARTBEAT: &str = "heartbeat";
const COL_ALIVE: &str = "alive";

/// One row of the node table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Unique node index.
    pub index: NodeIndex,
    /// Reachable addresses of the process.
    pub addresses: String,
    /// Command port of the process.
    pub command_port: u16,
    /// Last heartbeat stamp.
    pub heartbeat: Timestamp,
    /// True if the row is fresh enough to count as alive.
    pub alive: bool,
}

/// Membership registry over the shared `nodes` table.
///
/// One row per connected process. Rows are deleted on clean departure;
/// anything left behind by a crash is purged by whichever node notices
/// first (stale heartbeat, or an address match during that process's own
/// rejoin).
pub struct NodeRegistry {
    store: Arc<dyn RowStore>,
}

impl NodeRegistry {
    /// Creates a registry over the shared store.
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// Ensures the node table exists.
    pub fn ensure(&self) -> ClusterResult<()> {
        self.store.ensure_table(NODES_TABLE)?;
        Ok(())
    }

    /// Inserts a fresh registration and returns the assigned index.
    ///
    /// Indices are unique: one past the highest ever present in the table.
    pub fn register(
        &self,
        addresses: &str,
        command_port: u16,
        now: Timestamp,
    ) -> ClusterResult<NodeIndex> {
        let highest = self
            .rows()?
            .into_iter()
            .filter_map(|(_, row)| row.u64(COL_INDEX))
            .max()
            .unwrap_or(0);
        let index = NodeIndex::new(highest as u32 + 1);

        self.store.insert(
            NODES_TABLE,
            Row::new()
                .with(COL_INDEX, Value::U64(u64::from(index.as_u32())))
                .with(COL_ADDRESSES, Value::Str(addresses.to_string()))
                .with(COL_PORT, Value::U64(u64::from(command_port)))
                .with(COL_HEARTBEAT, Value::U64(now.as_millis()))
                .with(COL_ALIVE, Value::Bool(true)),
        )?;
        debug!(%index, addresses, "node registered");
        Ok(index)
    }

    /// Deletes a node's row (clean departure, or failover cleanup).
    pub fn deregister(&self, index: NodeIndex) -> ClusterResult<bool> {
        match self.find(index)? {
            Some((row_id, _)) => {
                self.store.delete(NODES_TABLE, row_id)?;
                debug!(%index, "node deregistered");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Bumps a node's heartbeat stamp.
    pub fn heartbeat(&self, index: NodeIndex, now: Timestamp) -> ClusterResult<()> {
        if let Some((row_id, mut row)) = self.find(index)? {
            row.set(COL_HEARTBEAT, Value::U64(now.as_millis()));
            self.store.update(NODES_TABLE, row_id, row)?;
        }
        Ok(())
    }

    /// Purges rows a joining process must not trust: stale heartbeats, and
    /// any previous registration of the joiner's own addresses.
    pub fn purge_for_join(
        &self,
        now: Timestamp,
        stale_after: Duration,
        own_addresses: &str,
    ) -> ClusterResult<Vec<NodeIndex>> {
        self.purge(now, stale_after, Some(own_addresses), None)
    }

    /// Purges stale peer rows during a heartbeat tick, sparing our own.
    pub fn purge_stale_peers(
        &self,
        now: Timestamp,
        stale_after: Duration,
        own_index: NodeIndex,
    ) -> ClusterResult<Vec<NodeIndex>> {
        self.purge(now, stale_after, None, Some(own_index))
    }

    /// Returns all rows with their derived liveness.
    pub fn entries(&self, now: Timestamp, stale_after: Duration) -> ClusterResult<Vec<NodeEntry>> {
        let mut entries: Vec<NodeEntry> = self
            .rows()?
            .into_iter()
            .map(|(_, row)| entry_of(&row, now, stale_after))
            .collect();
        entries.sort_by_key(|e| e.index);
        Ok(entries)
    }

    /// Returns the indices of all alive nodes, ascending.
    pub fn alive_indices(
        &self,
        now: Timestamp,
        stale_after: Duration,
    ) -> ClusterResult<Vec<NodeIndex>> {
        Ok(self
            .entries(now, stale_after)?
            .into_iter()
            .filter(|e| e.alive)
            .map(|e| e.index)
            .collect())
    }

    /// Returns the total number of rows, alive or not.
    pub fn row_count(&self) -> ClusterResult<usize> {
        Ok(self.rows()?.len())
    }

    /// Checks the baseline invariant: exactly one row while a single
    /// process is connected.
    pub fn single_node_invariant(&self) -> ClusterResult<bool> {
        Ok(self.row_count()? == 1)
    }

    fn purge(
        &self,
        now: Timestamp,
        stale_after: Duration,
        own_addresses: Option<&str>,
        spare: Option<NodeIndex>,
    ) -> ClusterResult<Vec<NodeIndex>> {
        let threshold = now
            .as_millis()
            .saturating_sub(stale_after.as_millis() as u64);
        let mut purged = Vec::new();

        for (row_id, row) in self.rows()? {
            let index = NodeIndex::new(row.u64(COL_INDEX).unwrap_or(0) as u32);
            if spare == Some(index) {
                continue;
            }
            let heartbeat = row.u64(COL_HEARTBEAT).unwrap_or(0);
            let stale = heartbeat < threshold;
            let own_ghost = own_addresses
                .map(|own| row.str(COL_ADDRESSES) == Some(own))
                .unwrap_or(false);
            if stale || own_ghost {
                self.store.delete(NODES_TABLE, row_id)?;
                debug!(%index, stale, own_ghost, "purged node row");
                purged.push(index);
            }
        }
        Ok(purged)
    }

    fn find(&self, index: NodeIndex) -> ClusterResult<Option<(RowId, Row)>> {
        let filter = Filter::eq(COL_INDEX, Value::U64(u64::from(index.as_u32())));
        Ok(self.store.select(NODES_TABLE, &filter)?.pop())
    }

    fn rows(&self) -> ClusterResult<Vec<(RowId, Row)>> {
        Ok(self.store.select(NODES_TABLE, &Filter::all())?)
    }
}

fn entry_of(row: &Row, now: Timestamp, stale_after: Duration) -> NodeEntry {
    let heartbeat = Timestamp::from_millis(row.u64(COL_HEARTBEAT).unwrap_or(0));
    let threshold = now
        .as_millis()
        .saturating_sub(stale_after.as_millis() as u64);
    NodeEntry {
        index: NodeIndex::new(row.u64(COL_INDEX).unwrap_or(0) as u32),
        addresses: row.str(COL_ADDRESSES).unwrap_or_default().to_string(),
        command_port: row.u64(COL_PORT).unwrap_or(0) as u16,
        heartbeat,
        alive: row.bool(COL_ALIVE).unwrap_or(false) && heartbeat.as_millis() >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_store::MemoryStore;

    fn registry() -> NodeRegistry {
        let r = NodeRegistry::new(Arc::new(MemoryStore::new()));
        r.ensure().unwrap();
        r
    }

    fn ts(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    const STALE: Duration = Duration::from_millis(1_000);

    #[test]
    fn register_assigns_increasing_indices() {
        let r = registry();
        let a = r.register("a:1", 1, ts(10_000)).unwrap();
        let b = r.register("b:1", 2, ts(10_000)).unwrap();
        assert!(b > a);
        assert_eq!(r.row_count().unwrap(), 2);
    }

    #[test]
    fn indices_not_reused_after_departure() {
        let r = registry();
        let a = r.register("a:1", 1, ts(10_000)).unwrap();
        r.deregister(a).unwrap();
        let b = r.register("b:1", 2, ts(10_000)).unwrap();
        assert!(b > a);
    }

    #[test]
    fn heartbeat_keeps_node_alive() {
        let r = registry();
        let a = r.register("a:1", 1, ts(10_000)).unwrap();

        // Stale without a bump.
        let alive = r.alive_indices(ts(12_000), STALE).unwrap();
        assert!(alive.is_empty());

        r.heartbeat(a, ts(11_900)).unwrap();
        let alive = r.alive_indices(ts(12_000), STALE).unwrap();
        assert_eq!(alive, vec![a]);
    }

    #[test]
    fn join_purges_stale_and_own_ghost_rows() {
        let r = registry();
        let stale = r.register("gone:1", 1, ts(1_000)).unwrap();
        let ghost = r.register("me:1", 2, ts(9_900)).unwrap();
        let fresh = r.register("other:1", 3, ts(9_900)).unwrap();

        let purged = r.purge_for_join(ts(10_000), STALE, "me:1").unwrap();
        assert!(purged.contains(&stale));
        assert!(purged.contains(&ghost));
        assert!(!purged.contains(&fresh));
        assert_eq!(r.row_count().unwrap(), 1);
    }

    #[test]
    fn tick_purge_spares_own_row() {
        let r = registry();
        let me = r.register("me:1", 1, ts(1_000)).unwrap();
        let dead = r.register("dead:1", 2, ts(1_000)).unwrap();

        let purged = r.purge_stale_peers(ts(10_000), STALE, me).unwrap();
        assert_eq!(purged, vec![dead]);
        assert_eq!(r.row_count().unwrap(), 1);
    }

    #[test]
    fn single_node_invariant_holds_for_one_row() {
        let r = registry();
        assert!(!r.single_node_invariant().unwrap());
        r.register("a:1", 1, ts(10_000)).unwrap();
        assert!(r.single_node_invariant().unwrap());
    }
}
