//! Cluster fixtures and invariant helpers.

use corral_cluster::{ClusterConfig, ClusterNode, MemoryBus};
use corral_core::{CoreConfig, Timestamp};
use corral_meta::{ObjectKey, PersistenceId, TypeId, TypeRegistry};
use corral_store::{FileStore, MemoryStore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Root type of the test hierarchy.
pub const ANIMAL: TypeId = TypeId::new(1);
/// Intermediate type: `Mammal` extends `Animal`.
pub const MAMMAL: TypeId = TypeId::new(2);
/// Leaf type: `Dog` extends `Mammal`.
pub const DOG: TypeId = TypeId::new(3);
/// Type unrelated to the animal hierarchy.
pub const VEHICLE: TypeId = TypeId::new(4);

/// Builds the standard test type hierarchy.
#[must_use]
pub fn test_registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    registry.register(ANIMAL, "Animal", []).unwrap();
    registry.register(MAMMAL, "Mammal", [ANIMAL]).unwrap();
    registry.register(DOG, "Dog", [MAMMAL]).unwrap();
    registry.register(VEHICLE, "Vehicle", []).unwrap();
    Arc::new(registry)
}

/// Returns a fresh key for a test object of the given type.
#[must_use]
pub fn key_of(type_id: TypeId) -> ObjectKey {
    ObjectKey::new(type_id, PersistenceId::generate())
}

/// A multi-node test cluster on one shared store and message bus.
///
/// Each launched node plays the role of a separate process; they share the
/// backing store exactly the way real processes share a database, and talk
/// through the in-memory bus the way real processes talk over sockets.
pub struct TestCluster {
    /// The shared backing store.
    pub store: Arc<MemoryStore>,
    /// The shared message bus.
    pub bus: Arc<MemoryBus>,
    /// The shared type registry.
    pub types: Arc<TypeRegistry>,
    next_address: AtomicU32,
}

impl TestCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            bus: Arc::new(MemoryBus::new()),
            types: test_registry(),
            next_address: AtomicU32::new(1),
        }
    }

    /// Launches a node with default configuration on a fresh address.
    pub fn launch_node(&self) -> ClusterNode {
        let address = format!(
            "127.0.0.1:{}",
            9900 + self.next_address.fetch_add(1, Ordering::SeqCst)
        );
        self.launch_node_at(&address, CoreConfig::default())
    }

    /// Launches a node with a specific core configuration.
    pub fn launch_node_with(&self, core: CoreConfig) -> ClusterNode {
        let address = format!(
            "127.0.0.1:{}",
            9900 + self.next_address.fetch_add(1, Ordering::SeqCst)
        );
        self.launch_node_at(&address, core)
    }

    /// Launches a node at a fixed address.
    ///
    /// Reusing the address of a killed node models that process restarting
    /// from scratch: its ghost row is purged and every other node drops
    /// its caches.
    pub fn launch_node_at(&self, address: &str, core: CoreConfig) -> ClusterNode {
        let cluster = ClusterConfig::new()
            .addresses(address)
            .stale_after(Duration::from_secs(30));
        let store: Arc<dyn corral_store::RowStore> = self.store.clone();
        let bus: Arc<dyn corral_cluster::ClusterTransport> = self.bus.clone();
        ClusterNode::launch(store, Arc::clone(&self.types), bus, core, cluster)
            .expect("node launch failed")
    }

    /// Simulates a crash: the node's endpoint vanishes but its row stays
    /// until someone purges it.
    pub fn kill(&self, node: &ClusterNode) {
        use corral_cluster::ClusterTransport;
        self.bus.withdraw(node.index());
    }

    /// Asserts the baseline invariant on the last remaining node: exactly
    /// one `nodes` row and zero open transactions.
    pub fn assert_baseline(&self, node: &ClusterNode) {
        assert!(
            node.coordinator()
                .registry()
                .single_node_invariant()
                .unwrap(),
            "node table must hold exactly one row"
        );
        assert_eq!(
            node.engine().transactions().open_transactions(),
            0,
            "no transaction may remain open"
        );
    }

    /// Persists one object through a node, returning its version stamp.
    pub fn persist(&self, node: &ClusterNode, key: ObjectKey, payload: &[u8]) -> Timestamp {
        let engine = node.engine();
        engine
            .run_in_transaction(|txn| engine.ledger().record_create(txn, key, payload.to_vec()))
            .unwrap();
        engine
            .ledger()
            .read_current(key)
            .unwrap()
            .expect("object just persisted")
            .stamp
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// A file store in a temporary directory, cleaned up on drop.
pub struct FileStoreFixture {
    /// The opened store.
    pub store: FileStore,
    _dir: TempDir,
}

impl FileStoreFixture {
    /// Creates a fresh file store under a temp directory.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp directory");
        let store = FileStore::open(dir.path().join("corral.cbor")).expect("file store");
        Self { store, _dir: dir }
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> std::path::PathBuf {
        self.store.path().to_path_buf()
    }
}

impl Default for FileStoreFixture {
    fn default() -> Self {
        Self::new()
    }
}
