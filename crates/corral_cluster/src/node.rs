//! Convenience bundle of one engine plus its coordinator.

use crate::config::ClusterConfig;
use crate::coordinator::NodeCoordinator;
use crate::error::ClusterResult;
use crate::transport::ClusterTransport;
use corral_core::{CoreConfig, Engine, NodeIndex};
use corral_meta::TypeRegistry;
use corral_store::RowStore;
use std::sync::Arc;

/// One running Corral node: an engine joined to the cluster.
pub struct ClusterNode {
    engine: Arc<Engine>,
    coordinator: Arc<NodeCoordinator>,
    index: NodeIndex,
}

impl ClusterNode {
    /// Builds an engine over the shared store and joins the cluster.
    pub fn launch(
        store: Arc<dyn RowStore>,
        registry: Arc<TypeRegistry>,
        transport: Arc<dyn ClusterTransport>,
        core_config: CoreConfig,
        cluster_config: ClusterConfig,
    ) -> ClusterResult<ClusterNode> {
        let engine = Arc::new(Engine::new(
            Arc::clone(&store),
            registry,
            core_config,
        ));
        let coordinator =
            NodeCoordinator::new(Arc::clone(&engine), store, transport, cluster_config);
        let index = coordinator.join()?;
        Ok(Self {
            engine,
            coordinator,
            index,
        })
    }

    /// Returns the node's engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Returns the node's coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &Arc<NodeCoordinator> {
        &self.coordinator
    }

    /// Returns the node's cluster index.
    #[must_use]
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Leaves the cluster cleanly.
    pub fn shutdown(&self) -> ClusterResult<()> {
        self.coordinator.leave()
    }
}
