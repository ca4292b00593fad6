//! Error types for the cluster layer.

use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur in cluster coordination.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Protocol codec or dispatch error.
    #[error("protocol error: {0}")]
    Protocol(#[from] corral_cluster_protocol::ProtocolError),

    /// Row store error from the shared node table.
    #[error("store error: {0}")]
    Store(#[from] corral_store::StoreError),

    /// Core engine error surfaced through coordination.
    #[error("core error: {0}")]
    Core(#[from] corral_core::CoreError),

    /// A message could not be delivered to a node.
    #[error("node {node} unreachable")]
    NodeUnreachable {
        /// Raw index of the unreachable node.
        node: u32,
    },

    /// The acting server's link is gone; failover is pending.
    #[error("server connection lost")]
    ServerLost,

    /// The operation requires a joined coordinator.
    #[error("node has not joined the cluster")]
    NotJoined,

    /// A peer answered with a protocol-level failure.
    #[error("remote error: {message}")]
    Remote {
        /// The peer's failure description.
        message: String,
    },
}

impl ClusterError {
    /// Creates a remote-failure error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Converts into a core coordination error for the port traits.
    #[must_use]
    pub fn into_core(self) -> corral_core::CoreError {
        match self {
            ClusterError::Core(err) => err,
            other => corral_core::CoreError::coordination(other.to_string()),
        }
    }
}
