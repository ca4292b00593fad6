//! # Corral Cluster
//!
//! Node membership, server election, failover and cross-process lock
//! relay for Corral.
//!
//! Several processes share one backing store; this crate keeps their views
//! consistent without a distributed-lock service. A shared `nodes` table
//! acts as a heartbeat/lease registry, the lowest alive index is the
//! coordinating server, and the server arbitrates cross-process lock
//! requests and fans out cache invalidation. This is a best-effort
//! membership protocol, not provably correct consensus.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod arbiter;
mod config;
mod convert;
mod coordinator;
mod error;
mod node;
mod registry;
mod transport;

pub use arbiter::LockArbiter;
pub use config::ClusterConfig;
pub use coordinator::NodeCoordinator;
pub use error::{ClusterError, ClusterResult};
pub use node::ClusterNode;
pub use registry::{NodeEntry, NodeRegistry, NODES_TABLE};
pub use transport::{ClusterTransport, MemoryBus, MessageHandler};
