//! Outbound ports toward the cluster layer.
//!
//! The core never talks to other nodes directly. Cross-process lock
//! visibility and commit-time invalidation fan-out go through these traits;
//! `corral_cluster` wires its coordinator in via
//! [`crate::Engine::set_lock_relay`] and [`crate::Engine::set_commit_fanout`].
//! A single-process engine simply leaves the ports unset.

use crate::error::CoreResult;
use crate::lock::{HolderId, LockMode};
use crate::session::SessionInfo;
use crate::types::LockTarget;
use corral_meta::TypeId;
use std::time::Duration;

/// Delegates lock visibility to the cluster's elected server.
///
/// The local tracker grants first, then asks the relay; a remote denial
/// rolls the local grant back, so a lock is only ever observed held when
/// the whole cluster agrees.
pub trait LockRelay: Send + Sync {
    /// Requests the lock from the server arbiter.
    fn acquire(
        &self,
        holder: HolderId,
        target: &LockTarget,
        mode: LockMode,
        timeout: Option<Duration>,
        session: &SessionInfo,
    ) -> CoreResult<()>;

    /// Releases one acquisition at the server arbiter.
    fn release(&self, holder: HolderId, target: &LockTarget) -> CoreResult<()>;

    /// Releases everything the holder still holds at the server arbiter.
    fn release_all(&self, holder: HolderId) -> CoreResult<()>;
}

/// Broadcasts commit-time invalidation to the rest of the cluster.
///
/// Called *before* the physical commit is applied; a failure here fails
/// the commit, which is what makes an in-flight transaction against a dead
/// server fail rather than silently succeed.
pub trait CommitFanout: Send + Sync {
    /// Announces that instances of the given types are about to change.
    fn content_changed(&self, types: &[TypeId]) -> CoreResult<()>;
}
