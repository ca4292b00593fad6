//! Node coordinator: membership, election, failover, invalidation fan-out.

use crate::arbiter::LockArbiter;
use crate::config::ClusterConfig;
use crate::convert::{core_session, wire_holder, wire_session, wire_target};
use crate::error::{ClusterError, ClusterResult};
use crate::registry::NodeRegistry;
use crate::transport::ClusterTransport;
use corral_cluster_protocol::{Message, ProtocolError};
use corral_core::lock::{HolderId, LockMode};
use corral_core::ports::{CommitFanout, LockRelay};
use corral_core::{
    CoreError, CoreResult, Engine, LockTarget, NodeIndex, SessionInfo, Timestamp,
};
use corral_meta::TypeId;
use corral_store::RowStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct CoordState {
    index: Option<NodeIndex>,
    server: Option<NodeIndex>,
}

/// Coordinates one process's membership in the cluster.
///
/// On join the node purges untrustworthy rows, registers itself and either
/// becomes the server (no other alive row) or connects to the acting one.
/// The heartbeat tick refreshes the node's lease, probes the server's link
/// and performs deterministic failover: the lowest surviving index takes
/// over. Election is best-effort; simultaneous multi-node failure resolves
/// on whichever survivor ticks first.
pub struct NodeCoordinator {
    engine: Arc<Engine>,
    registry: NodeRegistry,
    transport: Arc<dyn ClusterTransport>,
    config: ClusterConfig,
    arbiter: LockArbiter,
    state: Mutex<CoordState>,
    stop: Arc<AtomicBool>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl NodeCoordinator {
    /// Creates a coordinator for one engine over the shared store.
    pub fn new(
        engine: Arc<Engine>,
        store: Arc<dyn RowStore>,
        transport: Arc<dyn ClusterTransport>,
        config: ClusterConfig,
    ) -> Arc<Self> {
        let arbiter = LockArbiter::new(Arc::clone(engine.registry()));
        Arc::new(Self {
            engine,
            registry: NodeRegistry::new(store),
            transport,
            config,
            arbiter,
            state: Mutex::new(CoordState::default()),
            stop: Arc::new(AtomicBool::new(false)),
            heartbeat: Mutex::new(None),
        })
    }

    /// Joins the cluster, returning this node's assigned index.
    pub fn join(self: &Arc<Self>) -> ClusterResult<NodeIndex> {
        self.registry.ensure()?;
        let now = Timestamp::wall();
        let purged = self.registry.purge_for_join(
            now,
            self.config.stale_after,
            &self.config.addresses,
        )?;
        let index = self
            .registry
            .register(&self.config.addresses, self.config.command_port, now)?;

        let me = Arc::clone(self);
        self.transport
            .serve(index, Arc::new(move |message| me.handle_message(message)));

        self.state.lock().index = Some(index);
        let server = self.connect_to_server(index, now)?;
        info!(%index, %server, "joined cluster");

        // Wire the engine's outbound ports to this coordinator.
        self.engine.set_node_index(index);
        let relay: Arc<dyn LockRelay> = Arc::new(CoordinatorRelay(Arc::downgrade(self)));
        self.engine.set_lock_relay(relay);
        let fanout: Arc<dyn CommitFanout> = Arc::new(CoordinatorFanout(Arc::downgrade(self)));
        self.engine.set_commit_fanout(fanout);

        // A dirty rejoin means this process restarted from scratch; nobody
        // may assume continuity, so every other node drops its caches.
        if !purged.is_empty() {
            self.fan_out(Message::InvalidateAll {
                origin: index.as_u32(),
            });
        }

        if self.config.auto_heartbeat {
            self.start_heartbeat();
        }
        Ok(index)
    }

    /// Leaves the cluster cleanly, deleting this node's row.
    pub fn leave(&self) -> ClusterResult<()> {
        self.stop_heartbeat();
        let index = {
            let mut state = self.state.lock();
            state.server = None;
            state.index.take()
        };
        let Some(index) = index else {
            return Ok(());
        };
        self.transport.withdraw(index);
        self.registry.deregister(index)?;
        info!(%index, "left cluster");
        Ok(())
    }

    /// Returns this node's index, if joined.
    #[must_use]
    pub fn index(&self) -> Option<NodeIndex> {
        self.state.lock().index
    }

    /// Returns the node currently acting as server, if known.
    #[must_use]
    pub fn current_server(&self) -> Option<NodeIndex> {
        self.state.lock().server
    }

    /// Returns true if this node is the acting server.
    #[must_use]
    pub fn is_server(&self) -> bool {
        let state = self.state.lock();
        state.index.is_some() && state.index == state.server
    }

    /// Returns the membership registry (diagnostics and tests).
    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// One heartbeat cycle: refresh the lease, probe the server link,
    /// purge dead peers and re-elect if needed.
    pub fn tick(&self) -> ClusterResult<()> {
        let Some(index) = self.state.lock().index else {
            return Err(ClusterError::NotJoined);
        };

        let now = Timestamp::wall();
        self.registry.heartbeat(index, now)?;
        self.registry
            .purge_stale_peers(now, self.config.stale_after, index)?;

        // Elect the lowest alive index, but a candidate only counts while
        // its link answers: a dead server has a fresh lease for a while,
        // and waiting out the lease would leave the cluster headless.
        let mut alive = self
            .registry
            .alive_indices(now, self.config.stale_after)?;
        let elected = loop {
            let candidate = alive.first().copied().unwrap_or(index);
            if candidate == index {
                break candidate;
            }
            if self.transport.request(candidate, Message::Ping).is_ok() {
                break candidate;
            }
            warn!(%candidate, "node link lost, removing from membership");
            self.registry.deregister(candidate)?;
            alive.retain(|c| *c != candidate);
        };

        {
            let mut state = self.state.lock();
            if state.server != Some(elected) {
                state.server = Some(elected);
                if elected == index {
                    info!(%index, "taking over as server");
                } else {
                    info!(%elected, "server changed");
                }
            }
        }

        if alive.len() == 1 && !self.registry.single_node_invariant()? {
            warn!("single connected node but node table has extra rows");
        }
        Ok(())
    }

    /// Broadcasts that instances of a type changed.
    ///
    /// A non-server node relays through the server; if the server link is
    /// dead the call fails hard and the next tick elects a replacement.
    pub fn broadcast_invalidate(&self, type_id: TypeId) -> ClusterResult<()> {
        let (index, server) = {
            let state = self.state.lock();
            (state.index, state.server)
        };
        let index = index.ok_or(ClusterError::NotJoined)?;
        let server = server.ok_or(ClusterError::ServerLost)?;

        let message = Message::Invalidate {
            origin: index.as_u32(),
            type_id: type_id.as_u32(),
        };
        if server == index {
            self.fan_out(message);
            Ok(())
        } else {
            match self.transport.request(server, message) {
                Ok(Message::Ack) => Ok(()),
                Ok(Message::Error { message }) => Err(ClusterError::remote(message)),
                Ok(other) => Err(ClusterError::Protocol(ProtocolError::unexpected(
                    other.label(),
                ))),
                Err(err) => {
                    warn!(%server, %err, "server unreachable during invalidation");
                    self.state.lock().server = None;
                    Err(ClusterError::ServerLost)
                }
            }
        }
    }

    /// Starts the background heartbeat thread.
    pub fn start_heartbeat(self: &Arc<Self>) {
        let mut slot = self.heartbeat.lock();
        if slot.is_some() {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);
        let me = Arc::clone(self);
        let stop = Arc::clone(&self.stop);
        let interval = self.config.heartbeat_interval;
        *slot = Some(std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(err) = me.tick() {
                    warn!(%err, "heartbeat tick failed");
                }
            }
        }));
    }

    fn stop_heartbeat(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat.lock().take() {
            let _ = handle.join();
        }
    }

    /// Picks the acting server on join: the lowest alive index, walking
    /// past candidates whose link turns out dead.
    fn connect_to_server(&self, index: NodeIndex, now: Timestamp) -> ClusterResult<NodeIndex> {
        let mut candidates = self
            .registry
            .alive_indices(now, self.config.stale_after)?;
        loop {
            let server = candidates.first().copied().unwrap_or(index);
            if server == index {
                self.state.lock().server = Some(index);
                return Ok(index);
            }
            match self
                .transport
                .request(server, Message::Hello {
                    node: index.as_u32(),
                }) {
                Ok(Message::Welcome { server: actual, .. }) => {
                    let actual = NodeIndex::new(actual);
                    self.state.lock().server = Some(actual);
                    return Ok(actual);
                }
                Ok(other) => {
                    return Err(ClusterError::Protocol(ProtocolError::unexpected(
                        other.label(),
                    )))
                }
                Err(err) => {
                    debug!(%server, %err, "candidate server unreachable, purging");
                    self.registry.deregister(server)?;
                    candidates.retain(|c| *c != server);
                }
            }
        }
    }

    /// Sends a message to every alive peer, best effort.
    ///
    /// Unreachable peers are only logged: their rows will go stale and the
    /// next tick purges them.
    fn fan_out(&self, message: Message) {
        let (index, origin) = {
            let state = self.state.lock();
            let origin = match &message {
                Message::Invalidate { origin, .. } | Message::InvalidateAll { origin } => {
                    Some(*origin)
                }
                _ => None,
            };
            (state.index, origin)
        };
        let Some(index) = index else { return };

        let now = Timestamp::wall();
        let peers = match self
            .registry
            .alive_indices(now, self.config.stale_after)
        {
            Ok(peers) => peers,
            Err(err) => {
                warn!(%err, "cannot enumerate peers for fan-out");
                return;
            }
        };
        for peer in peers {
            if peer == index || Some(peer.as_u32()) == origin {
                continue;
            }
            if let Err(err) = self.transport.request(peer, message.clone()) {
                warn!(%peer, %err, "fan-out delivery failed");
            }
        }
    }

    /// Serves one inbound protocol message.
    fn handle_message(&self, message: Message) -> Message {
        match message {
            Message::Ping => Message::Ack,
            Message::Hello { node } => {
                if !self.is_server() {
                    return Message::Error {
                        message: "not the acting server".to_string(),
                    };
                }
                debug!(node, "peer joined");
                let now = Timestamp::wall();
                let nodes = self
                    .registry
                    .alive_indices(now, self.config.stale_after)
                    .map(|all| all.iter().map(|n| n.as_u32()).collect())
                    .unwrap_or_default();
                Message::Welcome {
                    server: self.index().map(|i| i.as_u32()).unwrap_or(0),
                    nodes,
                }
            }
            Message::LockAcquire { .. } | Message::LockRelease { .. } | Message::ReleaseAll { .. } => {
                if self.is_server() {
                    self.arbiter.handle(message)
                } else {
                    Message::Error {
                        message: "not the acting server".to_string(),
                    }
                }
            }
            Message::Invalidate { origin, type_id } => {
                if let Err(err) = self.engine.invalidate_type(TypeId::new(type_id)) {
                    warn!(%err, type_id, "type invalidation failed");
                }
                if self.is_server() {
                    self.fan_out(Message::Invalidate { origin, type_id });
                }
                Message::Ack
            }
            Message::InvalidateAll { origin } => {
                self.engine.invalidate_all();
                if self.is_server() {
                    self.fan_out(Message::InvalidateAll { origin });
                }
                Message::Ack
            }
            Message::Leave { node } => {
                debug!(node, "peer departing");
                Message::Ack
            }
            other => Message::Error {
                message: format!("unexpected message: {}", other.label()),
            },
        }
    }

    /// Lock relay entry: local node asks the cluster for a lock.
    fn remote_acquire(
        &self,
        holder: HolderId,
        target: &LockTarget,
        mode: LockMode,
        timeout: Option<Duration>,
        session: &SessionInfo,
    ) -> ClusterResult<()> {
        let server = self.current_server().ok_or(ClusterError::ServerLost)?;
        if self.is_server() {
            self.arbiter
                .acquire(holder, target, mode, timeout, session)?;
            return Ok(());
        }

        let message = Message::LockAcquire {
            holder: wire_holder(holder),
            target: wire_target(target),
            exclusive: mode == LockMode::Exclusive,
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
            session: wire_session(session),
        };
        match self.transport.request(server, message) {
            Ok(Message::LockGranted) => Ok(()),
            Ok(Message::LockBusy { holder_session }) => {
                Err(ClusterError::Core(CoreError::LockTimeout {
                    target: *target,
                    holder: core_session(holder_session),
                }))
            }
            Ok(Message::Error { message }) => Err(ClusterError::remote(message)),
            Ok(other) => Err(ClusterError::Protocol(ProtocolError::unexpected(
                other.label(),
            ))),
            Err(err) => {
                warn!(%server, %err, "server unreachable during lock acquire");
                self.state.lock().server = None;
                Err(ClusterError::ServerLost)
            }
        }
    }

    fn remote_release(&self, holder: HolderId, target: &LockTarget) -> ClusterResult<()> {
        let server = self.current_server().ok_or(ClusterError::ServerLost)?;
        if self.is_server() {
            self.arbiter.release(holder, target)?;
            return Ok(());
        }
        let message = Message::LockRelease {
            holder: wire_holder(holder),
            target: wire_target(target),
        };
        self.expect_ack(server, message)
    }

    fn remote_release_all(&self, holder: HolderId) -> ClusterResult<()> {
        let server = self.current_server().ok_or(ClusterError::ServerLost)?;
        if self.is_server() {
            self.arbiter.release_all(holder);
            return Ok(());
        }
        self.expect_ack(
            server,
            Message::ReleaseAll {
                holder: wire_holder(holder),
            },
        )
    }

    fn expect_ack(&self, server: NodeIndex, message: Message) -> ClusterResult<()> {
        match self.transport.request(server, message) {
            Ok(Message::Ack) => Ok(()),
            Ok(Message::Error { message }) => Err(ClusterError::remote(message)),
            Ok(other) => Err(ClusterError::Protocol(ProtocolError::unexpected(
                other.label(),
            ))),
            Err(err) => {
                warn!(%server, %err, "server unreachable");
                self.state.lock().server = None;
                Err(ClusterError::ServerLost)
            }
        }
    }
}

/// [`LockRelay`] implementation handed to the engine.
struct CoordinatorRelay(Weak<NodeCoordinator>);

impl LockRelay for CoordinatorRelay {
    fn acquire(
        &self,
        holder: HolderId,
        target: &LockTarget,
        mode: LockMode,
        timeout: Option<Duration>,
        session: &SessionInfo,
    ) -> CoreResult<()> {
        let coordinator = self
            .0
            .upgrade()
            .ok_or_else(|| CoreError::coordination("coordinator shut down"))?;
        coordinator
            .remote_acquire(holder, target, mode, timeout, session)
            .map_err(ClusterError::into_core)
    }

    fn release(&self, holder: HolderId, target: &LockTarget) -> CoreResult<()> {
        let coordinator = self
            .0
            .upgrade()
            .ok_or_else(|| CoreError::coordination("coordinator shut down"))?;
        coordinator
            .remote_release(holder, target)
            .map_err(ClusterError::into_core)
    }

    fn release_all(&self, holder: HolderId) -> CoreResult<()> {
        let coordinator = self
            .0
            .upgrade()
            .ok_or_else(|| CoreError::coordination("coordinator shut down"))?;
        coordinator
            .remote_release_all(holder)
            .map_err(ClusterError::into_core)
    }
}

/// [`CommitFanout`] implementation handed to the engine.
struct CoordinatorFanout(Weak<NodeCoordinator>);

impl CommitFanout for CoordinatorFanout {
    fn content_changed(&self, types: &[TypeId]) -> CoreResult<()> {
        let coordinator = self
            .0
            .upgrade()
            .ok_or_else(|| CoreError::coordination("coordinator shut down"))?;
        for type_id in types {
            coordinator
                .broadcast_invalidate(*type_id)
                .map_err(ClusterError::into_core)?;
        }
        Ok(())
    }
}
