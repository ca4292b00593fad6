//! Server-side lock arbitration.

use crate::convert::{core_holder, core_session, core_target, wire_session};
use corral_cluster_protocol::Message;
use corral_core::lock::{HolderId, LockMode, LockTable};
use corral_core::{CoreError, CoreResult, CoreStats, LockTarget, SessionInfo};
use corral_meta::TypeRegistry;
use std::sync::Arc;
use std::time::Duration;

/// The acting server's global lock view.
///
/// Reuses the core lock arena with node-qualified holders: the same
/// conflict and hierarchy rules that govern threads within one process
/// govern transactions across processes. Blocked requests park inside the
/// arena; a release arriving from any node wakes them, which is how an
/// unlock on node A unblocks a waiter on node B.
pub struct LockArbiter {
    table: LockTable,
}

impl LockArbiter {
    /// Creates an arbiter over the shared type registry.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            table: LockTable::new(registry, Arc::new(CoreStats::new())),
        }
    }

    /// Acquires at the global view (also used when the server locks for
    /// its own transactions).
    pub fn acquire(
        &self,
        holder: HolderId,
        target: &LockTarget,
        mode: LockMode,
        timeout: Option<Duration>,
        session: &SessionInfo,
    ) -> CoreResult<()> {
        self.table.acquire(holder, session, *target, mode, timeout)
    }

    /// Releases one acquisition at the global view.
    pub fn release(&self, holder: HolderId, target: &LockTarget) -> CoreResult<()> {
        self.table.release(holder, target)
    }

    /// Releases everything a holder still holds at the global view.
    pub fn release_all(&self, holder: HolderId) -> usize {
        self.table.release_all(holder)
    }

    /// Dispatches one lock-protocol message.
    pub fn handle(&self, message: Message) -> Message {
        match message {
            Message::LockAcquire {
                holder,
                target,
                exclusive,
                timeout_ms,
                session,
            } => {
                let mode = if exclusive {
                    LockMode::Exclusive
                } else {
                    LockMode::Shared
                };
                let result = self.acquire(
                    core_holder(holder),
                    &core_target(&target),
                    mode,
                    timeout_ms.map(Duration::from_millis),
                    &core_session(session),
                );
                match result {
                    Ok(()) => Message::LockGranted,
                    Err(CoreError::LockTimeout { holder, .. }) => Message::LockBusy {
                        holder_session: wire_session(&holder),
                    },
                    Err(err) => Message::Error {
                        message: err.to_string(),
                    },
                }
            }
            Message::LockRelease { holder, target } => {
                match self.release(core_holder(holder), &core_target(&target)) {
                    Ok(()) => Message::Ack,
                    Err(err) => Message::Error {
                        message: err.to_string(),
                    },
                }
            }
            Message::ReleaseAll { holder } => {
                self.release_all(core_holder(holder));
                Message::Ack
            }
            other => Message::Error {
                message: format!("not a lock message: {}", other.label()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_cluster_protocol::{WireHolder, WireTarget};
    use corral_meta::TypeId;

    fn arbiter() -> LockArbiter {
        let registry = TypeRegistry::new();
        registry.register(TypeId::new(1), "Animal", []).unwrap();
        registry
            .register(TypeId::new(2), "Dog", [TypeId::new(1)])
            .unwrap();
        LockArbiter::new(Arc::new(registry))
    }

    fn acquire(holder: u32, type_id: u32, timeout_ms: Option<u64>) -> Message {
        Message::LockAcquire {
            holder: WireHolder {
                node: holder,
                txn: 1,
            },
            target: WireTarget {
                type_id,
                object: None,
            },
            exclusive: true,
            timeout_ms,
            session: Default::default(),
        }
    }

    #[test]
    fn grant_then_busy_across_nodes() {
        let a = arbiter();
        assert_eq!(a.handle(acquire(1, 1, None)), Message::LockGranted);

        // Different node, hierarchy-related type: busy.
        let response = a.handle(acquire(2, 2, Some(10)));
        assert!(matches!(response, Message::LockBusy { .. }));
    }

    #[test]
    fn release_all_frees_other_node() {
        let a = arbiter();
        assert_eq!(a.handle(acquire(1, 1, None)), Message::LockGranted);
        assert_eq!(
            a.handle(Message::ReleaseAll {
                holder: WireHolder { node: 1, txn: 1 }
            }),
            Message::Ack
        );
        assert_eq!(a.handle(acquire(2, 2, Some(10))), Message::LockGranted);
    }

    #[test]
    fn non_lock_message_rejected() {
        let a = arbiter();
        assert!(matches!(a.handle(Message::Ping), Message::Error { .. }));
    }
}
