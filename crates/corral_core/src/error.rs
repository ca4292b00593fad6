//! Error types for Corral core.
//!
//! Three families, with different recovery contracts:
//! - **contention** (lock timeout, concurrent modification): recoverable by
//!   retry or user-visible conflict handling; carries the holder's session
//!   context and the affected target
//! - **coordination**: the cluster link failed mid-operation; the operation
//!   fails hard while the coordinator re-elects in the background
//! - **programming** (wrong thread, closed transaction, reentrancy
//!   underflow): fatal misuse, never silently corrected

use crate::session::SessionInfo;
use crate::types::{LockTarget, TransactionId};
use corral_meta::ObjectKey;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Corral core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Row store error.
    #[error("store error: {0}")]
    Store(#[from] corral_store::StoreError),

    /// Type metadata error.
    #[error("metadata error: {0}")]
    Meta(#[from] corral_meta::MetaError),

    /// A lock request timed out while another holder was in the way.
    #[error("lock timeout on {target}, held by [{holder}]")]
    LockTimeout {
        /// The contended target.
        target: LockTarget,
        /// Session info of the current holder.
        holder: SessionInfo,
    },

    /// The caller's in-memory copy is no longer the current version.
    #[error("concurrent modification of {target}")]
    ConcurrentModification {
        /// The stale target.
        target: LockTarget,
    },

    /// A new version was recorded for an object that was removed.
    #[error("object {key} was removed; no further versions may be opened")]
    ObjectRemoved {
        /// Key of the removed object.
        key: ObjectKey,
    },

    /// An object was created twice.
    #[error("object {key} is already persisted")]
    DuplicateObject {
        /// Key of the duplicated object.
        key: ObjectKey,
    },

    /// An update or removal referenced an object that was never persisted.
    #[error("object {key} is not persisted")]
    UnknownObject {
        /// The unknown key.
        key: ObjectKey,
    },

    /// The transaction has already committed or rolled back.
    #[error("transaction {txn} is no longer active")]
    TransactionClosed {
        /// The closed transaction.
        txn: TransactionId,
    },

    /// A transaction object was used from a thread other than its owner.
    #[error("transaction {txn} used from a foreign thread")]
    WrongThread {
        /// The misused transaction.
        txn: TransactionId,
    },

    /// A transaction-bound result was read outside its open transaction.
    #[error("result of transaction {txn} read outside that transaction")]
    ResultOutsideTransaction {
        /// The originating transaction.
        txn: TransactionId,
    },

    /// Lock bookkeeping found a non-positive reentrancy count.
    #[error("reentrancy underflow on {target}")]
    ReentrancyUnderflow {
        /// The corrupted lock target.
        target: LockTarget,
    },

    /// A cross-node coordination call failed.
    #[error("coordination failure: {message}")]
    Coordination {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a coordination failure error.
    pub fn coordination(message: impl Into<String>) -> Self {
        Self::Coordination {
            message: message.into(),
        }
    }

    /// Returns true for contention errors, which are recoverable by retry.
    #[must_use]
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            CoreError::LockTimeout { .. } | CoreError::ConcurrentModification { .. }
        )
    }

    /// Returns true for fatal misuse errors.
    #[must_use]
    pub fn is_programming(&self) -> bool {
        matches!(
            self,
            CoreError::WrongThread { .. }
                | CoreError::TransactionClosed { .. }
                | CoreError::ResultOutsideTransaction { .. }
                | CoreError::ReentrancyUnderflow { .. }
        )
    }

    /// Returns the holder's session info on contention errors.
    #[must_use]
    pub fn holder_session(&self) -> Option<&SessionInfo> {
        match self {
            CoreError::LockTimeout { holder, .. } => Some(holder),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_meta::TypeId;

    #[test]
    fn contention_classification() {
        let err = CoreError::ConcurrentModification {
            target: LockTarget::Type(TypeId::new(1)),
        };
        assert!(err.is_contention());
        assert!(!err.is_programming());
    }

    #[test]
    fn timeout_carries_holder_session() {
        let err = CoreError::LockTimeout {
            target: LockTarget::Type(TypeId::new(1)),
            holder: SessionInfo::new().with("user", "carol"),
        };
        assert_eq!(err.holder_session().unwrap().get("user"), Some("carol"));
        assert!(err.to_string().contains("user=carol"));
    }

    #[test]
    fn programming_classification() {
        let err = CoreError::WrongThread {
            txn: TransactionId::new(9),
        };
        assert!(err.is_programming());
        assert!(!err.is_contention());
    }
}
