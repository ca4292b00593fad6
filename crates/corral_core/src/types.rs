//! Core type definitions for Corral.

use corral_meta::{ObjectKey, TypeId};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a transaction.
///
/// Transaction ids are monotonically increasing per node and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Index of one node (process) in the cluster.
///
/// Node indices are unique among connected processes and assigned from the
/// shared node table on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Creates a node index from its raw value.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Millisecond-resolution timestamp.
///
/// Timestamps double as version stamps: the `valid_from` of an object's
/// current row identifies that version for currency checks. The logical
/// clock keeps them strictly monotonic per node even when wall time stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The zero timestamp, before anything was written.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from raw milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Reads the current wall clock.
    #[must_use]
    pub fn wall() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.0)
    }
}

/// Target of a lock request: one object, or a whole type and its hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTarget {
    /// A concrete object identity.
    Object(ObjectKey),
    /// A type handle covering, transitively, its subtypes and supertypes.
    Type(TypeId),
}

impl LockTarget {
    /// Returns the type this target belongs to.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        match self {
            LockTarget::Object(key) => key.type_id,
            LockTarget::Type(type_id) => *type_id,
        }
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTarget::Object(key) => write!(f, "{key}"),
            LockTarget::Type(type_id) => write!(f, "{type_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_id_ordering() {
        assert!(TransactionId::new(1) < TransactionId::new(2));
    }

    #[test]
    fn wall_clock_is_nonzero() {
        assert!(Timestamp::wall() > Timestamp::ZERO);
    }

    #[test]
    fn lock_target_type() {
        use corral_meta::PersistenceId;
        let key = ObjectKey::new(TypeId::new(4), PersistenceId::generate());
        assert_eq!(LockTarget::Object(key).type_id(), TypeId::new(4));
        assert_eq!(LockTarget::Type(TypeId::new(7)).type_id(), TypeId::new(7));
    }
}
