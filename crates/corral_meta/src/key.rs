//! Object and type identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a persisted type.
///
/// Type ids are assigned by the mapping layer when types are registered
/// and are stable for the lifetime of the schema.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Creates a type id from its raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

/// Identifier of one persisted object.
///
/// Objects that have never been saved are keyed by a freshly generated
/// surrogate id; the surrogate *becomes* the persistence id at first save,
/// so locks taken before saving stay attributed to the same target after.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PersistenceId(pub Uuid);

impl PersistenceId {
    /// Generates a fresh id (also the surrogate for unsaved objects).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw byte representation.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PersistenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical key of one object: its type plus its persistence id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ObjectKey {
    /// Type of the object.
    pub type_id: TypeId,
    /// Persistence id (or pre-save surrogate) of the object.
    pub id: PersistenceId,
}

impl ObjectKey {
    /// Creates an object key.
    #[must_use]
    pub const fn new(type_id: TypeId, id: PersistenceId) -> Self {
        Self { type_id, id }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_id, self.id)
    }
}
