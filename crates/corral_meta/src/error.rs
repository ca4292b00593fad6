//! Error types for type metadata.

use crate::key::TypeId;
use thiserror::Error;

/// Result type for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Errors that can occur in metadata operations.
#[derive(Debug, Error)]
pub enum MetaError {
    /// A type id was used before being registered.
    #[error("unknown type: {type_id}")]
    UnknownType {
        /// The unregistered type id.
        type_id: TypeId,
    },

    /// A type id was registered twice.
    #[error("type already registered: {type_id}")]
    DuplicateType {
        /// The duplicated type id.
        type_id: TypeId,
    },

    /// A closure entry references a type that is not registered.
    #[error("supertype {supertype} of {type_id} is not registered")]
    UnknownSupertype {
        /// The type being registered.
        type_id: TypeId,
        /// The missing supertype.
        supertype: TypeId,
    },
}
