//! Error types for the row store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in row store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested table does not exist.
    #[error("unknown table: {name}")]
    UnknownTable {
        /// Name of the table.
        name: String,
    },

    /// The requested row does not exist.
    #[error("row {row_id} not found in table {table}")]
    RowNotFound {
        /// Table searched.
        table: String,
        /// Row id that was not found.
        row_id: u64,
    },

    /// I/O error from a persistent backend.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot data could not be decoded.
    #[error("snapshot corruption: {message}")]
    SnapshotCorruption {
        /// Description of the corruption.
        message: String,
    },
}

impl StoreError {
    /// Creates an unknown-table error.
    pub fn unknown_table(name: impl Into<String>) -> Self {
        Self::UnknownTable { name: name.into() }
    }

    /// Creates a row-not-found error.
    pub fn row_not_found(table: impl Into<String>, row_id: u64) -> Self {
        Self::RowNotFound {
            table: table.into(),
            row_id,
        }
    }

    /// Creates a snapshot corruption error.
    pub fn snapshot_corruption(message: impl Into<String>) -> Self {
        Self::SnapshotCorruption {
            message: message.into(),
        }
    }
}
