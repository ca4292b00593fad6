//! Error types for the node protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur encoding, decoding or dispatching messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message failed to encode.
    #[error("encode error: {0}")]
    Encode(String),

    /// A message failed to decode.
    #[error("decode error: {0}")]
    Decode(String),

    /// A well-formed message arrived where it makes no sense.
    #[error("unexpected message: {got}")]
    UnexpectedMessage {
        /// Short description of the offending message.
        got: String,
    },
}

impl ProtocolError {
    /// Creates an unexpected-message error.
    pub fn unexpected(got: impl Into<String>) -> Self {
        Self::UnexpectedMessage { got: got.into() }
    }
}
