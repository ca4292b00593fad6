//! Protocol message definitions.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A lock target in wire shape: a type, optionally narrowed to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTarget {
    /// Raw type id.
    pub type_id: u32,
    /// Raw persistence id; `None` means the whole type.
    pub object: Option<[u8; 16]>,
}

/// A lock holder in wire shape: node index plus transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireHolder {
    /// Node the holder runs on.
    pub node: u32,
    /// Raw transaction id on that node.
    pub txn: u64,
}

/// Session parameters in wire shape.
pub type WireSession = BTreeMap<String, String>;

/// One node-protocol message.
///
/// Requests and responses share the enum; [`Message::Ack`] and
/// [`Message::Error`] are the generic outcomes, lock arbitration has its
/// own grant/busy pair carrying the contending session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// A joining node greets the acting server.
    Hello {
        /// Index of the joining node.
        node: u32,
    },
    /// The server's answer to a greeting.
    Welcome {
        /// Index of the acting server.
        server: u32,
        /// Indices of all nodes the server currently sees.
        nodes: Vec<u32>,
    },
    /// Liveness probe.
    Ping,
    /// Request a lock at the server arbiter.
    LockAcquire {
        /// The requesting holder.
        holder: WireHolder,
        /// The requested target.
        target: WireTarget,
        /// True for exclusive mode, false for shared.
        exclusive: bool,
        /// Optional wait bound in milliseconds.
        timeout_ms: Option<u64>,
        /// The requester's session parameters.
        session: WireSession,
    },
    /// The arbiter granted the lock.
    LockGranted,
    /// The arbiter gave up waiting; someone else holds the target.
    LockBusy {
        /// Session parameters of a holder in the way.
        holder_session: WireSession,
    },
    /// Release one acquisition at the arbiter.
    LockRelease {
        /// The releasing holder.
        holder: WireHolder,
        /// The released target.
        target: WireTarget,
    },
    /// Release everything a holder still holds at the arbiter.
    ReleaseAll {
        /// The finished holder.
        holder: WireHolder,
    },
    /// Instances of a type changed; drop cached knowledge of it.
    Invalidate {
        /// Node whose commit caused the change.
        origin: u32,
        /// Raw id of the changed type.
        type_id: u32,
    },
    /// Drop every cache unconditionally (a node restarted from scratch).
    InvalidateAll {
        /// The restarted node.
        origin: u32,
    },
    /// A node is departing cleanly.
    Leave {
        /// Index of the departing node.
        node: u32,
    },
    /// Generic success.
    Ack,
    /// Generic failure.
    Error {
        /// Description of the failure.
        message: String,
    },
}

impl Message {
    /// Encodes the message as CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a message from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Message> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }

    /// Short label for diagnostics and unexpected-message errors.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::Welcome { .. } => "welcome",
            Message::Ping => "ping",
            Message::LockAcquire { .. } => "lock-acquire",
            Message::LockGranted => "lock-granted",
            Message::LockBusy { .. } => "lock-busy",
            Message::LockRelease { .. } => "lock-release",
            Message::ReleaseAll { .. } => "release-all",
            Message::Invalidate { .. } => "invalidate",
            Message::InvalidateAll { .. } => "invalidate-all",
            Message::Leave { .. } => "leave",
            Message::Ack => "ack",
            Message::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_lock_acquire() {
        let mut session = WireSession::new();
        session.insert("user".into(), "alice".into());
        let message = Message::LockAcquire {
            holder: WireHolder { node: 2, txn: 77 },
            target: WireTarget {
                type_id: 3,
                object: Some([7u8; 16]),
            },
            exclusive: true,
            timeout_ms: Some(500),
            session,
        };

        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn round_trip_type_target() {
        let message = Message::Invalidate {
            origin: 1,
            type_id: 9,
        };
        let decoded = Message::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            Message::decode(b"definitely not cbor"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(Message::Ack.label(), "ack");
        assert_eq!(Message::Ping.label(), "ping");
        assert_eq!(
            Message::Error {
                message: "x".into()
            }
            .label(),
            "error"
        );
    }
}
