//! # Corral Cluster Protocol
//!
//! Wire messages for the Corral node protocol.
//!
//! Nodes sharing one backing store coordinate through the elected server:
//! lock arbitration, cache invalidation fan-out and membership greetings
//! all travel as [`Message`] values, CBOR-encoded on the wire. The types
//! here are deliberately free of core dependencies - targets, holders and
//! sessions appear in their raw wire shape and are converted at the
//! cluster layer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{Message, WireHolder, WireSession, WireTarget};
