//! Transport abstraction for the node protocol.

use crate::error::{ClusterError, ClusterResult};
use corral_cluster_protocol::Message;
use corral_core::NodeIndex;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Handles one inbound request and produces the response.
pub type MessageHandler = Arc<dyn Fn(Message) -> Message + Send + Sync>;

/// Request/response transport between nodes.
///
/// Implementations route by node index. A target without a live endpoint
/// is a hard error; the caller treats it as a lost connection and lets the
/// coordinator fail over.
pub trait ClusterTransport: Send + Sync {
    /// Sends a request and waits for the response.
    fn request(&self, to: NodeIndex, message: Message) -> ClusterResult<Message>;

    /// Installs the handler serving a node's inbound requests.
    fn serve(&self, node: NodeIndex, handler: MessageHandler);

    /// Removes a node's endpoint. Requests to it fail afterwards.
    fn withdraw(&self, node: NodeIndex);
}

/// In-process transport for tests and single-process clusters.
///
/// Several coordinator instances in one process register endpoints on one
/// bus, standing in for separate processes the way separate OS processes
/// would connect over TCP. Messages still pass through the CBOR codec both
/// ways, so the wire format is exercised.
#[derive(Default)]
pub struct MemoryBus {
    endpoints: RwLock<HashMap<u32, MessageHandler>>,
}

impl MemoryBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live endpoints.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().len()
    }
}

impl ClusterTransport for MemoryBus {
    fn request(&self, to: NodeIndex, message: Message) -> ClusterResult<Message> {
        // Clone the handler out so nested requests never deadlock the map.
        let handler = self
            .endpoints
            .read()
            .get(&to.as_u32())
            .cloned()
            .ok_or(ClusterError::NodeUnreachable { node: to.as_u32() })?;

        let delivered = Message::decode(&message.encode()?)?;
        let response = handler(delivered);
        Ok(Message::decode(&response.encode()?)?)
    }

    fn serve(&self, node: NodeIndex, handler: MessageHandler) {
        self.endpoints.write().insert(node.as_u32(), handler);
    }

    fn withdraw(&self, node: NodeIndex) {
        self.endpoints.write().remove(&node.as_u32());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_reaches_handler() {
        let bus = MemoryBus::new();
        bus.serve(
            NodeIndex::new(1),
            Arc::new(|message| match message {
                Message::Ping => Message::Ack,
                other => Message::Error {
                    message: other.label().to_string(),
                },
            }),
        );

        let response = bus.request(NodeIndex::new(1), Message::Ping).unwrap();
        assert_eq!(response, Message::Ack);
    }

    #[test]
    fn missing_endpoint_is_unreachable() {
        let bus = MemoryBus::new();
        let err = bus.request(NodeIndex::new(7), Message::Ping).unwrap_err();
        assert!(matches!(err, ClusterError::NodeUnreachable { node: 7 }));
    }

    #[test]
    fn withdraw_kills_endpoint() {
        let bus = MemoryBus::new();
        bus.serve(NodeIndex::new(1), Arc::new(|_| Message::Ack));
        assert_eq!(bus.endpoint_count(), 1);

        bus.withdraw(NodeIndex::new(1));
        assert!(bus.request(NodeIndex::new(1), Message::Ping).is_err());
    }

    #[test]
    fn nested_request_from_handler_does_not_deadlock() {
        let bus = Arc::new(MemoryBus::new());
        let inner = Arc::clone(&bus);
        bus.serve(NodeIndex::new(2), Arc::new(|_| Message::Ack));
        bus.serve(
            NodeIndex::new(1),
            Arc::new(move |_| {
                inner
                    .request(NodeIndex::new(2), Message::Ping)
                    .unwrap_or(Message::Error {
                        message: "relay failed".into(),
                    })
            }),
        );

        let response = bus.request(NodeIndex::new(1), Message::Ping).unwrap();
        assert_eq!(response, Message::Ack);
    }
}
