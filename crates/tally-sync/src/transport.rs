//! Transport abstraction for the sync protocol.
//!
//! The transport carries one typed request to a peer and suspends until the
//! typed response arrives. Implementations may use direct peer messaging,
//! remote calls, or in-process dispatch; the protocol does not care.

use async_trait::async_trait;

use tally_core::PeerId;

use crate::error::SyncError;
use crate::messages::{PeerRequest, PeerResponse};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Transport trait for request/response round trips.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request to a specific peer and wait for its response.
    ///
    /// Fails with [`SyncError::Unreachable`] when the peer cannot be
    /// contacted. Callers impose their own timeout on top.
    async fn request(&self, peer: &PeerId, request: PeerRequest) -> Result<PeerResponse>;

    /// Get the local peer's identity.
    fn local_peer_id(&self) -> PeerId;

    /// List currently reachable peers.
    async fn reachable_peers(&self) -> Result<Vec<PeerId>>;

    /// Check if a specific peer is reachable.
    async fn is_reachable(&self, peer: &PeerId) -> bool;
}

/// The responder side of the protocol: answers one request.
///
/// A transport implementation routes incoming requests to the handler its
/// peer registered. Handlers must never mutate the store - the protocol's
/// responder surface is strictly read-only.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Answer a request from `from`.
    async fn handle(&self, from: PeerId, request: PeerRequest) -> PeerResponse;
}

/// A simple in-memory transport for testing.
///
/// Routes requests directly to the handler registered for the target peer.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        /// Request handlers for each attached peer.
        handlers: RwLock<HashMap<PeerId, Arc<dyn RequestHandler>>>,
    }

    impl MemoryNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                handlers: RwLock::new(HashMap::new()),
            })
        }

        /// Attach a peer with its request handler, returning its transport.
        pub async fn attach(
            self: &Arc<Self>,
            peer_id: PeerId,
            handler: Arc<dyn RequestHandler>,
        ) -> MemoryTransport {
            self.handlers.write().await.insert(peer_id, handler);

            MemoryTransport {
                peer_id,
                network: Arc::clone(self),
            }
        }

        /// Detach a peer, making it unreachable to everyone.
        pub async fn disconnect(&self, peer: &PeerId) {
            self.handlers.write().await.remove(peer);
        }
    }

    impl Default for MemoryNetwork {
        fn default() -> Self {
            Self {
                handlers: RwLock::new(HashMap::new()),
            }
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        peer_id: PeerId,
        network: Arc<MemoryNetwork>,
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn request(&self, peer: &PeerId, request: PeerRequest) -> Result<PeerResponse> {
            let handler = {
                let handlers = self.network.handlers.read().await;
                handlers.get(peer).cloned()
            };

            match handler {
                Some(handler) => Ok(handler.handle(self.peer_id, request).await),
                None => Err(SyncError::Unreachable {
                    peer: *peer,
                    reason: "peer not connected".into(),
                }),
            }
        }

        fn local_peer_id(&self) -> PeerId {
            self.peer_id
        }

        async fn reachable_peers(&self) -> Result<Vec<PeerId>> {
            let handlers = self.network.handlers.read().await;
            Ok(handlers
                .keys()
                .filter(|id| **id != self.peer_id)
                .copied()
                .collect())
        }

        async fn is_reachable(&self, peer: &PeerId) -> bool {
            let handlers = self.network.handlers.read().await;
            handlers.contains_key(peer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryNetwork;
    use super::*;
    use crate::messages::PROTOCOL_VERSION;
    use std::sync::Arc;

    struct EchoHandler;

    #[async_trait]
    impl RequestHandler for EchoHandler {
        async fn handle(&self, _from: PeerId, request: PeerRequest) -> PeerResponse {
            match request {
                PeerRequest::ExchangeIds { known, .. } => PeerResponse::IdSet { known },
                PeerRequest::PeekTransaction { .. } => PeerResponse::Peek { exists: false },
                PeerRequest::GetTransaction { id } => PeerResponse::NotFound { id },
            }
        }
    }

    #[tokio::test]
    async fn test_memory_transport_request_response() {
        let network = MemoryNetwork::new();

        let peer_a = PeerId::from_bytes([0xaa; 32]);
        let peer_b = PeerId::from_bytes([0xbb; 32]);

        let transport_a = network.attach(peer_a, Arc::new(EchoHandler)).await;
        let _transport_b = network.attach(peer_b, Arc::new(EchoHandler)).await;

        let response = transport_a
            .request(
                &peer_b,
                PeerRequest::ExchangeIds {
                    protocol_version: PROTOCOL_VERSION,
                    known: vec![],
                },
            )
            .await
            .unwrap();

        assert!(matches!(response, PeerResponse::IdSet { known } if known.is_empty()));
    }

    #[tokio::test]
    async fn test_memory_transport_unreachable() {
        let network = MemoryNetwork::new();

        let peer_a = PeerId::from_bytes([0xaa; 32]);
        let peer_b = PeerId::from_bytes([0xbb; 32]);

        let transport_a = network.attach(peer_a, Arc::new(EchoHandler)).await;

        let result = transport_a
            .request(&peer_b, PeerRequest::PeekTransaction { id: tally_core::TxId::ZERO })
            .await;

        assert!(matches!(result, Err(SyncError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_memory_transport_disconnect() {
        let network = MemoryNetwork::new();

        let peer_a = PeerId::from_bytes([0xaa; 32]);
        let peer_b = PeerId::from_bytes([0xbb; 32]);

        let transport_a = network.attach(peer_a, Arc::new(EchoHandler)).await;
        let _transport_b = network.attach(peer_b, Arc::new(EchoHandler)).await;

        assert!(transport_a.is_reachable(&peer_b).await);

        network.disconnect(&peer_b).await;
        assert!(!transport_a.is_reachable(&peer_b).await);

        let result = transport_a
            .request(&peer_b, PeerRequest::PeekTransaction { id: tally_core::TxId::ZERO })
            .await;
        assert!(matches!(result, Err(SyncError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_reachable_peers_excludes_self() {
        let network = MemoryNetwork::new();

        let peer_a = PeerId::from_bytes([0xaa; 32]);
        let peer_b = PeerId::from_bytes([0xbb; 32]);

        let transport_a = network.attach(peer_a, Arc::new(EchoHandler)).await;
        let _transport_b = network.attach(peer_b, Arc::new(EchoHandler)).await;

        let peers = transport_a.reachable_peers().await.unwrap();
        assert_eq!(peers, vec![peer_b]);
    }
}
