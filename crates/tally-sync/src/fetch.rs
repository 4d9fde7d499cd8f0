//! Transaction fetching: how recovery pulls missing transactions from peers.
//!
//! The fetcher is pluggable so recovery can ride on any reachable-peer
//! transport. There is deliberately no write capability here: recovery is
//! strictly read-then-locally-admit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use tally_core::{PeerId, Transaction, TxId};

use crate::error::{Result, SyncError};
use crate::messages::{PeerRequest, PeerResponse};
use crate::transport::Transport;

/// Retrieves transactions from named peers.
#[async_trait]
pub trait TransactionFetcher: Send + Sync {
    /// Existence check without transfer.
    async fn peek(&self, id: &TxId, peer: &PeerId) -> Result<bool>;

    /// Fetch a transaction. Fails with [`SyncError::NotFound`] if the peer
    /// does not hold it (or will not serve it).
    async fn get(&self, id: &TxId, peer: &PeerId) -> Result<Transaction>;
}

/// Fetcher backed by the protocol transport.
pub struct TransportFetcher<T> {
    transport: Arc<T>,
    request_timeout: Duration,
}

impl<T: Transport> TransportFetcher<T> {
    /// Create a fetcher issuing requests over `transport`.
    pub fn new(transport: Arc<T>, request_timeout: Duration) -> Self {
        Self {
            transport,
            request_timeout,
        }
    }

    async fn request(&self, peer: &PeerId, request: PeerRequest) -> Result<PeerResponse> {
        match tokio::time::timeout(self.request_timeout, self.transport.request(peer, request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Unreachable {
                peer: *peer,
                reason: "request timed out".into(),
            }),
        }
    }
}

#[async_trait]
impl<T: Transport> TransactionFetcher for TransportFetcher<T> {
    async fn peek(&self, id: &TxId, peer: &PeerId) -> Result<bool> {
        let response = self
            .request(peer, PeerRequest::PeekTransaction { id: *id })
            .await?;

        match response {
            PeerResponse::Peek { exists } => Ok(exists),
            PeerResponse::Error { code, message } => Err(SyncError::PeerError { code, message }),
            other => Err(SyncError::Protocol(format!(
                "expected Peek, got {:?}",
                std::mem::discriminant(&other)
            ))),
        }
    }

    async fn get(&self, id: &TxId, peer: &PeerId) -> Result<Transaction> {
        let response = self
            .request(peer, PeerRequest::GetTransaction { id: *id })
            .await?;

        match response {
            PeerResponse::Transaction { transaction } => {
                // The id is content-derived; a mismatch means the peer sent
                // the wrong (or a tampered) transaction.
                if transaction.compute_id() != *id {
                    return Err(SyncError::Protocol(format!(
                        "peer {peer} returned a transaction with mismatched id for {id}"
                    )));
                }
                Ok(*transaction)
            }
            PeerResponse::NotFound { .. } => Err(SyncError::NotFound {
                id: *id,
                peer: *peer,
            }),
            PeerResponse::Error { code, message } => Err(SyncError::PeerError { code, message }),
            other => Err(SyncError::Protocol(format!(
                "expected Transaction, got {:?}",
                std::mem::discriminant(&other)
            ))),
        }
    }
}
