//! The responder service: answers counterparty requests against a store.
//!
//! Strictly read-only. The service serves only transactions the requester
//! participates in; everything else reads as absent.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use tally_core::{PeerId, Transaction, TxId};
use tally_store::{LedgerStore, StoreError};

use crate::messages::{ErrorCode, PeerRequest, PeerResponse, PROTOCOL_VERSION};
use crate::transport::RequestHandler;

/// Answers [`PeerRequest`]s for one peer identity against its store.
pub struct SyncService<S> {
    peer_id: PeerId,
    store: Arc<S>,
}

impl<S: LedgerStore> SyncService<S> {
    /// Create a service answering for `peer_id` from `store`.
    pub fn new(peer_id: PeerId, store: Arc<S>) -> Self {
        Self { peer_id, store }
    }

    /// Ids of stored transactions involving both this peer and the requester.
    async fn shared_ids(&self, counterparty: &PeerId) -> Result<BTreeSet<TxId>, StoreError> {
        let with_counterparty = self.store.ids_involving(counterparty).await?;
        let with_self = self.store.ids_involving(&self.peer_id).await?;
        Ok(with_counterparty
            .intersection(&with_self)
            .copied()
            .collect())
    }

    /// Look up a transaction, but only if the requester is party to it.
    async fn lookup_for(
        &self,
        requester: &PeerId,
        id: &TxId,
    ) -> Result<Option<Transaction>, StoreError> {
        match self.store.get_transaction(id).await? {
            Some(tx) if tx.involves(requester) => Ok(Some(tx)),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl<S: LedgerStore> RequestHandler for SyncService<S> {
    async fn handle(&self, from: PeerId, request: PeerRequest) -> PeerResponse {
        if let Err(reason) = request.validate_limits() {
            return PeerResponse::Error {
                code: ErrorCode::MessageTooLarge,
                message: reason.into(),
            };
        }

        match request {
            PeerRequest::ExchangeIds {
                protocol_version,
                known,
            } => {
                if protocol_version != PROTOCOL_VERSION {
                    return PeerResponse::Error {
                        code: ErrorCode::VersionMismatch,
                        message: format!(
                            "local version {PROTOCOL_VERSION}, peer version {protocol_version}"
                        ),
                    };
                }

                match self.shared_ids(&from).await {
                    Ok(ids) => {
                        tracing::debug!(
                            peer = %from,
                            theirs = known.len(),
                            ours = ids.len(),
                            "id exchange answered"
                        );
                        PeerResponse::IdSet {
                            known: ids.into_iter().collect(),
                        }
                    }
                    Err(e) => PeerResponse::Error {
                        code: ErrorCode::Internal,
                        message: e.to_string(),
                    },
                }
            }

            PeerRequest::PeekTransaction { id } => match self.lookup_for(&from, &id).await {
                Ok(found) => PeerResponse::Peek {
                    exists: found.is_some(),
                },
                Err(e) => PeerResponse::Error {
                    code: ErrorCode::Internal,
                    message: e.to_string(),
                },
            },

            PeerRequest::GetTransaction { id } => match self.lookup_for(&from, &id).await {
                Ok(Some(tx)) => PeerResponse::Transaction {
                    transaction: Box::new(tx),
                },
                Ok(None) => PeerResponse::NotFound { id },
                Err(e) => PeerResponse::Error {
                    code: ErrorCode::Internal,
                    message: e.to_string(),
                },
            },
        }
    }
}
