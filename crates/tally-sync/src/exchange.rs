//! The id-set exchange: one round trip that diffs two peers' views of
//! their shared transactions.
//!
//! The requester sends the ids it holds for transactions involving both
//! peers; the responder answers with its own independently computed set.
//! The symmetric difference is taken requester-side. No interpretation
//! happens here - classification and recovery are the caller's business.

use std::collections::BTreeSet;
use std::time::Duration;

use tally_core::{PeerId, TxId};
use tally_store::LedgerStore;

use crate::error::{Result, SyncError};
use crate::messages::{PeerRequest, PeerResponse, PROTOCOL_VERSION};
use crate::transport::Transport;

/// The outcome of comparing two peers' id sets for one counterparty pair.
///
/// Both sets are disjoint from each other by construction and restricted to
/// transactions involving both peers. Findings are per-invocation values,
/// never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncFindings {
    /// Ids the counterparty holds that this peer does not.
    pub missing_locally: BTreeSet<TxId>,

    /// Ids this peer holds that the counterparty does not.
    pub missing_remotely: BTreeSet<TxId>,
}

impl SyncFindings {
    /// Whether the two peers agree on their shared transaction set.
    ///
    /// Partial overlap counts as disagreement: both sets must be empty.
    pub fn is_settled(&self) -> bool {
        self.missing_locally.is_empty() && self.missing_remotely.is_empty()
    }
}

/// Run one id exchange with a counterparty. Read-only on both sides.
///
/// Fails with [`SyncError::Unreachable`] when the counterparty cannot be
/// contacted within `timeout`, and [`SyncError::Protocol`] on a malformed
/// or unexpected response.
pub async fn exchange_ids<S, T>(
    store: &S,
    transport: &T,
    counterparty: &PeerId,
    timeout: Duration,
) -> Result<SyncFindings>
where
    S: LedgerStore + ?Sized,
    T: Transport + ?Sized,
{
    let local_peer = transport.local_peer_id();

    // Transactions involving both this peer and the counterparty.
    let with_counterparty = store.ids_involving(counterparty).await?;
    let with_self = store.ids_involving(&local_peer).await?;
    let local: BTreeSet<TxId> = with_counterparty
        .intersection(&with_self)
        .copied()
        .collect();

    let request = PeerRequest::ExchangeIds {
        protocol_version: PROTOCOL_VERSION,
        known: local.iter().copied().collect(),
    };
    request
        .validate_limits()
        .map_err(|reason| SyncError::Protocol(reason.into()))?;

    let response = match tokio::time::timeout(timeout, transport.request(counterparty, request))
        .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(SyncError::Unreachable {
                peer: *counterparty,
                reason: "id exchange timed out".into(),
            })
        }
    };

    let remote: BTreeSet<TxId> = match response {
        PeerResponse::IdSet { known } => known.into_iter().collect(),
        PeerResponse::Error { code, message } => {
            return Err(SyncError::PeerError { code, message })
        }
        other => {
            return Err(SyncError::Protocol(format!(
                "expected IdSet, got {:?}",
                std::mem::discriminant(&other)
            )))
        }
    };

    tracing::debug!(
        peer = %counterparty,
        local = local.len(),
        remote = remote.len(),
        "id exchange completed"
    );

    Ok(SyncFindings {
        missing_locally: remote.difference(&local).copied().collect(),
        missing_remotely: local.difference(&remote).copied().collect(),
    })
}
