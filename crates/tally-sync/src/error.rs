//! Error types for the sync module.

use thiserror::Error;

use tally_core::{PeerId, TxId};
use tally_store::StoreError;

use crate::messages::ErrorCode;

/// Errors that can occur during sync and recovery operations.
///
/// Per-peer and per-transaction variants are isolated and aggregated by the
/// coordinators; only [`SyncError::Store`] is fatal to a whole operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The counterparty could not be contacted (network failure or timeout).
    /// Retryable later; never fails the batch.
    #[error("peer {peer} unreachable: {reason}")]
    Unreachable { peer: PeerId, reason: String },

    /// Malformed or unexpected response from a counterparty.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The queried peer does not hold the requested transaction.
    #[error("transaction {id} not found at peer {peer}")]
    NotFound { id: TxId, peer: PeerId },

    /// A fetched transaction failed local validation. Never admitted, and
    /// not retried: re-fetching cannot change the outcome.
    #[error("transaction {id} failed verification: {reason}")]
    VerificationFailed { id: TxId, reason: String },

    /// A dependency chain could not be fully resolved; the dependent
    /// transaction is left unadmitted.
    #[error("transaction {id} left unadmitted: dependency {missing} unresolved")]
    DependencyUnresolved { id: TxId, missing: TxId },

    /// The counterparty answered with a protocol-level error.
    #[error("peer error ({code:?}): {message}")]
    PeerError { code: ErrorCode, message: String },

    /// Local store failure. Fatal to the whole operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
