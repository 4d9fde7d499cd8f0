//! Sync protocol message types.
//!
//! Every round trip is one typed request and one typed response, so the
//! transport underneath (direct peer messaging, remote call, in-process)
//! is swappable without touching protocol logic.

use serde::{Deserialize, Serialize};

use tally_core::{Transaction, TxId};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// Message size limits.
pub mod limits {
    /// Max transaction ids in one ExchangeIds request or IdSet response.
    pub const MAX_IDS_PER_EXCHANGE: usize = 4096;
}

/// Requests a peer may receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerRequest {
    /// Id-set exchange: the requester's ids for transactions it shares with
    /// the responder. The responder answers with its own independently
    /// computed set; the symmetric difference is taken requester-side.
    ExchangeIds {
        /// Protocol version for compatibility checking.
        protocol_version: u8,
        /// Ids the requester holds, restricted to transactions involving
        /// both peers.
        known: Vec<TxId>,
    },

    /// Existence check without transfer.
    PeekTransaction {
        /// The transaction to check for.
        id: TxId,
    },

    /// Full transaction fetch.
    GetTransaction {
        /// The transaction to fetch.
        id: TxId,
    },
}

/// Responses to [`PeerRequest`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerResponse {
    /// The responder's id set for the requesting pair.
    IdSet {
        /// Ids the responder holds, restricted to transactions involving
        /// both peers.
        known: Vec<TxId>,
    },

    /// Answer to a peek.
    Peek {
        /// Whether the responder holds the transaction.
        exists: bool,
    },

    /// The requested transaction.
    Transaction {
        /// The transaction bytes.
        transaction: Box<Transaction>,
    },

    /// The responder does not hold the requested transaction.
    NotFound {
        /// The id that was requested.
        id: TxId,
    },

    /// Error condition.
    Error {
        /// Error code for programmatic handling.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

impl PeerRequest {
    /// Check if this request respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            PeerRequest::ExchangeIds { known, .. } => {
                if known.len() > limits::MAX_IDS_PER_EXCHANGE {
                    return Err("too many ids in exchange");
                }
            }
            PeerRequest::PeekTransaction { .. } | PeerRequest::GetTransaction { .. } => {}
        }
        Ok(())
    }
}

impl PeerResponse {
    /// Check if this response respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            PeerResponse::IdSet { known } => {
                if known.len() > limits::MAX_IDS_PER_EXCHANGE {
                    return Err("too many ids in id set");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Error codes for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown/unspecified error.
    Unknown = 0,
    /// Protocol version mismatch.
    VersionMismatch = 1,
    /// Message too large.
    MessageTooLarge = 2,
    /// Invalid message format.
    InvalidMessage = 3,
    /// Rate limited.
    RateLimited = 4,
    /// Internal error on the responder.
    Internal = 5,
}
