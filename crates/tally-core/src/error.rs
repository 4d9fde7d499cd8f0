//! Error types for the tally core.

use thiserror::Error;

use crate::entry::EntryId;
use crate::types::PeerId;

/// Core errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("participant {0} has not endorsed")]
    MissingEndorsement(String),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for transaction structure and endorsements.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("endorsement signature verification failed for participant {0}")]
    SignatureFailed(PeerId),

    #[error("memo hash does not match header")]
    MemoHashMismatch,

    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("transaction lists no participants")]
    NoParticipants,

    #[error("participants exceed maximum of {max}: {got}")]
    TooManyParticipants { max: usize, got: usize },

    #[error("participant {0} listed more than once")]
    DuplicateParticipant(PeerId),

    #[error("inputs exceed maximum of {max}: {got}")]
    TooManyInputs { max: usize, got: usize },

    #[error("outputs exceed maximum of {max}: {got}")]
    TooManyOutputs { max: usize, got: usize },

    #[error("entry {0} consumed more than once")]
    DuplicateInput(EntryId),

    #[error("entry {0} produced more than once")]
    DuplicateOutput(EntryId),

    #[error("transaction consumes nothing and produces nothing")]
    NoEffect,

    #[error("entry {0} is consumed but not re-produced")]
    ConsumedEntryNotReproduced(EntryId),

    #[error("expected {expected} endorsements, got {got}")]
    EndorsementCountMismatch { expected: usize, got: usize },

    #[error("endorsement {index} signed by {signer}, expected participant {expected}")]
    EndorsementSignerMismatch {
        index: usize,
        signer: PeerId,
        expected: PeerId,
    },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::MalformedTransaction(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => ValidationError::StructuralError(msg),
            other => ValidationError::StructuralError(other.to_string()),
        }
    }
}
