//! Error types for the store module.

use thiserror::Error;

use tally_core::{EntryId, TxId, ValidationError};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transaction not found.
    #[error("transaction not found: {0}")]
    NotFound(TxId),

    /// The transaction failed validation at admission.
    #[error("verification failed: {0}")]
    Verification(#[from] ValidationError),

    /// An input references a producing transaction that is not present.
    #[error("entry {entry} input unresolved: producer {producer} not in store")]
    UnresolvedInput { entry: EntryId, producer: TxId },

    /// An input does not consume the entry's current head.
    #[error("stale input for entry {entry}: head is {head}, consumed {consumed}")]
    StaleInput {
        entry: EntryId,
        head: TxId,
        consumed: TxId,
    },

    /// An output re-produces an existing entry without consuming its head.
    #[error("output conflict for entry {entry}: current head {head} not consumed")]
    OutputConflict { entry: EntryId, head: TxId },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A blocking store task failed to run.
    #[error("store task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error means the transaction itself is invalid
    /// (re-fetching or retrying cannot change the outcome).
    pub fn is_verification(&self) -> bool {
        matches!(
            self,
            StoreError::Verification(_)
                | StoreError::StaleInput { .. }
                | StoreError::OutputConflict { .. }
        )
    }

    /// Whether this error means a dependency is missing locally.
    pub fn is_unresolved_input(&self) -> bool {
        matches!(self, StoreError::UnresolvedInput { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
