//! Error types for the Ledger facade.

use tally_core::{CoreError, EntryId, ValidationError};
use tally_store::StoreError;
use tally_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Core primitive error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync or recovery error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Entry already exists.
    #[error("entry already exists: {0}")]
    EntryExists(EntryId),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(EntryId),
}

/// Result type for Ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
