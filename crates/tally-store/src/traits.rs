//! LedgerStore trait: the abstract interface for transaction persistence.
//!
//! This trait keeps the sync protocol storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::collections::BTreeSet;

use async_trait::async_trait;
use tally_core::{EntryId, EntryRecord, PeerId, Transaction, TxId};

use crate::error::{Result, StoreError};

/// Result of admitting a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The transaction was verified and committed.
    Admitted,
    /// The transaction is already in the store (idempotent - not an error).
    AlreadyPresent,
}

/// The LedgerStore trait: async interface for transaction persistence.
///
/// # Design Notes
///
/// - **Atomic admission**: a transaction and its entry-state effects commit
///   together or not at all, at most once per [`TxId`], even under
///   concurrent admission attempts for the same id.
/// - **Re-verification**: `admit` re-validates endorsements and checks that
///   every input consumes the current head of its entry. Callers never need
///   to pre-validate.
/// - **Idempotent admission**: admitting the same transaction twice returns
///   `AlreadyPresent`.
/// - **Involvement index**: `ids_involving` answers the sync protocol's
///   "transactions shared with this counterparty" query without scanning.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Verify and commit a transaction.
    ///
    /// # Arguments
    /// - `tx`: the transaction to admit.
    /// - `canonical`: its canonical bytes (cached to avoid recomputation).
    ///
    /// # Errors
    /// - [`StoreError::Verification`] / [`StoreError::StaleInput`] /
    ///   [`StoreError::OutputConflict`] when the transaction is invalid here.
    /// - [`StoreError::UnresolvedInput`] when a consumed version's producer
    ///   is not present locally; admit the producer first.
    async fn admit(&self, tx: &Transaction, canonical: &[u8]) -> Result<AdmitOutcome>;

    /// Get a transaction by its content-addressed ID.
    async fn get_transaction(&self, id: &TxId) -> Result<Option<Transaction>>;

    /// Get a transaction, failing with [`StoreError::NotFound`] if absent.
    async fn fetch_local(&self, id: &TxId) -> Result<Transaction> {
        self.get_transaction(id)
            .await?
            .ok_or(StoreError::NotFound(*id))
    }

    /// Check if a transaction exists by ID.
    async fn has_transaction(&self, id: &TxId) -> Result<bool>;

    /// Get the canonical bytes for a transaction (if cached).
    async fn get_canonical_bytes(&self, id: &TxId) -> Result<Option<Vec<u8>>>;

    /// Ids of all stored transactions that involve the given peer.
    async fn ids_involving(&self, peer: &PeerId) -> Result<BTreeSet<TxId>>;

    /// Every participant recorded across stored transactions.
    ///
    /// The store does not know which identity is "self"; callers remove
    /// their own id when they want counterparties only.
    async fn known_peers(&self) -> Result<BTreeSet<PeerId>>;

    /// Get the record of a ledger entry.
    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<EntryRecord>>;

    /// Number of stored transactions.
    async fn transaction_count(&self) -> Result<u64>;
}

/// Test-support fault injection: simulated catastrophic data loss.
///
/// Deleting a transaction removes its row and every index entry referencing
/// it, and reverts affected entry heads to their predecessors - the failure
/// scenario the sync protocol recovers from. Not part of the production
/// surface; recovery never deletes.
#[async_trait]
pub trait LossFault: LedgerStore {
    /// Delete the given transactions. Returns how many were actually removed.
    async fn lose_transactions(&self, ids: &[TxId]) -> Result<usize>;

    /// Delete every transaction involving the given peer.
    async fn lose_involving(&self, peer: &PeerId) -> Result<usize> {
        let ids: Vec<TxId> = self.ids_involving(peer).await?.into_iter().collect();
        self.lose_transactions(&ids).await
    }
}
