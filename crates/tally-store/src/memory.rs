//! In-memory implementation of the LedgerStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use tally_core::{validate_transaction, EntryId, EntryRecord, PeerId, Transaction, TxId};

use crate::admission::{apply_entry_action, plan_entry_action, EntryAction};
use crate::error::{Result, StoreError};
use crate::traits::{AdmitOutcome, LedgerStore, LossFault};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock, so
/// admission is atomic and at-most-once per transaction id.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Transactions indexed by ID.
    transactions: HashMap<TxId, StoredTx>,

    /// Entry records.
    entries: HashMap<EntryId, EntryRecord>,

    /// Involvement index: participant -> transaction ids.
    participants: HashMap<PeerId, BTreeSet<TxId>>,
}

struct StoredTx {
    transaction: Transaction,
    canonical: Vec<u8>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                transactions: HashMap::new(),
                entries: HashMap::new(),
                participants: HashMap::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn admit(&self, tx: &Transaction, canonical: &[u8]) -> Result<AdmitOutcome> {
        let tx_id = tx.compute_id();
        let mut inner = self.inner.write().unwrap();

        if inner.transactions.contains_key(&tx_id) {
            return Ok(AdmitOutcome::AlreadyPresent);
        }

        validate_transaction(tx)?;

        // Inputs must consume versions whose producers are present.
        for input in &tx.header.inputs {
            if !inner.transactions.contains_key(&input.produced_by) {
                return Err(StoreError::UnresolvedInput {
                    entry: input.entry_id,
                    producer: input.produced_by,
                });
            }
        }

        // Plan every entry change before mutating anything.
        let mut lookup = |id: &TxId| -> Result<Option<Transaction>> {
            Ok(inner
                .transactions
                .get(id)
                .map(|stored| stored.transaction.clone()))
        };
        let mut actions: Vec<(EntryId, EntryAction)> = Vec::with_capacity(tx.header.outputs.len());
        for output in &tx.header.outputs {
            let action =
                plan_entry_action(tx, &tx_id, output, inner.entries.get(output), &mut lookup)?;
            actions.push((*output, action));
        }

        // Commit: everything below is infallible, so admission is atomic.
        let now = now_millis();
        inner.transactions.insert(
            tx_id,
            StoredTx {
                transaction: tx.clone(),
                canonical: canonical.to_vec(),
            },
        );
        for (entry_id, action) in actions {
            let record = inner.entries.remove(&entry_id);
            let updated = apply_entry_action(action, &entry_id, &tx_id, record, now);
            inner.entries.insert(entry_id, updated);
        }
        for participant in tx.participants() {
            inner
                .participants
                .entry(*participant)
                .or_default()
                .insert(tx_id);
        }

        Ok(AdmitOutcome::Admitted)
    }

    async fn get_transaction(&self, id: &TxId) -> Result<Option<Transaction>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .transactions
            .get(id)
            .map(|stored| stored.transaction.clone()))
    }

    async fn has_transaction(&self, id: &TxId) -> Result<bool> {
        let inner = self.inner.read().unwrap();
        Ok(inner.transactions.contains_key(id))
    }

    async fn get_canonical_bytes(&self, id: &TxId) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.transactions.get(id).map(|stored| stored.canonical.clone()))
    }

    async fn ids_involving(&self, peer: &PeerId) -> Result<BTreeSet<TxId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.participants.get(peer).cloned().unwrap_or_default())
    }

    async fn known_peers(&self) -> Result<BTreeSet<PeerId>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.participants.keys().copied().collect())
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<EntryRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.entries.get(entry_id).cloned())
    }

    async fn transaction_count(&self) -> Result<u64> {
        let inner = self.inner.read().unwrap();
        Ok(inner.transactions.len() as u64)
    }
}

#[async_trait]
impl LossFault for MemoryStore {
    async fn lose_transactions(&self, ids: &[TxId]) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        let now = now_millis();
        let mut removed = 0;

        for id in ids {
            let Some(stored) = inner.transactions.remove(id) else {
                continue;
            };
            removed += 1;
            let tx = stored.transaction;

            for participant in tx.participants() {
                if let Some(set) = inner.participants.get_mut(participant) {
                    set.remove(id);
                    if set.is_empty() {
                        inner.participants.remove(participant);
                    }
                }
            }

            for output in &tx.header.outputs {
                let Some(record) = inner.entries.get_mut(output) else {
                    continue;
                };
                if record.head == *id {
                    if record.revert_head(now).is_none() {
                        inner.entries.remove(output);
                    }
                } else {
                    record.history.retain(|h| h != id);
                    record.updated_at = now;
                }
            }
        }

        tracing::debug!(requested = ids.len(), removed, "simulated data loss");
        Ok(removed)
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
