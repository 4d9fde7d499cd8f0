//! The Ledger: unified API for one peer.
//!
//! A Ledger owns an identity keypair and a store, and exposes local
//! transaction creation plus the four sync entry points. The transport is
//! injected per call, so the same ledger can sync over different channels.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tally_core::{
    canonical_bytes, EntryId, EntryRecord, Keypair, PeerId, Transaction, TransactionBuilder, TxId,
};
use tally_store::{AdmitOutcome, LedgerStore};
use tally_sync::{
    ConsistencyOutcome, RecoveryConfig, RecoveryCoordinator, RecoveryReport, SyncConfig,
    SyncCoordinator, SyncFindings, SyncOrchestrator, SyncOutcome, SyncService, Transport,
    TransportFetcher,
};

use crate::error::{LedgerError, Result};

/// Configuration for a Ledger.
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    /// Sync configuration.
    pub sync: SyncConfig,
    /// Recovery configuration.
    pub recovery: RecoveryConfig,
}

/// One peer's ledger: identity, storage, and protocol entry points.
pub struct Ledger<S> {
    /// The identity keypair for this peer.
    keypair: Keypair,
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: LedgerConfig,
}

impl<S: LedgerStore + 'static> Ledger<S> {
    /// Create a ledger instance.
    pub fn new(keypair: Keypair, store: S, config: LedgerConfig) -> Self {
        Self::with_store(keypair, Arc::new(store), config)
    }

    /// Create a ledger over a store that is shared with other components.
    pub fn with_store(keypair: Keypair, store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            keypair,
            store,
            config,
        }
    }

    /// This peer's identity.
    pub fn peer_id(&self) -> PeerId {
        self.keypair.peer_id()
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The request handler that answers counterparty requests for this peer.
    ///
    /// Register it on the transport so other peers can exchange and fetch.
    pub fn service(&self) -> SyncService<S> {
        SyncService::new(self.peer_id(), Arc::clone(&self.store))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a new entry owned by this peer.
    ///
    /// Creates and admits a genesis transaction producing the entry.
    pub async fn open_entry(&self, name: &str, memo: &[u8]) -> Result<(EntryId, TxId)> {
        let entry_id = EntryId::derive(&self.peer_id(), name);

        if self.store.get_entry(&entry_id).await?.is_some() {
            return Err(LedgerError::EntryExists(entry_id));
        }

        let mut pending = TransactionBuilder::new()
            .participant(self.peer_id())
            .timestamp(now_millis())
            .produce(entry_id)
            .memo(memo.to_vec())
            .seal();
        pending.endorse(&self.keypair);
        let tx = pending.finish()?;
        let tx_id = tx.compute_id();

        self.store.admit(&tx, &canonical_bytes(&tx)).await?;
        Ok((entry_id, tx_id))
    }

    /// Advance an entry to its next version.
    pub async fn amend_entry(&self, entry_id: &EntryId, memo: &[u8]) -> Result<TxId> {
        let record = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(*entry_id))?;

        let mut pending = TransactionBuilder::new()
            .participant(self.peer_id())
            .timestamp(now_millis())
            .consume(*entry_id, record.head)
            .produce(*entry_id)
            .memo(memo.to_vec())
            .seal();
        pending.endorse(&self.keypair);
        let tx = pending.finish()?;
        let tx_id = tx.compute_id();

        self.store.admit(&tx, &canonical_bytes(&tx)).await?;
        Ok(tx_id)
    }

    /// Admit an externally created transaction (e.g., one this peer
    /// co-endorsed). The store re-verifies it.
    pub async fn admit(&self, tx: &Transaction) -> Result<AdmitOutcome> {
        Ok(self.store.admit(tx, &canonical_bytes(tx)).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a transaction by ID.
    pub async fn transaction(&self, id: &TxId) -> Result<Option<Transaction>> {
        Ok(self.store.get_transaction(id).await?)
    }

    /// Get an entry record.
    pub async fn entry(&self, entry_id: &EntryId) -> Result<Option<EntryRecord>> {
        Ok(self.store.get_entry(entry_id).await?)
    }

    /// Number of stored transactions.
    pub async fn transaction_count(&self) -> Result<u64> {
        Ok(self.store.transaction_count().await?)
    }

    /// Counterparties this peer has shared transactions with.
    pub async fn known_peers(&self) -> Result<BTreeSet<PeerId>> {
        let local = self.peer_id();
        Ok(self
            .store
            .known_peers()
            .await?
            .into_iter()
            .filter(|peer| *peer != local)
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Entry Points
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange id sets with the given peers (or all known peers).
    ///
    /// Read-only: detects divergence without changing anything.
    pub async fn sync<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        peers: Option<&[PeerId]>,
    ) -> Result<SyncOutcome> {
        let scope = self.resolve_scope(peers).await?;
        let coordinator =
            SyncCoordinator::new(Arc::clone(&self.store), transport, self.config.sync.clone());
        Ok(coordinator.sync(&scope).await)
    }

    /// Classify each peer as consistent or not. Never triggers recovery.
    pub async fn evaluate<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        peers: Option<&[PeerId]>,
    ) -> Result<ConsistencyOutcome> {
        let scope = self.resolve_scope(peers).await?;
        let coordinator =
            SyncCoordinator::new(Arc::clone(&self.store), transport, self.config.sync.clone());
        Ok(coordinator.evaluate(&scope).await)
    }

    /// Fetch and admit everything the findings report missing locally.
    pub async fn recover<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        findings: &BTreeMap<PeerId, SyncFindings>,
    ) -> Result<RecoveryReport> {
        let fetcher = TransportFetcher::new(transport, self.config.sync.request_timeout);
        let coordinator = RecoveryCoordinator::new(
            Arc::clone(&self.store),
            fetcher,
            self.config.recovery.clone(),
        );
        Ok(coordinator.recover(findings).await?)
    }

    /// Sync then recover, as one operation.
    pub async fn sync_and_recover<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
        peers: Option<&[PeerId]>,
    ) -> Result<RecoveryReport> {
        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&self.store),
            transport,
            self.config.sync.clone(),
            self.config.recovery.clone(),
        );
        let report = orchestrator.sync_and_recover(peers).await?;
        tracing::info!(
            admitted = report.admitted_count(),
            failures = report.failure_count(),
            "sync and recovery finished"
        );
        Ok(report)
    }

    /// Expand an optional peer list into the concrete scope.
    async fn resolve_scope(&self, peers: Option<&[PeerId]>) -> Result<Vec<PeerId>> {
        match peers {
            Some(list) => Ok(list.to_vec()),
            None => Ok(self.known_peers().await?.into_iter().collect()),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use tally_store::MemoryStore;

    fn test_ledger() -> Ledger<MemoryStore> {
        Ledger::new(
            Keypair::from_seed(&[0x42; 32]),
            MemoryStore::new(),
            LedgerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_open_and_amend_entry() {
        let ledger = test_ledger();

        let (entry_id, genesis_id) = ledger.open_entry("invoice-7", b"net 30").await.unwrap();
        let record = ledger.entry(&entry_id).await.unwrap().unwrap();
        assert_eq!(record.head, genesis_id);
        assert_eq!(record.version(), 1);

        let amend_id = ledger.amend_entry(&entry_id, b"net 60").await.unwrap();
        let record = ledger.entry(&entry_id).await.unwrap().unwrap();
        assert_eq!(record.head, amend_id);
        assert_eq!(record.version(), 2);
        assert_eq!(ledger.transaction_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_open_entry_twice_rejected() {
        let ledger = test_ledger();

        ledger.open_entry("invoice-7", b"one").await.unwrap();
        let result = ledger.open_entry("invoice-7", b"two").await;
        assert!(matches!(result, Err(LedgerError::EntryExists(_))));
    }

    #[tokio::test]
    async fn test_amend_unknown_entry_rejected() {
        let ledger = test_ledger();
        let entry_id = EntryId::derive(&ledger.peer_id(), "nowhere");

        let result = ledger.amend_entry(&entry_id, b"x").await;
        assert!(matches!(result, Err(LedgerError::EntryNotFound(_))));
    }

    #[tokio::test]
    async fn test_known_peers_excludes_self() {
        let ledger = test_ledger();
        ledger.open_entry("solo", b"x").await.unwrap();

        // The only participant on record is the ledger itself.
        assert!(ledger.known_peers().await.unwrap().is_empty());
    }
}
