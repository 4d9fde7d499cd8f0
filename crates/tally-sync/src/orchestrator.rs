//! One-shot composition: sync every counterparty, then recover.
//!
//! The orchestrator is for callers that want "make me whole" as a single
//! operation. Callers that only want the consistency signal use
//! [`SyncCoordinator::evaluate`] directly; that path never admits anything.

use std::sync::Arc;

use tally_core::PeerId;
use tally_store::LedgerStore;

use crate::coordinator::{SyncConfig, SyncCoordinator};
use crate::error::Result;
use crate::fetch::TransportFetcher;
use crate::recovery::{RecoveryConfig, RecoveryCoordinator, RecoveryReport};
use crate::transport::Transport;

/// Composes the sync and recovery coordinators over one store + transport.
pub struct SyncOrchestrator<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    sync_config: SyncConfig,
    recovery_config: RecoveryConfig,
}

impl<S, T> SyncOrchestrator<S, T>
where
    S: LedgerStore + 'static,
    T: Transport + 'static,
{
    /// Create an orchestrator.
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        sync_config: SyncConfig,
        recovery_config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            transport,
            sync_config,
            recovery_config,
        }
    }

    /// Sync the given peers (or every peer with shared history when `None`),
    /// then fetch and admit whatever is missing locally.
    ///
    /// Per-peer sync failures are folded into the report's `sync_failures`,
    /// so the returned report alone classifies the run.
    pub async fn sync_and_recover(&self, peers: Option<&[PeerId]>) -> Result<RecoveryReport> {
        let scope = self.resolve_scope(peers).await?;

        let coordinator = SyncCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transport),
            self.sync_config.clone(),
        );
        let outcome = coordinator.sync(&scope).await;

        let fetcher = TransportFetcher::new(
            Arc::clone(&self.transport),
            self.sync_config.request_timeout,
        );
        let recovery = RecoveryCoordinator::new(
            Arc::clone(&self.store),
            fetcher,
            self.recovery_config.clone(),
        );

        let mut report = recovery.recover(&outcome.findings).await?;
        report.sync_failures.extend(outcome.failures);
        Ok(report)
    }

    /// Expand an optional peer list into the concrete sync scope.
    ///
    /// `None` means every peer the local store has shared a transaction
    /// with, local identity excluded.
    pub async fn resolve_scope(&self, peers: Option<&[PeerId]>) -> Result<Vec<PeerId>> {
        match peers {
            Some(list) => Ok(list.to_vec()),
            None => {
                let local = self.transport.local_peer_id();
                Ok(self
                    .store
                    .known_peers()
                    .await?
                    .into_iter()
                    .filter(|peer| *peer != local)
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::RecoveryOutcome;
    use crate::service::SyncService;
    use crate::transport::memory::MemoryNetwork;
    use tally_core::{canonical_bytes, EntryId, Keypair, Transaction, TransactionBuilder};
    use tally_store::{LossFault, MemoryStore};

    fn joint_tx(a: &Keypair, b: &Keypair, name: &str) -> Transaction {
        let entry = EntryId::derive(&a.peer_id(), name);
        let mut pending = TransactionBuilder::new()
            .participant(a.peer_id())
            .participant(b.peer_id())
            .timestamp(1_000_000)
            .produce(entry)
            .memo(name.as_bytes().to_vec())
            .seal();
        pending.endorse(a);
        pending.endorse(b);
        pending.finish().unwrap()
    }

    async fn admit(store: &MemoryStore, tx: &Transaction) {
        store.admit(tx, &canonical_bytes(tx)).await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_and_recover_default_scope() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let bob = Keypair::from_seed(&[0x02; 32]);
        let carol = Keypair::from_seed(&[0x03; 32]);

        let alice_store = Arc::new(MemoryStore::new());
        let bob_store = Arc::new(MemoryStore::new());
        let carol_store = Arc::new(MemoryStore::new());

        let with_bob = joint_tx(&alice, &bob, "with-bob");
        let with_carol = joint_tx(&alice, &carol, "with-carol");
        for (store, tx) in [
            (&alice_store, &with_bob),
            (&bob_store, &with_bob),
            (&alice_store, &with_carol),
            (&carol_store, &with_carol),
        ] {
            admit(store, tx).await;
        }

        // Alice loses the carol transaction; the loss also erases carol from
        // her participant index.
        alice_store
            .lose_transactions(&[with_carol.compute_id()])
            .await
            .unwrap();

        let network = MemoryNetwork::new();
        let alice_transport = network
            .attach(
                alice.peer_id(),
                Arc::new(SyncService::new(alice.peer_id(), Arc::clone(&alice_store))),
            )
            .await;
        network
            .attach(
                bob.peer_id(),
                Arc::new(SyncService::new(bob.peer_id(), Arc::clone(&bob_store))),
            )
            .await;
        network
            .attach(
                carol.peer_id(),
                Arc::new(SyncService::new(carol.peer_id(), Arc::clone(&carol_store))),
            )
            .await;

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&alice_store),
            Arc::new(alice_transport),
            SyncConfig::default(),
            RecoveryConfig::default(),
        );

        // Default scope only reaches peers with surviving shared history.
        let scope = orchestrator.resolve_scope(None).await.unwrap();
        assert_eq!(scope, vec![bob.peer_id()]);

        // Running with the default scope touches only bob and is a no-op;
        // the carol divergence is left alone.
        let report = orchestrator.sync_and_recover(None).await.unwrap();
        assert_eq!(report.outcome(), RecoveryOutcome::Complete);
        assert_eq!(report.admitted_count(), 0);
        assert!(!alice_store
            .has_transaction(&with_carol.compute_id())
            .await
            .unwrap());

        // Named scope reaches carol and recovers the lost transaction.
        let report = orchestrator
            .sync_and_recover(Some(&[carol.peer_id()]))
            .await
            .unwrap();
        assert_eq!(report.outcome(), RecoveryOutcome::Complete);
        assert!(alice_store
            .has_transaction(&with_carol.compute_id())
            .await
            .unwrap());

        // Now carol is back in the default scope.
        let mut scope = orchestrator.resolve_scope(None).await.unwrap();
        scope.sort();
        let mut expected = vec![bob.peer_id(), carol.peer_id()];
        expected.sort();
        assert_eq!(scope, expected);
    }

    #[tokio::test]
    async fn test_sync_and_recover_folds_sync_failures() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let bob = Keypair::from_seed(&[0x02; 32]);
        let ghost = Keypair::from_seed(&[0x04; 32]);

        let alice_store = Arc::new(MemoryStore::new());
        let bob_store = Arc::new(MemoryStore::new());

        let tx = joint_tx(&alice, &bob, "pair");
        admit(&bob_store, &tx).await;

        let network = MemoryNetwork::new();
        let alice_transport = network
            .attach(
                alice.peer_id(),
                Arc::new(SyncService::new(alice.peer_id(), Arc::clone(&alice_store))),
            )
            .await;
        network
            .attach(
                bob.peer_id(),
                Arc::new(SyncService::new(bob.peer_id(), Arc::clone(&bob_store))),
            )
            .await;

        let orchestrator = SyncOrchestrator::new(
            Arc::clone(&alice_store),
            Arc::new(alice_transport),
            SyncConfig::default(),
            RecoveryConfig::default(),
        );

        let report = orchestrator
            .sync_and_recover(Some(&[bob.peer_id(), ghost.peer_id()]))
            .await
            .unwrap();

        // Bob's transaction recovered; the ghost peer shows up as a failure.
        assert!(alice_store.has_transaction(&tx.compute_id()).await.unwrap());
        assert_eq!(report.sync_failures.len(), 1);
        assert_eq!(report.outcome(), RecoveryOutcome::Partial);
    }
}
