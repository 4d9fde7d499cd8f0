//! Sync coordination: one id exchange per counterparty, failures isolated.
//!
//! Peers are independent; exchanges run under a bounded fan-out. The default
//! fan-out of 1 reproduces sequential behavior, which is a performance
//! choice, not a correctness requirement - callers must not rely on any
//! cross-peer ordering.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use tally_core::PeerId;
use tally_store::LedgerStore;

use crate::error::{Result, SyncError};
use crate::exchange::{exchange_ids, SyncFindings};
use crate::transport::Transport;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Timeout for one protocol round trip.
    pub request_timeout: Duration,
    /// How many counterparties to exchange with concurrently.
    pub max_fanout: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_fanout: 1,
        }
    }
}

/// Findings and failures from syncing a list of peers.
///
/// Every input peer lands in exactly one of the two maps: `findings` on a
/// completed exchange, `failures` otherwise. Errors are aggregated, never
/// swallowed, and never abort sibling exchanges.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Per-peer findings for peers whose exchange completed.
    pub findings: BTreeMap<PeerId, SyncFindings>,

    /// Per-peer errors for peers whose exchange failed.
    pub failures: BTreeMap<PeerId, SyncError>,
}

impl SyncOutcome {
    /// Whether every exchange completed and found both sides settled.
    pub fn all_settled(&self) -> bool {
        self.failures.is_empty() && self.findings.values().all(SyncFindings::is_settled)
    }
}

/// Per-peer consistency classification.
#[derive(Debug, Default)]
pub struct ConsistencyOutcome {
    /// True iff neither side of that peer's findings has unseen transactions.
    pub consistent: BTreeMap<PeerId, bool>,

    /// Per-peer errors for peers whose exchange failed.
    pub failures: BTreeMap<PeerId, SyncError>,
}

/// Drives id exchanges across counterparties.
pub struct SyncCoordinator<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    config: SyncConfig,
}

impl<S, T> SyncCoordinator<S, T>
where
    S: LedgerStore + 'static,
    T: Transport + 'static,
{
    /// Create a coordinator over the given store and transport.
    pub fn new(store: Arc<S>, transport: Arc<T>, config: SyncConfig) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Run one id exchange with a single counterparty.
    pub async fn exchange_with(&self, counterparty: &PeerId) -> Result<SyncFindings> {
        exchange_ids(
            self.store.as_ref(),
            self.transport.as_ref(),
            counterparty,
            self.config.request_timeout,
        )
        .await
    }

    /// Exchange with every listed peer, isolating per-peer failures.
    pub async fn sync(&self, peers: &[PeerId]) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        // Duplicate entries would just repeat the same exchange.
        let mut queue: Vec<PeerId> = Vec::with_capacity(peers.len());
        for peer in peers {
            if !queue.contains(peer) {
                queue.push(*peer);
            }
        }
        let mut queue = queue.into_iter();

        let fanout = self.config.max_fanout.max(1);
        let mut tasks: JoinSet<(PeerId, Result<SyncFindings>)> = JoinSet::new();

        loop {
            while tasks.len() < fanout {
                let Some(peer) = queue.next() else { break };
                let store = Arc::clone(&self.store);
                let transport = Arc::clone(&self.transport);
                let timeout = self.config.request_timeout;
                tasks.spawn(async move {
                    let result =
                        exchange_ids(store.as_ref(), transport.as_ref(), &peer, timeout).await;
                    (peer, result)
                });
            }

            match tasks.join_next().await {
                Some(Ok((peer, Ok(findings)))) => {
                    outcome.findings.insert(peer, findings);
                }
                Some(Ok((peer, Err(error)))) => {
                    tracing::warn!(peer = %peer, %error, "id exchange failed");
                    outcome.failures.insert(peer, error);
                }
                Some(Err(join_error)) => {
                    tracing::warn!(%join_error, "exchange task aborted");
                }
                None => break,
            }
        }

        outcome
    }

    /// Classify each peer as consistent or not.
    ///
    /// A peer is consistent only when *neither side* has unseen
    /// transactions. This entry point never triggers recovery.
    pub async fn evaluate(&self, peers: &[PeerId]) -> ConsistencyOutcome {
        let outcome = self.sync(peers).await;

        ConsistencyOutcome {
            consistent: outcome
                .findings
                .iter()
                .map(|(peer, findings)| (*peer, findings.is_settled()))
                .collect(),
            failures: outcome.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SyncService;
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use tally_core::{canonical_bytes, EntryId, Keypair, Transaction, TransactionBuilder};
    use tally_store::MemoryStore;

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

    async fn attach(
        network: &Arc<MemoryNetwork>,
        keypair: &Keypair,
        store: &Arc<MemoryStore>,
    ) -> MemoryTransport {
        network
            .attach(
                keypair.peer_id(),
                Arc::new(SyncService::new(keypair.peer_id(), Arc::clone(store))),
            )
            .await
    }

    #[tokio::test]
    async fn test_sync_isolates_unreachable_peer() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let bob = Keypair::from_seed(&[0x02; 32]);
        let carol = Keypair::from_seed(&[0x03; 32]);

        let alice_store = Arc::new(MemoryStore::new());
        let bob_store = Arc::new(MemoryStore::new());

        let shared = joint_tx(&alice, &bob, "shared");
        alice_store
            .admit(&shared, &canonical_bytes(&shared))
            .await
            .unwrap();
        bob_store
            .admit(&shared, &canonical_bytes(&shared))
            .await
            .unwrap();

        let network = MemoryNetwork::new();
        let alice_transport = attach(&network, &alice, &alice_store).await;
        let _bob_transport = attach(&network, &bob, &bob_store).await;
        // Carol never attaches: unreachable.

        let coordinator = SyncCoordinator::new(
            Arc::clone(&alice_store),
            Arc::new(alice_transport),
            SyncConfig::default(),
        );

        let outcome = coordinator.sync(&[bob.peer_id(), carol.peer_id()]).await;

        assert_eq!(outcome.findings.len(), 1);
        assert!(outcome.findings[&bob.peer_id()].is_settled());
        assert!(matches!(
            outcome.failures.get(&carol.peer_id()),
            Some(SyncError::Unreachable { .. })
        ));
        assert!(!outcome.all_settled());
    }

    #[tokio::test]
    async fn test_evaluate_reports_per_peer_consistency() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let bob = Keypair::from_seed(&[0x02; 32]);
        let carol = Keypair::from_seed(&[0x03; 32]);

        let alice_store = Arc::new(MemoryStore::new());
        let bob_store = Arc::new(MemoryStore::new());
        let carol_store = Arc::new(MemoryStore::new());

        // Bob agrees with Alice; Carol holds a transaction Alice lost.
        let with_bob = joint_tx(&alice, &bob, "with-bob");
        for store in [&alice_store, &bob_store] {
            store
                .admit(&with_bob, &canonical_bytes(&with_bob))
                .await
                .unwrap();
        }
        let with_carol = joint_tx(&alice, &carol, "with-carol");
        carol_store
            .admit(&with_carol, &canonical_bytes(&with_carol))
            .await
            .unwrap();

        let network = MemoryNetwork::new();
        let alice_transport = attach(&network, &alice, &alice_store).await;
        let _bob_transport = attach(&network, &bob, &bob_store).await;
        let _carol_transport = attach(&network, &carol, &carol_store).await;

        let coordinator = SyncCoordinator::new(
            Arc::clone(&alice_store),
            Arc::new(alice_transport),
            SyncConfig::default(),
        );

        let outcome = coordinator.evaluate(&[bob.peer_id(), carol.peer_id()]).await;

        assert_eq!(outcome.consistent[&bob.peer_id()], true);
        assert_eq!(outcome.consistent[&carol.peer_id()], false);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_sync_with_wider_fanout_same_findings() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let others: Vec<Keypair> = (2u8..6).map(|i| Keypair::from_seed(&[i; 32])).collect();

        let alice_store = Arc::new(MemoryStore::new());
        let network = MemoryNetwork::new();
        let alice_transport = attach(&network, &alice, &alice_store).await;

        let mut peer_ids = Vec::new();
        for other in &others {
            let store = Arc::new(MemoryStore::new());
            let tx = joint_tx(&alice, other, "pair");
            store.admit(&tx, &canonical_bytes(&tx)).await.unwrap();
            attach(&network, other, &store).await;
            peer_ids.push(other.peer_id());
        }

        let coordinator = SyncCoordinator::new(
            Arc::clone(&alice_store),
            Arc::new(alice_transport),
            SyncConfig {
                max_fanout: 4,
                ..SyncConfig::default()
            },
        );

        let outcome = coordinator.sync(&peer_ids).await;

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.findings.len(), peer_ids.len());
        for peer in &peer_ids {
            assert_eq!(outcome.findings[peer].missing_locally.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_sync_dedupes_input_peers() {
        let alice = Keypair::from_seed(&[0x01; 32]);
        let bob = Keypair::from_seed(&[0x02; 32]);

        let alice_store = Arc::new(MemoryStore::new());
        let bob_store = Arc::new(MemoryStore::new());

        let network = MemoryNetwork::new();
        let alice_transport = attach(&network, &alice, &alice_store).await;
        let _bob_transport = attach(&network, &bob, &bob_store).await;

        let coordinator = SyncCoordinator::new(
            Arc::clone(&alice_store),
            Arc::new(alice_transport),
            SyncConfig::default(),
        );

        let outcome = coordinator.sync(&[bob.peer_id(), bob.peer_id()]).await;
        assert_eq!(outcome.findings.len(), 1);
    }
}
