//! Test fixtures and helpers.
//!
//! Common setup code for multi-peer sync and recovery tests.

use std::sync::Arc;

use tally_core::{
    canonical_bytes, EntryId, Keypair, PeerId, Transaction, TransactionBuilder, TxId,
};
use tally_store::{AdmitOutcome, LedgerStore, MemoryStore, StoreError};
use tally_sync::{MemoryNetwork, MemoryTransport, SyncService};

/// One peer under test: a keypair and an in-memory store.
pub struct TestPeer {
    pub keypair: Keypair,
    pub store: Arc<MemoryStore>,
}

impl TestPeer {
    /// Create a peer with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// This peer's identity.
    pub fn peer_id(&self) -> PeerId {
        self.keypair.peer_id()
    }

    /// Admit a transaction into this peer's store.
    pub async fn admit(&self, tx: &Transaction) -> Result<AdmitOutcome, StoreError> {
        self.store.admit(tx, &canonical_bytes(tx)).await
    }

    /// Derive an entry id owned by this peer.
    pub fn entry_id(&self, name: &str) -> EntryId {
        EntryId::derive(&self.peer_id(), name)
    }
}

impl Default for TestPeer {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple deterministic peers for multi-party tests.
pub fn multi_peer_fixtures(count: usize) -> Vec<TestPeer> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = (i + 1) as u8;
            TestPeer::with_seed(seed)
        })
        .collect()
}

/// An in-process network wiring peers' responder services together.
pub struct TestNet {
    pub network: Arc<MemoryNetwork>,
}

impl TestNet {
    /// Create an empty network.
    pub fn new() -> Self {
        Self {
            network: MemoryNetwork::new(),
        }
    }

    /// Attach a peer's responder service; returns its transport handle.
    pub async fn connect(&self, peer: &TestPeer) -> MemoryTransport {
        self.network
            .attach(
                peer.peer_id(),
                Arc::new(SyncService::new(peer.peer_id(), Arc::clone(&peer.store))),
            )
            .await
    }

    /// Make a peer unreachable.
    pub async fn disconnect(&self, peer: &PeerId) {
        self.network.disconnect(peer).await;
    }
}

impl Default for TestNet {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a two-party genesis transaction producing one entry.
///
/// The entry is owned by the originator; both peers endorse.
pub fn joint_entry(
    originator: &TestPeer,
    counterparty: &TestPeer,
    name: &str,
    memo: &[u8],
) -> Transaction {
    let entry = originator.entry_id(name);
    let mut pending = TransactionBuilder::new()
        .participant(originator.peer_id())
        .participant(counterparty.peer_id())
        .timestamp(now_millis())
        .produce(entry)
        .memo(memo.to_vec())
        .seal();
    pending.endorse(&originator.keypair);
    pending.endorse(&counterparty.keypair);
    pending.finish().expect("both participants endorsed")
}

/// Build a two-party amendment consuming `prev`'s version of the entry.
pub fn joint_amend(
    originator: &TestPeer,
    counterparty: &TestPeer,
    name: &str,
    prev: &Transaction,
    memo: &[u8],
) -> Transaction {
    let entry = originator.entry_id(name);
    let mut pending = TransactionBuilder::new()
        .participant(originator.peer_id())
        .participant(counterparty.peer_id())
        .timestamp(now_millis())
        .consume(entry, prev.compute_id())
        .produce(entry)
        .memo(memo.to_vec())
        .seal();
    pending.endorse(&originator.keypair);
    pending.endorse(&counterparty.keypair);
    pending.finish().expect("both participants endorsed")
}

/// Admit one transaction at every listed peer.
pub async fn settle(peers: &[&TestPeer], tx: &Transaction) -> Result<TxId, StoreError> {
    for peer in peers {
        peer.admit(tx).await?;
    }
    Ok(tx.compute_id())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
