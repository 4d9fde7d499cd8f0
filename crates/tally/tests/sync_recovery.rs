//! End-to-end sync and recovery over an in-process network.
//!
//! Two to four peers, each with its own store and ledger, wired through the
//! memory transport. Data loss is injected through the store's fault
//! operation, never by reaching into store internals.

use std::sync::Arc;

use tally::store::{LedgerStore, LossFault, MemoryStore};
use tally::sync::{MemoryTransport, RecoveryOutcome, SyncError};
use tally::{Ledger, LedgerConfig};
use tally_testkit::{joint_entry, multi_peer_fixtures, settle, TestNet, TestPeer};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn ledger_for(peer: &TestPeer) -> Ledger<MemoryStore> {
    Ledger::with_store(
        peer.keypair.clone(),
        Arc::clone(&peer.store),
        LedgerConfig::default(),
    )
}

async fn connect_all(net: &TestNet, peers: &[TestPeer]) -> Vec<Arc<MemoryTransport>> {
    let mut transports = Vec::with_capacity(peers.len());
    for peer in peers {
        transports.push(Arc::new(net.connect(peer).await));
    }
    transports
}

#[tokio::test]
async fn symmetry_of_triviality() {
    // Two peers with no shared transactions report empty findings for each
    // other, in both directions.
    let peers = multi_peer_fixtures(2);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;

    let ledger_a = ledger_for(&peers[0]);
    let ledger_b = ledger_for(&peers[1]);

    let outcome_a = ledger_a
        .sync(Arc::clone(&transports[0]), Some(&[peers[1].peer_id()]))
        .await
        .unwrap();
    assert!(outcome_a.all_settled());
    assert!(outcome_a.findings[&peers[1].peer_id()].is_settled());

    let outcome_b = ledger_b
        .sync(Arc::clone(&transports[1]), Some(&[peers[0].peer_id()]))
        .await
        .unwrap();
    assert!(outcome_b.all_settled());
}

#[tokio::test]
async fn monotonic_detection() {
    // After losing exactly N shared transactions, the counterparty reads as
    // inconsistent and missing_locally has size N.
    for n in 1..=3usize {
        let peers = multi_peer_fixtures(2);
        let net = TestNet::new();
        let transports = connect_all(&net, &peers).await;
        let ledger = ledger_for(&peers[0]);

        let mut ids = Vec::new();
        for i in 0..n {
            let tx = joint_entry(&peers[0], &peers[1], &format!("entry-{i}"), b"x");
            ids.push(settle(&[&peers[0], &peers[1]], &tx).await.unwrap());
        }

        peers[0].store.lose_transactions(&ids).await.unwrap();

        let consistency = ledger
            .evaluate(Arc::clone(&transports[0]), Some(&[peers[1].peer_id()]))
            .await
            .unwrap();
        assert!(!consistency.consistent[&peers[1].peer_id()]);

        let outcome = ledger
            .sync(Arc::clone(&transports[0]), Some(&[peers[1].peer_id()]))
            .await
            .unwrap();
        let findings = &outcome.findings[&peers[1].peer_id()];
        assert_eq!(findings.missing_locally.len(), n);
        assert!(findings.missing_remotely.is_empty());
    }
}

#[tokio::test]
async fn bidirectional_detection() {
    // Counterparties that lost data the requester still holds read as
    // inconsistent; a counterparty with no loss reads as consistent.
    let peers = multi_peer_fixtures(4);
    let (requester, a, b, c) = (&peers[0], &peers[1], &peers[2], &peers[3]);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(requester);

    for (i, counterparty) in [a, b, c].into_iter().enumerate() {
        let tx = joint_entry(requester, counterparty, &format!("pair-{i}"), b"x");
        settle(&[requester, counterparty], &tx).await.unwrap();
    }

    // A and B lose their copies; C keeps everything.
    a.store.lose_involving(&requester.peer_id()).await.unwrap();
    b.store.lose_involving(&requester.peer_id()).await.unwrap();

    let consistency = ledger
        .evaluate(
            Arc::clone(&transports[0]),
            Some(&[a.peer_id(), b.peer_id(), c.peer_id()]),
        )
        .await
        .unwrap();

    assert!(!consistency.consistent[&a.peer_id()]);
    assert!(!consistency.consistent[&b.peer_id()]);
    assert!(consistency.consistent[&c.peer_id()]);

    let outcome = ledger
        .sync(
            Arc::clone(&transports[0]),
            Some(&[a.peer_id(), b.peer_id()]),
        )
        .await
        .unwrap();
    assert_eq!(outcome.findings[&a.peer_id()].missing_remotely.len(), 1);
    assert_eq!(outcome.findings[&b.peer_id()].missing_remotely.len(), 1);
}

#[tokio::test]
async fn recovery_completeness() {
    init_tracing();

    // After recovering N missing transactions, a fresh sync is settled and
    // the local count went up by exactly N.
    let peers = multi_peer_fixtures(2);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(&peers[0]);

    let mut ids = Vec::new();
    for i in 0..3 {
        let tx = joint_entry(&peers[0], &peers[1], &format!("entry-{i}"), b"x");
        ids.push(settle(&[&peers[0], &peers[1]], &tx).await.unwrap());
    }

    peers[0].store.lose_transactions(&ids).await.unwrap();
    let before = ledger.transaction_count().await.unwrap();

    let outcome = ledger
        .sync(Arc::clone(&transports[0]), Some(&[peers[1].peer_id()]))
        .await
        .unwrap();
    assert_eq!(
        outcome.findings[&peers[1].peer_id()].missing_locally.len(),
        3
    );

    let report = ledger
        .recover(Arc::clone(&transports[0]), &outcome.findings)
        .await
        .unwrap();
    assert_eq!(report.outcome(), RecoveryOutcome::Complete);
    assert_eq!(report.admitted_count(), 3);
    assert_eq!(ledger.transaction_count().await.unwrap(), before + 3);

    let after = ledger
        .sync(Arc::clone(&transports[0]), Some(&[peers[1].peer_id()]))
        .await
        .unwrap();
    assert!(after.findings[&peers[1].peer_id()].is_settled());
}

#[tokio::test]
async fn recovery_idempotence() {
    // Recovering twice with the same findings ends in the same store state;
    // the second run admits nothing.
    let peers = multi_peer_fixtures(2);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(&peers[0]);

    let tx = joint_entry(&peers[0], &peers[1], "pair", b"x");
    let id = settle(&[&peers[0], &peers[1]], &tx).await.unwrap();
    peers[0].store.lose_transactions(&[id]).await.unwrap();

    let outcome = ledger
        .sync(Arc::clone(&transports[0]), Some(&[peers[1].peer_id()]))
        .await
        .unwrap();

    let first = ledger
        .recover(Arc::clone(&transports[0]), &outcome.findings)
        .await
        .unwrap();
    assert_eq!(first.admitted_count(), 1);
    let count_after_first = ledger.transaction_count().await.unwrap();

    let second = ledger
        .recover(Arc::clone(&transports[0]), &outcome.findings)
        .await
        .unwrap();
    assert_eq!(second.admitted_count(), 0);
    assert_eq!(second.outcome(), RecoveryOutcome::Complete);
    assert_eq!(ledger.transaction_count().await.unwrap(), count_after_first);
}

#[tokio::test]
async fn scoped_recovery_leaves_other_peers_alone() {
    // sync_and_recover scoped to B recovers only what B shares; the
    // divergence against C is untouched.
    let peers = multi_peer_fixtures(3);
    let (alice, bob, carol) = (&peers[0], &peers[1], &peers[2]);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(alice);

    let with_bob = joint_entry(alice, bob, "with-bob", b"x");
    let bob_id = settle(&[alice, bob], &with_bob).await.unwrap();
    let with_carol = joint_entry(alice, carol, "with-carol", b"x");
    let carol_id = settle(&[alice, carol], &with_carol).await.unwrap();

    alice
        .store
        .lose_transactions(&[bob_id, carol_id])
        .await
        .unwrap();

    let report = ledger
        .sync_and_recover(Arc::clone(&transports[0]), Some(&[bob.peer_id()]))
        .await
        .unwrap();
    assert_eq!(report.outcome(), RecoveryOutcome::Complete);

    assert!(alice.store.has_transaction(&bob_id).await.unwrap());
    assert!(!alice.store.has_transaction(&carol_id).await.unwrap());

    // C still reads as inconsistent until recovered explicitly.
    let consistency = ledger
        .evaluate(Arc::clone(&transports[0]), Some(&[carol.peer_id()]))
        .await
        .unwrap();
    assert!(!consistency.consistent[&carol.peer_id()]);
}

#[tokio::test]
async fn default_scope_reaches_every_known_peer() {
    // With no peer list, recovery reaches every peer the store still has
    // shared history with.
    let peers = multi_peer_fixtures(3);
    let (alice, bob, carol) = (&peers[0], &peers[1], &peers[2]);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(alice);

    // Two transactions per counterparty; lose one of each so shared history
    // (and thus peer discovery) survives.
    let keep_bob = joint_entry(alice, bob, "keep-bob", b"x");
    settle(&[alice, bob], &keep_bob).await.unwrap();
    let lose_bob = joint_entry(alice, bob, "lose-bob", b"x");
    let lose_bob_id = settle(&[alice, bob], &lose_bob).await.unwrap();

    let keep_carol = joint_entry(alice, carol, "keep-carol", b"x");
    settle(&[alice, carol], &keep_carol).await.unwrap();
    let lose_carol = joint_entry(alice, carol, "lose-carol", b"x");
    let lose_carol_id = settle(&[alice, carol], &lose_carol).await.unwrap();

    alice
        .store
        .lose_transactions(&[lose_bob_id, lose_carol_id])
        .await
        .unwrap();

    let report = ledger
        .sync_and_recover(Arc::clone(&transports[0]), None)
        .await
        .unwrap();

    assert_eq!(report.outcome(), RecoveryOutcome::Complete);
    assert_eq!(report.admitted_from(&bob.peer_id()), 1);
    assert_eq!(report.admitted_from(&carol.peer_id()), 1);
    assert!(alice.store.has_transaction(&lose_bob_id).await.unwrap());
    assert!(alice.store.has_transaction(&lose_carol_id).await.unwrap());
}

#[tokio::test]
async fn unreachable_peer_does_not_block_recovery() {
    // One dead counterparty surfaces as its own failure; recovery from the
    // live one proceeds.
    let peers = multi_peer_fixtures(3);
    let (alice, bob, carol) = (&peers[0], &peers[1], &peers[2]);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(alice);

    let with_bob = joint_entry(alice, bob, "with-bob", b"x");
    let bob_id = settle(&[alice, bob], &with_bob).await.unwrap();
    let with_carol = joint_entry(alice, carol, "with-carol", b"x");
    let carol_id = settle(&[alice, carol], &with_carol).await.unwrap();

    alice
        .store
        .lose_transactions(&[bob_id, carol_id])
        .await
        .unwrap();
    net.disconnect(&carol.peer_id()).await;

    let report = ledger
        .sync_and_recover(
            Arc::clone(&transports[0]),
            Some(&[bob.peer_id(), carol.peer_id()]),
        )
        .await
        .unwrap();

    assert!(alice.store.has_transaction(&bob_id).await.unwrap());
    assert!(!alice.store.has_transaction(&carol_id).await.unwrap());
    assert!(matches!(
        report.sync_failures.get(&carol.peer_id()),
        Some(SyncError::Unreachable { .. })
    ));
    assert_eq!(report.outcome(), RecoveryOutcome::Partial);
}

#[tokio::test]
async fn literal_example_scenario() {
    // The two-counterparty walk-through: one transaction with B, one with
    // C, total local loss, then full recovery back to 2.
    let peers = multi_peer_fixtures(3);
    let (requester, b, c) = (&peers[0], &peers[1], &peers[2]);
    let net = TestNet::new();
    let transports = connect_all(&net, &peers).await;
    let ledger = ledger_for(requester);

    assert_eq!(ledger.transaction_count().await.unwrap(), 0);

    let with_b = joint_entry(requester, b, "with-b", b"x");
    let with_b_id = settle(&[requester, b], &with_b).await.unwrap();
    let with_c = joint_entry(requester, c, "with-c", b"x");
    let with_c_id = settle(&[requester, c], &with_c).await.unwrap();
    assert_eq!(ledger.transaction_count().await.unwrap(), 2);

    // Requester loses all local data.
    requester
        .store
        .lose_transactions(&[with_b_id, with_c_id])
        .await
        .unwrap();
    assert_eq!(ledger.transaction_count().await.unwrap(), 0);

    let consistency = ledger
        .evaluate(
            Arc::clone(&transports[0]),
            Some(&[b.peer_id(), c.peer_id()]),
        )
        .await
        .unwrap();
    assert!(!consistency.consistent[&b.peer_id()]);
    assert!(!consistency.consistent[&c.peer_id()]);

    let outcome = ledger
        .sync(
            Arc::clone(&transports[0]),
            Some(&[b.peer_id(), c.peer_id()]),
        )
        .await
        .unwrap();
    assert_eq!(outcome.findings[&b.peer_id()].missing_locally.len(), 1);
    assert_eq!(outcome.findings[&c.peer_id()].missing_locally.len(), 1);

    let report = ledger
        .recover(Arc::clone(&transports[0]), &outcome.findings)
        .await
        .unwrap();
    assert_eq!(report.outcome(), RecoveryOutcome::Complete);
    assert_eq!(ledger.transaction_count().await.unwrap(), 2);
}
