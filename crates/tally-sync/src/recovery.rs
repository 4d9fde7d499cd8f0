//! Recovery: fetch missing transactions and re-admit them, dependencies
//! first.
//!
//! For each peer with a non-empty `missing_locally` set, every missing
//! transaction is fetched and its dependency chain resolved before
//! admission, so the store never observes a transaction whose inputs are
//! unresolved. Admission re-verifies everything; per-transaction failures
//! are recorded and never abort sibling work. `missing_remotely` entries
//! are the counterparty's concern and trigger no local action.
//!
//! Recovery is idempotent: ids already present are recognized and skipped
//! without fetching, so re-running after a cancellation is safe.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tally_core::{canonical_bytes, PeerId, Transaction, TxId};
use tally_store::{AdmitOutcome, LedgerStore, StoreError};

use crate::error::{Result, SyncError};
use crate::exchange::SyncFindings;
use crate::fetch::TransactionFetcher;

/// Configuration for recovery behavior.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Longest dependency chain recovery will follow before giving up.
    pub max_dependency_depth: usize,

    /// Peers to try for a dependency the origin peer does not hold.
    /// Empty by default: no alternate source is consulted unless the
    /// caller opts in.
    pub alternate_sources: Vec<PeerId>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_dependency_depth: 64,
            alternate_sources: Vec::new(),
        }
    }
}

/// One transaction that could not be recovered, and why.
#[derive(Debug)]
pub struct RecoveryFailure {
    /// The id from the findings that could not be admitted.
    pub id: TxId,
    /// What went wrong.
    pub error: SyncError,
}

/// Overall classification of a recovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Everything requested is now present locally.
    Complete,
    /// Some transactions were admitted, some failed.
    Partial,
    /// Nothing was recovered and at least one failure occurred.
    Failed,
}

/// What a recovery run did, per peer.
///
/// The report alone distinguishes complete from partial from failed runs;
/// no log inspection is required.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Ids actually admitted during this run, per peer. Includes
    /// dependencies that were pulled in along the way.
    pub admitted: BTreeMap<PeerId, BTreeSet<TxId>>,

    /// Requested ids that were already present locally, per peer.
    pub skipped: BTreeMap<PeerId, BTreeSet<TxId>>,

    /// Requested ids that could not be admitted, per peer.
    pub failures: BTreeMap<PeerId, Vec<RecoveryFailure>>,

    /// Peers whose sync exchange failed before recovery could start.
    /// Populated by the orchestrator.
    pub sync_failures: BTreeMap<PeerId, SyncError>,
}

impl RecoveryReport {
    /// Total number of transactions admitted in this run.
    pub fn admitted_count(&self) -> usize {
        self.admitted.values().map(BTreeSet::len).sum()
    }

    /// Ids admitted from one peer.
    pub fn admitted_from(&self, peer: &PeerId) -> usize {
        self.admitted.get(peer).map_or(0, BTreeSet::len)
    }

    /// Total number of per-transaction and per-peer failures.
    pub fn failure_count(&self) -> usize {
        self.failures.values().map(Vec::len).sum::<usize>() + self.sync_failures.len()
    }

    /// Classify this run.
    pub fn outcome(&self) -> RecoveryOutcome {
        if self.failure_count() == 0 {
            RecoveryOutcome::Complete
        } else if self.admitted_count() > 0 {
            RecoveryOutcome::Partial
        } else {
            RecoveryOutcome::Failed
        }
    }
}

/// Internal: how one chain resolution ended.
enum ChainError {
    /// This transaction's recovery failed; siblings continue.
    Isolated(SyncError),
    /// The local store is broken; abort the whole run.
    Fatal(SyncError),
}

/// Fetches and re-admits missing transactions, dependency order respected.
pub struct RecoveryCoordinator<S, F> {
    store: Arc<S>,
    fetcher: F,
    config: RecoveryConfig,
}

impl<S, F> RecoveryCoordinator<S, F>
where
    S: LedgerStore,
    F: TransactionFetcher,
{
    /// Create a coordinator admitting into `store` via `fetcher`.
    pub fn new(store: Arc<S>, fetcher: F, config: RecoveryConfig) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    /// Recover every transaction the findings report missing locally.
    ///
    /// Only a local store failure is fatal; everything else lands in the
    /// report as per-transaction detail.
    pub async fn recover(
        &self,
        findings: &BTreeMap<PeerId, SyncFindings>,
    ) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for (peer, peer_findings) in findings {
            for id in &peer_findings.missing_locally {
                // A sibling chain this run may have pulled this id in already.
                if report
                    .admitted
                    .get(peer)
                    .is_some_and(|set| set.contains(id))
                {
                    continue;
                }

                if self.store.has_transaction(id).await? {
                    report.skipped.entry(*peer).or_default().insert(*id);
                    continue;
                }

                let (admitted, failure) = self.recover_chain(*id, peer).await?;
                if !admitted.is_empty() {
                    report.admitted.entry(*peer).or_default().extend(admitted);
                }
                if let Some(error) = failure {
                    tracing::warn!(peer = %peer, id = %id, %error, "recovery failed");
                    report
                        .failures
                        .entry(*peer)
                        .or_default()
                        .push(RecoveryFailure { id: *id, error });
                }
            }
        }

        Ok(report)
    }

    /// Fetch `root` and its missing ancestors, then admit deps-first.
    ///
    /// Returns the ids admitted (possibly none) and the failure that stopped
    /// the chain, if any. Admitted ancestors stay admitted even when a later
    /// link fails - re-running recovery picks up where this left off.
    async fn recover_chain(
        &self,
        root: TxId,
        origin: &PeerId,
    ) -> Result<(Vec<TxId>, Option<SyncError>)> {
        let plan = match self.resolve_chain(root, origin).await {
            Ok(plan) => plan,
            Err(ChainError::Isolated(error)) => return Ok((Vec::new(), Some(error))),
            Err(ChainError::Fatal(error)) => return Err(error),
        };

        let mut admitted = Vec::new();
        for tx in plan {
            let id = tx.compute_id();
            match self.store.admit(&tx, &canonical_bytes(&tx)).await {
                Ok(AdmitOutcome::Admitted) => admitted.push(id),
                Ok(AdmitOutcome::AlreadyPresent) => {
                    // A concurrent recovery path got there first. Fine.
                }
                Err(e) if e.is_verification() => {
                    let error = SyncError::VerificationFailed {
                        id,
                        reason: e.to_string(),
                    };
                    return Ok((admitted, Some(error)));
                }
                Err(StoreError::UnresolvedInput { producer, .. }) => {
                    let error = SyncError::DependencyUnresolved {
                        id,
                        missing: producer,
                    };
                    return Ok((admitted, Some(error)));
                }
                Err(e) => return Err(SyncError::Store(e)),
            }
        }

        Ok((admitted, None))
    }

    /// Resolve the dependency chain of `root` into admission order.
    ///
    /// Iterative post-order walk: a frame is pushed once to expand its
    /// dependencies and once more to take its place after them. Anything
    /// already stored locally is not fetched.
    async fn resolve_chain(
        &self,
        root: TxId,
        origin: &PeerId,
    ) -> std::result::Result<Vec<Transaction>, ChainError> {
        struct Frame {
            id: TxId,
            depth: usize,
            expanded: bool,
        }

        let mut stack = vec![Frame {
            id: root,
            depth: 0,
            expanded: false,
        }];
        let mut fetched: HashMap<TxId, Transaction> = HashMap::new();
        let mut order: Vec<TxId> = Vec::new();
        let mut ordered: HashSet<TxId> = HashSet::new();

        while let Some(frame) = stack.pop() {
            if frame.expanded {
                if ordered.insert(frame.id) {
                    order.push(frame.id);
                }
                continue;
            }

            if fetched.contains_key(&frame.id) {
                continue;
            }

            match self.store.has_transaction(&frame.id).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => return Err(ChainError::Fatal(SyncError::Store(e))),
            }

            if frame.depth >= self.config.max_dependency_depth {
                return Err(ChainError::Isolated(SyncError::DependencyUnresolved {
                    id: root,
                    missing: frame.id,
                }));
            }

            let tx = match self.fetch_from_sources(&frame.id, origin).await {
                Ok(tx) => tx,
                Err(error) if frame.id == root => return Err(ChainError::Isolated(error)),
                Err(error) => {
                    tracing::debug!(id = %frame.id, %error, "dependency fetch failed");
                    return Err(ChainError::Isolated(SyncError::DependencyUnresolved {
                        id: root,
                        missing: frame.id,
                    }));
                }
            };

            stack.push(Frame {
                id: frame.id,
                depth: frame.depth,
                expanded: true,
            });
            for dep in tx.dependencies() {
                if !fetched.contains_key(&dep) && !ordered.contains(&dep) {
                    stack.push(Frame {
                        id: dep,
                        depth: frame.depth + 1,
                        expanded: false,
                    });
                }
            }
            fetched.insert(frame.id, tx);
        }

        Ok(order
            .into_iter()
            .filter_map(|id| fetched.remove(&id))
            .collect())
    }

    /// Fetch from the origin peer, then from configured alternates.
    ///
    /// Alternates are located with a peek before transferring. With no
    /// alternates configured, a miss at the origin is final.
    async fn fetch_from_sources(&self, id: &TxId, origin: &PeerId) -> Result<Transaction> {
        match self.fetcher.get(id, origin).await {
            Ok(tx) => return Ok(tx),
            Err(SyncError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        for alternate in &self.config.alternate_sources {
            if alternate == origin {
                continue;
            }
            match self.fetcher.peek(id, alternate).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(error) => {
                    tracing::debug!(peer = %alternate, %error, "peek failed");
                    continue;
                }
            }
            match self.fetcher.get(id, alternate).await {
                Ok(tx) => return Ok(tx),
                Err(error) => {
                    tracing::debug!(peer = %alternate, %error, "alternate fetch failed");
                    continue;
                }
            }
        }

        Err(SyncError::NotFound {
            id: *id,
            peer: *origin,
        })
    }
}
