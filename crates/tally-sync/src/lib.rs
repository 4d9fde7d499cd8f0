//! # Tally Sync
//!
//! The ledger synchronization and recovery protocol: detect divergence in
//! the transactions two peers jointly witness, and recover what the local
//! store lost.
//!
//! ## Overview
//!
//! Each peer holds an independent transactional ledger with no global
//! visibility. A peer's store can silently lose data (crash, corruption,
//! partial restore). This crate provides:
//!
//! - **Id-set exchange** ([`exchange_ids`]): one round trip that diffs the
//!   two peers' views of their shared transactions into [`SyncFindings`]
//! - **Sync coordination** ([`SyncCoordinator`]): one exchange per
//!   counterparty, per-peer failures isolated and aggregated
//! - **Consistency evaluation** ([`SyncCoordinator::evaluate`]): findings
//!   reduced to a per-peer boolean, without triggering recovery
//! - **Recovery** ([`RecoveryCoordinator`]): fetch missing transactions,
//!   resolve their dependency chains, and re-admit them dependency-first
//! - **Orchestration** ([`SyncOrchestrator`]): sync + recovery as one
//!   operation over an optionally-defaulted peer list
//!
//! ## Key Properties
//!
//! - **Read-only detection**: exchanges never mutate either store
//! - **Idempotent recovery**: re-running with the same findings admits
//!   nothing new, so cancellation mid-run is safe
//! - **Failure isolation**: an unreachable peer or an unverifiable
//!   transaction surfaces in the report without aborting sibling work
//!
//! ## Message Flow
//!
//! ```text
//! Requester                           Responder
//!   |-------- ExchangeIds ------------->|
//!   |<------- IdSet --------------------|
//!   |   (diff -> findings; for each missing id:)
//!   |-------- GetTransaction ---------->|
//!   |<------- Transaction --------------|
//!   |   (resolve deps, admit locally)
//! ```

pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod fetch;
pub mod messages;
pub mod orchestrator;
pub mod recovery;
pub mod service;
pub mod transport;

pub use coordinator::{ConsistencyOutcome, SyncConfig, SyncCoordinator, SyncOutcome};
pub use error::{Result, SyncError};
pub use exchange::{exchange_ids, SyncFindings};
pub use fetch::{TransactionFetcher, TransportFetcher};
pub use messages::{limits, ErrorCode, PeerRequest, PeerResponse, PROTOCOL_VERSION};
pub use orchestrator::SyncOrchestrator;
pub use recovery::{
    RecoveryConfig, RecoveryCoordinator, RecoveryFailure, RecoveryOutcome, RecoveryReport,
};
pub use service::SyncService;
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, RequestHandler, Transport};
