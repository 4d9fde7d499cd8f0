//! # Tally Testkit
//!
//! Testing utilities for the tally ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: peers, in-process networks, and joint-transaction
//!   helpers for multi-party sync and recovery scenarios
//! - **Generators**: proptest strategies for property-based testing
//! - **Determinism vectors**: known inputs whose derived canonical bytes
//!   and ids must reproduce across implementations
//!
//! ## Fixtures
//!
//! ```rust
//! use tally_testkit::{joint_entry, multi_peer_fixtures};
//!
//! # async fn example() {
//! let peers = multi_peer_fixtures(2);
//! let tx = joint_entry(&peers[0], &peers[1], "invoice-7", b"net 30");
//! peers[0].admit(&tx).await.unwrap();
//! peers[1].admit(&tx).await.unwrap();
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tally_testkit::generators::{transaction_from_params, TransactionParams};
//!
//! proptest! {
//!     #[test]
//!     fn tx_id_is_deterministic(params: TransactionParams) {
//!         let t1 = transaction_from_params(&params);
//!         let t2 = transaction_from_params(&params);
//!         prop_assert_eq!(t1.compute_id(), t2.compute_id());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    joint_amend, joint_entry, multi_peer_fixtures, settle, TestNet, TestPeer,
};
pub use generators::{transaction_from_params, TransactionParams};
pub use vectors::{all_vectors, vectors_json, verify_all_vectors, DeterminismVector};
