//! # Tally
//!
//! The unified API for the tally system - multi-party transactional
//! ledgers that detect divergence and recover lost data from one another.
//!
//! ## Overview
//!
//! Every peer runs its own [`Ledger`]: an identity keypair plus a local
//! store. Peers that transact together each keep their own copy of the
//! shared transactions. When a peer's store silently loses data, the sync
//! protocol detects the divergence against each counterparty and recovery
//! re-admits the missing transactions, dependency order respected.
//!
//! ## Key Concepts
//!
//! - **Transaction**: immutable once endorsed. Never edited; corrections
//!   are new transactions.
//! - **Entry**: a versioned record. Each producing transaction advances its
//!   version; the record keeps the whole producer history.
//! - **Findings**: the per-counterparty diff of shared transaction ids.
//! - **Admission**: validating and persisting a transaction that did not
//!   originate locally.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tally::{Ledger, LedgerConfig};
//! use tally::core::Keypair;
//! use tally::store::SqliteStore;
//! use tally::sync::MemoryNetwork;
//!
//! async fn example() {
//!     let keypair = Keypair::generate();
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!     let ledger = Ledger::new(keypair, store, LedgerConfig::default());
//!
//!     // Answer counterparty requests.
//!     let network = MemoryNetwork::new();
//!     let transport = network
//!         .attach(ledger.peer_id(), Arc::new(ledger.service()))
//!         .await;
//!
//!     // Detect divergence, then make the store whole again.
//!     let transport = Arc::new(transport);
//!     let outcome = ledger.sync(Arc::clone(&transport), None).await.unwrap();
//!     if !outcome.all_settled() {
//!         let report = ledger.sync_and_recover(transport, None).await.unwrap();
//!         println!("recovered {} transactions", report.admitted_count());
//!     }
//! }
//! ```

pub mod error;
pub mod ledger;

pub use error::{LedgerError, Result};
pub use ledger::{Ledger, LedgerConfig};

/// Re-export of the core primitives crate.
pub use tally_core as core;
/// Re-export of the storage crate.
pub use tally_store as store;
/// Re-export of the sync protocol crate.
pub use tally_sync as sync;
