//! # Tally Core
//!
//! Pure primitives for the tally ledger: transactions, entries, and
//! canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Transaction`] - An immutable multi-party ledger record
//! - [`TxId`] - Content-addressed transaction identifier (Blake3 hash)
//! - [`EntryId`] / [`EntryRecord`] - A versioned ledger entry and its history
//! - [`PeerId`] - Stable network identity of a participant
//!
//! ## Canonicalization
//!
//! All transactions are encoded using deterministic CBOR, so the same
//! transaction has the same [`TxId`] on every peer. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod transaction;
pub mod types;
pub mod validation;

pub use canonical::{canonical_bytes, canonical_header_bytes, signed_message};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use entry::{EntryId, EntryRecord};
pub use error::{CoreError, ValidationError};
pub use transaction::{
    Endorsement, EntryRef, PendingTransaction, Transaction, TransactionBuilder, TxHeader,
    MAX_INPUTS, MAX_OUTPUTS, MAX_PARTICIPANTS, TX_VERSION,
};
pub use types::{PeerId, TxId};
pub use validation::{validate_transaction, validate_transaction_structure};
