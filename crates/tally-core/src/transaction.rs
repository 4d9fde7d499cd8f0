//! Transaction: the atomic unit of the shared ledger.
//!
//! A transaction consumes prior entry versions, produces new ones, and is
//! endorsed by every listed participant. Once endorsed it is immutable;
//! corrections are new transactions.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::canonical::{canonical_bytes, signed_message};
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::entry::EntryId;
use crate::error::CoreError;
use crate::types::{PeerId, TxId};

/// The current transaction schema version.
pub const TX_VERSION: u8 = 0;

/// Maximum number of participants in a transaction.
pub const MAX_PARTICIPANTS: usize = 16;

/// Maximum number of consumed entry references.
pub const MAX_INPUTS: usize = 64;

/// Maximum number of produced entries.
pub const MAX_OUTPUTS: usize = 64;

/// A reference to a consumed entry version: the entry and the transaction
/// whose output is being consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRef {
    /// The entry being consumed.
    pub entry_id: EntryId,
    /// The transaction that produced the consumed version.
    pub produced_by: TxId,
}

/// The header of a transaction, containing all signed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHeader {
    /// Schema version (currently 0).
    pub version: u8,

    /// Every peer party to this transaction, in endorsement order.
    /// The first participant is the originator.
    pub participants: Vec<PeerId>,

    /// Originator-claimed timestamp (Unix milliseconds). Untrusted.
    pub timestamp: i64,

    /// Entry versions consumed by this transaction.
    pub inputs: Vec<EntryRef>,

    /// Entries produced (created or re-versioned) by this transaction.
    pub outputs: Vec<EntryId>,

    /// Blake3 hash of the memo bytes.
    pub memo_hash: Blake3Hash,
}

/// One participant's signature over the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    /// The endorsing key. Must match a listed participant.
    pub signer: Ed25519PublicKey,
    /// Ed25519 signature over (canonical_header || memo).
    pub signature: Ed25519Signature,
}

/// A complete transaction: header + memo + one endorsement per participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction header.
    pub header: TxHeader,

    /// Opaque memo payload (may be empty, may be encrypted).
    pub memo: Bytes,

    /// Endorsements, in participant order.
    pub endorsements: Vec<Endorsement>,
}

impl Transaction {
    /// Compute the transaction ID (Blake3 hash of canonical bytes).
    pub fn compute_id(&self) -> TxId {
        let bytes = canonical_bytes(self);
        TxId(Blake3Hash::hash(&bytes).0)
    }

    /// The participants, in endorsement order.
    pub fn participants(&self) -> &[PeerId] {
        &self.header.participants
    }

    /// The originating participant, if any are listed.
    pub fn originator(&self) -> Option<&PeerId> {
        self.header.participants.first()
    }

    /// Whether the given peer is party to this transaction.
    pub fn involves(&self, peer: &PeerId) -> bool {
        self.header.participants.contains(peer)
    }

    /// Transactions whose outputs this transaction consumes.
    pub fn dependencies(&self) -> BTreeSet<TxId> {
        self.header
            .inputs
            .iter()
            .map(|input| input.produced_by)
            .collect()
    }

    /// Whether this transaction consumes nothing (creates entries from scratch).
    pub fn is_genesis(&self) -> bool {
        self.header.inputs.is_empty()
    }

    /// The consumed reference for an entry, if this transaction consumes it.
    pub fn consumed_ref(&self, entry_id: &EntryId) -> Option<&EntryRef> {
        self.header
            .inputs
            .iter()
            .find(|input| input.entry_id == *entry_id)
    }

    /// Whether this transaction produces the given entry.
    pub fn produces(&self, entry_id: &EntryId) -> bool {
        self.header.outputs.contains(entry_id)
    }
}

/// Builder for the unsigned part of a transaction.
///
/// `seal()` fixes the header, after which each participant endorses:
///
/// ```rust
/// use tally_core::{Keypair, EntryId, TransactionBuilder};
///
/// let alice = Keypair::generate();
/// let bob = Keypair::generate();
/// let entry = EntryId::derive(&alice.peer_id(), "invoice-7");
///
/// let mut pending = TransactionBuilder::new()
///     .participant(alice.peer_id())
///     .participant(bob.peer_id())
///     .timestamp(1_736_870_400_000)
///     .produce(entry)
///     .memo(b"net 30".to_vec())
///     .seal();
/// pending.endorse(&alice);
/// pending.endorse(&bob);
/// let tx = pending.finish().unwrap();
/// assert_eq!(tx.endorsements.len(), 2);
/// ```
pub struct TransactionBuilder {
    participants: Vec<PeerId>,
    timestamp: i64,
    inputs: Vec<EntryRef>,
    outputs: Vec<EntryId>,
    memo: Bytes,
}

impl TransactionBuilder {
    /// Start building a transaction.
    pub fn new() -> Self {
        Self {
            participants: Vec::new(),
            timestamp: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            memo: Bytes::new(),
        }
    }

    /// Add a participant. The first added is the originator.
    pub fn participant(mut self, peer: PeerId) -> Self {
        self.participants.push(peer);
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Consume an entry version.
    pub fn consume(mut self, entry_id: EntryId, produced_by: TxId) -> Self {
        self.inputs.push(EntryRef {
            entry_id,
            produced_by,
        });
        self
    }

    /// Produce an entry (create it, or advance its version).
    pub fn produce(mut self, entry_id: EntryId) -> Self {
        self.outputs.push(entry_id);
        self
    }

    /// Set the memo payload.
    pub fn memo(mut self, memo: impl Into<Bytes>) -> Self {
        self.memo = memo.into();
        self
    }

    /// Fix the header and open the transaction for endorsement.
    pub fn seal(self) -> PendingTransaction {
        let memo_hash = Blake3Hash::hash(&self.memo);

        let header = TxHeader {
            version: TX_VERSION,
            participants: self.participants,
            timestamp: self.timestamp,
            inputs: self.inputs,
            outputs: self.outputs,
            memo_hash,
        };

        let message = signed_message(&header, &self.memo);

        PendingTransaction {
            header,
            memo: self.memo,
            message,
            endorsements: Vec::new(),
        }
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A sealed transaction collecting endorsements.
pub struct PendingTransaction {
    header: TxHeader,
    memo: Bytes,
    message: Vec<u8>,
    endorsements: Vec<Endorsement>,
}

impl PendingTransaction {
    /// Endorse with the given keypair.
    pub fn endorse(&mut self, keypair: &Keypair) {
        let signature = keypair.sign(&self.message);
        self.endorsements.push(Endorsement {
            signer: keypair.public_key(),
            signature,
        });
    }

    /// Complete the transaction.
    ///
    /// Every listed participant must have endorsed; endorsements are
    /// re-ordered to participant order so the canonical bytes do not
    /// depend on signing order.
    pub fn finish(self) -> Result<Transaction, CoreError> {
        let mut ordered = Vec::with_capacity(self.header.participants.len());

        for participant in &self.header.participants {
            let endorsement = self
                .endorsements
                .iter()
                .find(|e| e.signer.peer_id() == *participant)
                .ok_or_else(|| CoreError::MissingEndorsement(participant.to_hex()))?;
            ordered.push(*endorsement);
        }

        Ok(Transaction {
            header: self.header,
            memo: self.memo,
            endorsements: ordered,
        })
    }
}
