//! Ledger entries: versioned records tracked across their history.
//!
//! An entry is identified by a linear 32-byte id. Each transaction that
//! produces the entry advances its version; the record keeps the head
//! producer and every historical producer in order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{PeerId, TxId};

/// A 32-byte ledger entry identifier.
///
/// Derived from Blake3(owner || entry_name), so the same owner and name
/// always map to the same entry on every peer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub [u8; 32]);

impl EntryId {
    /// Derive an entry ID from its owner and name.
    pub fn derive(owner: &PeerId, entry_name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"tally-entry-v0:");
        hasher.update(&owner.0);
        hasher.update(b":");
        hasher.update(entry_name.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for EntryId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for EntryId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The store-side record of one ledger entry.
///
/// `head` is the transaction that produced the current version. `history`
/// holds every prior producer, oldest first, so the version number is
/// implicit in the history length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// The entry identifier.
    pub entry_id: EntryId,

    /// Transaction that produced the current version.
    pub head: TxId,

    /// Prior producing transactions, oldest first.
    pub history: Vec<TxId>,

    /// When this record was created (local Unix ms).
    pub created_at: i64,

    /// When this record was last updated (local Unix ms).
    pub updated_at: i64,
}

impl EntryRecord {
    /// Create a record for a freshly produced entry.
    pub fn new(entry_id: EntryId, head: TxId, now: i64) -> Self {
        Self {
            entry_id,
            head,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Current version number (1-indexed).
    pub fn version(&self) -> u64 {
        self.history.len() as u64 + 1
    }

    /// Advance to a new head, pushing the current head into history.
    pub fn advance(&mut self, head: TxId, now: i64) {
        self.history.push(self.head);
        self.head = head;
        self.updated_at = now;
    }

    /// Roll the head back to its predecessor.
    ///
    /// Returns the restored head, or None when there is no predecessor
    /// (the caller then drops the record entirely).
    pub fn revert_head(&mut self, now: i64) -> Option<TxId> {
        let prev = self.history.pop()?;
        self.head = prev;
        self.updated_at = now;
        Some(prev)
    }

    /// Whether the given transaction produced any version of this entry.
    pub fn produced_by(&self, tx: &TxId) -> bool {
        self.head == *tx || self.history.contains(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_id_derivation() {
        let owner = PeerId::from_bytes([0x11; 32]);
        let id1 = EntryId::derive(&owner, "invoice-7");
        let id2 = EntryId::derive(&owner, "invoice-7");
        assert_eq!(id1, id2);

        let id3 = EntryId::derive(&owner, "invoice-8");
        assert_ne!(id1, id3);
    }

    #[test]
    fn test_entry_id_different_owners() {
        let a = PeerId::from_bytes([0x01; 32]);
        let b = PeerId::from_bytes([0x02; 32]);
        assert_ne!(
            EntryId::derive(&a, "shared-name"),
            EntryId::derive(&b, "shared-name")
        );
    }

    #[test]
    fn test_record_advance_and_version() {
        let entry_id = EntryId::from_bytes([0xaa; 32]);
        let t1 = TxId::from_bytes([0x01; 32]);
        let t2 = TxId::from_bytes([0x02; 32]);
        let t3 = TxId::from_bytes([0x03; 32]);

        let mut record = EntryRecord::new(entry_id, t1, 1000);
        assert_eq!(record.version(), 1);
        assert_eq!(record.head, t1);

        record.advance(t2, 1001);
        assert_eq!(record.version(), 2);
        assert_eq!(record.head, t2);
        assert_eq!(record.history, vec![t1]);

        record.advance(t3, 1002);
        assert_eq!(record.version(), 3);
        assert!(record.produced_by(&t1));
        assert!(record.produced_by(&t3));
    }

    #[test]
    fn test_record_revert_head() {
        let entry_id = EntryId::from_bytes([0xaa; 32]);
        let t1 = TxId::from_bytes([0x01; 32]);
        let t2 = TxId::from_bytes([0x02; 32]);

        let mut record = EntryRecord::new(entry_id, t1, 1000);
        record.advance(t2, 1001);

        assert_eq!(record.revert_head(1002), Some(t1));
        assert_eq!(record.head, t1);
        assert_eq!(record.version(), 1);

        // No predecessor left
        assert_eq!(record.revert_head(1003), None);
    }
}
