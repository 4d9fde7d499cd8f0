//! SQLite implementation of the LedgerStore trait.
//!
//! This is the primary storage backend for the tally ledger. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.
//! Admission runs inside a single SQL transaction, so the atomicity and
//! at-most-once requirements hold across processes sharing the database.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use tally_core::{
    validate_transaction, Blake3Hash, EntryId, EntryRecord, PeerId, Transaction, TxHeader, TxId,
};

use crate::admission::{apply_entry_action, plan_entry_action};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AdmitOutcome, LedgerStore, LossFault};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("connection mutex poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(format!("blocking task failed: {e}")))?
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn blob32(bytes: Vec<u8>, what: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| StoreError::Serialization(format!("{what}: expected 32 bytes")))
}

/// Reassemble a transaction from its stored columns.
fn tx_from_parts(
    version: i64,
    timestamp: i64,
    participants: Vec<u8>,
    inputs: Vec<u8>,
    outputs: Vec<u8>,
    memo_hash: Vec<u8>,
    memo: Vec<u8>,
    endorsements: Vec<u8>,
) -> Result<Transaction> {
    let header = TxHeader {
        version: version as u8,
        participants: decode_cbor(&participants)?,
        timestamp,
        inputs: decode_cbor(&inputs)?,
        outputs: decode_cbor(&outputs)?,
        memo_hash: Blake3Hash::from_bytes(blob32(memo_hash, "memo_hash")?),
    };

    Ok(Transaction {
        header,
        memo: memo.into(),
        endorsements: decode_cbor(&endorsements)?,
    })
}

fn load_transaction(conn: &Connection, id: &TxId) -> Result<Option<Transaction>> {
    type Row = (i64, i64, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>);
    let row: Option<Row> = conn
        .query_row(
            "SELECT version, timestamp, participants, inputs, outputs,
                    memo_hash, memo, endorsements
             FROM transactions WHERE tx_id = ?1",
            params![id.0.as_slice()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((version, timestamp, participants, inputs, outputs, memo_hash, memo, endorsements)) => {
            Ok(Some(tx_from_parts(
                version,
                timestamp,
                participants,
                inputs,
                outputs,
                memo_hash,
                memo,
                endorsements,
            )?))
        }
        None => Ok(None),
    }
}

fn load_entry(conn: &Connection, entry_id: &EntryId) -> Result<Option<EntryRecord>> {
    let row: Option<(Vec<u8>, Vec<u8>, i64, i64)> = conn
        .query_row(
            "SELECT head_tx_id, history, created_at, updated_at
             FROM entries WHERE entry_id = ?1",
            params![entry_id.0.as_slice()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    match row {
        Some((head, history, created_at, updated_at)) => Ok(Some(EntryRecord {
            entry_id: *entry_id,
            head: TxId::from_bytes(blob32(head, "head_tx_id")?),
            history: decode_cbor(&history)?,
            created_at,
            updated_at,
        })),
        None => Ok(None),
    }
}

fn save_entry(conn: &Connection, record: &EntryRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO entries (entry_id, head_tx_id, history, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(entry_id) DO UPDATE SET
            head_tx_id = excluded.head_tx_id,
            history = excluded.history,
            updated_at = excluded.updated_at",
        params![
            record.entry_id.0.as_slice(),
            record.head.0.as_slice(),
            encode_cbor(&record.history)?,
            record.created_at,
            record.updated_at,
        ],
    )?;
    Ok(())
}

fn transaction_exists(conn: &Connection, id: &TxId) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM transactions WHERE tx_id = ?1)",
        params![id.0.as_slice()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn admit(&self, tx: &Transaction, canonical: &[u8]) -> Result<AdmitOutcome> {
        let tx = tx.clone();
        let canonical = canonical.to_vec();

        self.blocking(move |conn| {
            let tx_id = tx.compute_id();
            let db = conn.transaction()?;

            if transaction_exists(&db, &tx_id)? {
                return Ok(AdmitOutcome::AlreadyPresent);
            }

            validate_transaction(&tx)?;

            // Inputs must consume versions whose producers are present.
            for input in &tx.header.inputs {
                if !transaction_exists(&db, &input.produced_by)? {
                    return Err(StoreError::UnresolvedInput {
                        entry: input.entry_id,
                        producer: input.produced_by,
                    });
                }
            }

            // Plan every entry change before writing anything.
            let mut actions = Vec::with_capacity(tx.header.outputs.len());
            {
                let mut lookup = |id: &TxId| load_transaction(&db, id);
                for output in &tx.header.outputs {
                    let record = load_entry(&db, output)?;
                    let action =
                        plan_entry_action(&tx, &tx_id, output, record.as_ref(), &mut lookup)?;
                    actions.push((*output, record, action));
                }
            }

            let now = now_millis();
            db.execute(
                "INSERT INTO transactions (
                    tx_id, version, timestamp, participants, inputs, outputs,
                    memo_hash, memo, endorsements, canonical_bytes, admitted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    tx_id.0.as_slice(),
                    tx.header.version as i64,
                    tx.header.timestamp,
                    encode_cbor(&tx.header.participants)?,
                    encode_cbor(&tx.header.inputs)?,
                    encode_cbor(&tx.header.outputs)?,
                    tx.header.memo_hash.0.as_slice(),
                    tx.memo.as_ref(),
                    encode_cbor(&tx.endorsements)?,
                    canonical.as_slice(),
                    now,
                ],
            )?;

            for (entry_id, record, action) in actions {
                let updated = apply_entry_action(action, &entry_id, &tx_id, record, now);
                save_entry(&db, &updated)?;
            }

            for participant in tx.participants() {
                db.execute(
                    "INSERT OR IGNORE INTO tx_participants (peer_id, tx_id) VALUES (?1, ?2)",
                    params![participant.0.as_slice(), tx_id.0.as_slice()],
                )?;
            }

            db.commit()?;
            Ok(AdmitOutcome::Admitted)
        })
        .await
    }

    async fn get_transaction(&self, id: &TxId) -> Result<Option<Transaction>> {
        let id = *id;
        self.blocking(move |conn| load_transaction(conn, &id)).await
    }

    async fn has_transaction(&self, id: &TxId) -> Result<bool> {
        let id = *id;
        self.blocking(move |conn| transaction_exists(conn, &id))
            .await
    }

    async fn get_canonical_bytes(&self, id: &TxId) -> Result<Option<Vec<u8>>> {
        let id = *id;
        self.blocking(move |conn| {
            conn.query_row(
                "SELECT canonical_bytes FROM transactions WHERE tx_id = ?1",
                params![id.0.as_slice()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn ids_involving(&self, peer: &PeerId) -> Result<BTreeSet<TxId>> {
        let peer = *peer;
        self.blocking(move |conn| {
            let mut stmt =
                conn.prepare("SELECT tx_id FROM tx_participants WHERE peer_id = ?1")?;
            let rows = stmt.query_map(params![peer.0.as_slice()], |row| {
                row.get::<_, Vec<u8>>(0)
            })?;

            let mut ids = BTreeSet::new();
            for row in rows {
                ids.insert(TxId::from_bytes(blob32(row?, "tx_id")?));
            }
            Ok(ids)
        })
        .await
    }

    async fn known_peers(&self) -> Result<BTreeSet<PeerId>> {
        self.blocking(move |conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT peer_id FROM tx_participants")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

            let mut peers = BTreeSet::new();
            for row in rows {
                peers.insert(PeerId::from_bytes(blob32(row?, "peer_id")?));
            }
            Ok(peers)
        })
        .await
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<Option<EntryRecord>> {
        let entry_id = *entry_id;
        self.blocking(move |conn| load_entry(conn, &entry_id)).await
    }

    async fn transaction_count(&self) -> Result<u64> {
        self.blocking(move |conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

#[async_trait]
impl LossFault for SqliteStore {
    async fn lose_transactions(&self, ids: &[TxId]) -> Result<usize> {
        let ids = ids.to_vec();

        self.blocking(move |conn| {
            let db = conn.transaction()?;
            let now = now_millis();
            let mut removed = 0;

            for id in &ids {
                let Some(tx) = load_transaction(&db, id)? else {
                    continue;
                };
                removed += 1;

                db.execute(
                    "DELETE FROM transactions WHERE tx_id = ?1",
                    params![id.0.as_slice()],
                )?;
                db.execute(
                    "DELETE FROM tx_participants WHERE tx_id = ?1",
                    params![id.0.as_slice()],
                )?;

                for output in &tx.header.outputs {
                    let Some(mut record) = load_entry(&db, output)? else {
                        continue;
                    };
                    if record.head == *id {
                        if record.revert_head(now).is_none() {
                            db.execute(
                                "DELETE FROM entries WHERE entry_id = ?1",
                                params![output.0.as_slice()],
                            )?;
                            continue;
                        }
                    } else {
                        record.history.retain(|h| h != id);
                        record.updated_at = now;
                    }
                    save_entry(&db, &record)?;
                }
            }

            db.commit()?;
            tracing::debug!(requested = ids.len(), removed, "simulated data loss");
            Ok(removed)
        })
        .await
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
