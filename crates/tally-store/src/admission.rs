//! Entry-state planning for transaction admission.
//!
//! Admission must decide, per produced entry, how the entry record changes.
//! The interesting case is re-admitting a transaction that was lost while
//! later versions of its entries survived: the recovered transaction belongs
//! in the *middle* of the chain, so its id is spliced back into the history
//! at the position its surviving consumer still references.

use tally_core::{EntryId, EntryRecord, Transaction, TxId};

use crate::error::{Result, StoreError};

/// How admission changes one entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryAction {
    /// No record exists; create one with the admitted transaction as head.
    Create,
    /// The admitted transaction consumes the current head; advance it.
    Advance,
    /// The admitted transaction is a historical producer; insert its id into
    /// the history at this position.
    Splice(usize),
}

/// Plan the record change for one produced entry.
///
/// `lookup_tx` resolves a stored transaction by id; it is only consulted to
/// confirm that the surviving successor in the chain really consumed the
/// transaction being admitted.
pub(crate) fn plan_entry_action(
    tx: &Transaction,
    tx_id: &TxId,
    entry_id: &EntryId,
    record: Option<&EntryRecord>,
    lookup_tx: &mut dyn FnMut(&TxId) -> Result<Option<Transaction>>,
) -> Result<EntryAction> {
    let consumed = tx.consumed_ref(entry_id);

    let Some(record) = record else {
        // No record: creation is fine, but a consuming transaction needs the
        // producer's effects visible first.
        return match consumed {
            Some(input) => Err(StoreError::UnresolvedInput {
                entry: *entry_id,
                producer: input.produced_by,
            }),
            None => Ok(EntryAction::Create),
        };
    };

    match consumed {
        Some(input) if record.head == input.produced_by => Ok(EntryAction::Advance),
        Some(input) => {
            // The consumed version is not the head. If it sits in the
            // history and the version after it consumed *this* transaction,
            // this is a lost link being restored.
            let Some(pos) = record.history.iter().position(|h| *h == input.produced_by) else {
                return Err(StoreError::StaleInput {
                    entry: *entry_id,
                    head: record.head,
                    consumed: input.produced_by,
                });
            };
            let successor = record.history.get(pos + 1).copied().unwrap_or(record.head);
            if successor_consumes(&successor, entry_id, tx_id, lookup_tx)? {
                Ok(EntryAction::Splice(pos + 1))
            } else {
                Err(StoreError::StaleInput {
                    entry: *entry_id,
                    head: record.head,
                    consumed: input.produced_by,
                })
            }
        }
        None => {
            // Producing an existing entry without consuming it is only legal
            // when the oldest surviving producer consumed this transaction -
            // a lost genesis being restored.
            let oldest = record.history.first().copied().unwrap_or(record.head);
            if successor_consumes(&oldest, entry_id, tx_id, lookup_tx)? {
                Ok(EntryAction::Splice(0))
            } else {
                Err(StoreError::OutputConflict {
                    entry: *entry_id,
                    head: record.head,
                })
            }
        }
    }
}

fn successor_consumes(
    successor: &TxId,
    entry_id: &EntryId,
    admitted: &TxId,
    lookup_tx: &mut dyn FnMut(&TxId) -> Result<Option<Transaction>>,
) -> Result<bool> {
    let Some(successor_tx) = lookup_tx(successor)? else {
        return Ok(false);
    };
    Ok(successor_tx
        .consumed_ref(entry_id)
        .is_some_and(|input| input.produced_by == *admitted))
}

/// Apply a planned action to the record map value.
pub(crate) fn apply_entry_action(
    action: EntryAction,
    entry_id: &EntryId,
    tx_id: &TxId,
    record: Option<EntryRecord>,
    now: i64,
) -> EntryRecord {
    match (action, record) {
        (EntryAction::Create, _) => EntryRecord::new(*entry_id, *tx_id, now),
        (EntryAction::Advance, Some(mut record)) => {
            record.advance(*tx_id, now);
            record
        }
        (EntryAction::Splice(pos), Some(mut record)) => {
            record.history.insert(pos, *tx_id);
            record.updated_at = now;
            record
        }
        // Advance/Splice are only planned against an existing record.
        (_, None) => EntryRecord::new(*entry_id, *tx_id, now),
    }
}
