//! Transaction validation: endorsement verification and structural checks.

use std::collections::BTreeSet;

use crate::canonical::signed_message;
use crate::crypto::Blake3Hash;
use crate::error::ValidationError;
use crate::transaction::{Transaction, MAX_INPUTS, MAX_OUTPUTS, MAX_PARTICIPANTS, TX_VERSION};

/// Validate a transaction in full (without checking store context).
///
/// This performs:
/// - Version check
/// - Memo hash verification
/// - Structural rules (participant, input, output well-formedness)
/// - One endorsement per participant, signature verified
pub fn validate_transaction(tx: &Transaction) -> Result<(), ValidationError> {
    validate_transaction_structure(tx)?;

    // Verify every endorsement over the shared message
    let message = signed_message(&tx.header, &tx.memo);
    for (index, endorsement) in tx.endorsements.iter().enumerate() {
        let expected = tx.header.participants[index];
        endorsement
            .signer
            .verify(&message, &endorsement.signature)
            .map_err(|_| ValidationError::SignatureFailed(expected))?;
    }

    Ok(())
}

/// Validate transaction structure without signature verification.
///
/// Useful when the transaction is known to be valid (e.g., re-read from
/// trusted storage) and only the shape needs checking.
pub fn validate_transaction_structure(tx: &Transaction) -> Result<(), ValidationError> {
    // 1. Version
    if tx.header.version != TX_VERSION {
        return Err(ValidationError::UnsupportedVersion(tx.header.version));
    }

    // 2. Memo hash
    let computed_hash = Blake3Hash::hash(&tx.memo);
    if computed_hash != tx.header.memo_hash {
        return Err(ValidationError::MemoHashMismatch);
    }

    // 3. Participants: non-empty, bounded, distinct
    if tx.header.participants.is_empty() {
        return Err(ValidationError::NoParticipants);
    }
    if tx.header.participants.len() > MAX_PARTICIPANTS {
        return Err(ValidationError::TooManyParticipants {
            max: MAX_PARTICIPANTS,
            got: tx.header.participants.len(),
        });
    }
    let mut seen_participants = BTreeSet::new();
    for participant in &tx.header.participants {
        if !seen_participants.insert(*participant) {
            return Err(ValidationError::DuplicateParticipant(*participant));
        }
    }

    // 4. Inputs: bounded, each entry consumed at most once
    if tx.header.inputs.len() > MAX_INPUTS {
        return Err(ValidationError::TooManyInputs {
            max: MAX_INPUTS,
            got: tx.header.inputs.len(),
        });
    }
    let mut seen_inputs = BTreeSet::new();
    for input in &tx.header.inputs {
        if !seen_inputs.insert(input.entry_id) {
            return Err(ValidationError::DuplicateInput(input.entry_id));
        }
    }

    // 5. Outputs: bounded, distinct
    if tx.header.outputs.len() > MAX_OUTPUTS {
        return Err(ValidationError::TooManyOutputs {
            max: MAX_OUTPUTS,
            got: tx.header.outputs.len(),
        });
    }
    let mut seen_outputs = BTreeSet::new();
    for output in &tx.header.outputs {
        if !seen_outputs.insert(*output) {
            return Err(ValidationError::DuplicateOutput(*output));
        }
    }

    // 6. A transaction must touch the ledger
    if tx.header.inputs.is_empty() && tx.header.outputs.is_empty() {
        return Err(ValidationError::NoEffect);
    }

    // 7. Entries are linear version chains: a consumed entry must be
    // re-produced by the same transaction.
    for input in &tx.header.inputs {
        if !seen_outputs.contains(&input.entry_id) {
            return Err(ValidationError::ConsumedEntryNotReproduced(input.entry_id));
        }
    }

    // 8. One endorsement per participant, signer matching position
    if tx.endorsements.len() != tx.header.participants.len() {
        return Err(ValidationError::EndorsementCountMismatch {
            expected: tx.header.participants.len(),
            got: tx.endorsements.len(),
        });
    }
    for (index, endorsement) in tx.endorsements.iter().enumerate() {
        let expected = tx.header.participants[index];
        let signer = endorsement.signer.peer_id();
        if signer != expected {
            return Err(ValidationError::EndorsementSignerMismatch {
                index,
                signer,
                expected,
            });
        }
    }

    Ok(())
}
