//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tally_core::{EntryId, Keypair, PeerId, Transaction, TransactionBuilder, TxId};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random TxId.
pub fn tx_id() -> impl Strategy<Value = TxId> {
    any::<[u8; 32]>().prop_map(TxId::from_bytes)
}

/// Generate a random PeerId.
pub fn peer_id() -> impl Strategy<Value = PeerId> {
    keypair().prop_map(|kp| kp.peer_id())
}

/// Generate a random EntryId.
pub fn entry_id() -> impl Strategy<Value = EntryId> {
    any::<[u8; 32]>().prop_map(EntryId::from_bytes)
}

/// Generate a reasonable timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=i64::MAX / 2
}

/// Generate memo bytes of specified max length.
pub fn memo(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate an entry name.
pub fn entry_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,31}".prop_map(String::from)
}

/// Parameters for generating a genesis transaction.
#[derive(Debug, Clone)]
pub struct TransactionParams {
    pub originator_seed: [u8; 32],
    pub counterparty_seed: Option<[u8; 32]>,
    pub entry_name: String,
    pub timestamp: i64,
    pub memo: Vec<u8>,
}

impl Arbitrary for TransactionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            any::<Option<[u8; 32]>>(),
            entry_name(),
            0i64..=1_900_000_000_000i64,
            memo(512),
        )
            .prop_filter(
                "distinct participants",
                |(originator, counterparty, _, _, _)| Some(originator) != counterparty.as_ref(),
            )
            .prop_map(
                |(originator_seed, counterparty_seed, entry_name, timestamp, memo)| {
                    TransactionParams {
                        originator_seed,
                        counterparty_seed,
                        entry_name,
                        timestamp,
                        memo,
                    }
                },
            )
            .boxed()
    }
}

/// Build a fully endorsed genesis transaction from parameters.
pub fn transaction_from_params(params: &TransactionParams) -> Transaction {
    let originator = Keypair::from_seed(&params.originator_seed);
    let entry = EntryId::derive(&originator.peer_id(), &params.entry_name);

    let mut builder = TransactionBuilder::new()
        .participant(originator.peer_id())
        .timestamp(params.timestamp)
        .produce(entry)
        .memo(params.memo.clone());

    let counterparty = params
        .counterparty_seed
        .as_ref()
        .map(Keypair::from_seed);
    if let Some(counterparty) = &counterparty {
        builder = builder.participant(counterparty.peer_id());
    }

    let mut pending = builder.seal();
    pending.endorse(&originator);
    if let Some(counterparty) = &counterparty {
        pending.endorse(counterparty);
    }
    pending.finish().expect("every participant endorsed")
}
