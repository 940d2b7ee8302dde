// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use ethereum_types::{Address, H256, U256};
use rollup_relayer_types::{
    build_batch, Batch, BatchRecord, BatchStatus, BlockTrace, FeeParams,
    Layer, MessageStatus, ParentBatchRef, PendingTransaction, RelayedMessage,
    SentMessage, TxEntity,
};
use rollup_relayer_utils::Error;

use super::*;

fn blocks(from: u64, len: u64) -> Vec<BlockTrace> {
    (from..from + len)
        .map(|n| {
            BlockTrace::builder()
                .number(n)
                .hash(H256::from_low_u64_be(n))
                .parent_hash(H256::from_low_u64_be(n - 1))
                .state_root(H256::from_low_u64_be(100 + n))
                .build()
        })
        .collect()
}

fn batch_on(parent: &ParentBatchRef, from: u64, len: u64) -> Batch {
    build_batch(parent, blocks(from, len)).unwrap()
}

fn message(index: u64, payload: u8) -> RelayedMessage {
    message_from(Layer::L1, index, payload)
}

fn message_from(source: Layer, index: u64, payload: u8) -> RelayedMessage {
    RelayedMessage::new(
        source,
        SentMessage {
            sender: Address::repeat_byte(1),
            target: Address::repeat_byte(2),
            value: U256::zero(),
            message_index: index,
            payload: vec![payload].into(),
            block_number: 10,
        },
    )
}

fn pending_tx(hash: u64, nonce: u64, entity: TxEntity) -> PendingTransaction {
    PendingTransaction {
        tx_hash: H256::from_low_u64_be(hash),
        layer: Layer::L1,
        nonce,
        submitted_at: 0,
        fee: FeeParams::default(),
        entity,
        attempts: 0,
        replaced: vec![],
        to: Address::zero(),
        data: Default::default(),
        gas_limit: 21_000,
        observed_block: None,
    }
}

fn history_roundtrip<S: HistoryStore>(store: S) {
    let key = HistoryStoreKey::BlockTraces { layer: Layer::L2 };
    assert_eq!(store.get_last_block_number_or_default(key).unwrap(), 0);
    store.set_last_block_number(key, 20).unwrap();
    assert_eq!(store.set_last_block_number(key, 25).unwrap(), 20);
    assert_eq!(store.get_last_block_number(key, 1).unwrap(), 25);
    let other = HistoryStoreKey::Messages { layer: Layer::L2 };
    assert_eq!(store.get_last_block_number(other, 7).unwrap(), 7);
    store.set_target_block_number(key, 99).unwrap();
    assert_eq!(store.get_target_block_number(key, 0).unwrap(), 99);
}

fn batches_are_contiguous_and_consume_traces<S: BatchStore>(store: S) {
    store.insert_block_traces(&blocks(1, 5)).unwrap();
    assert_eq!(store.unbatched_block_traces(10).unwrap().len(), 5);

    let genesis = ParentBatchRef::genesis(0, H256::zero());
    let batch0 = batch_on(&genesis, 1, 3);
    store.insert_batch(BatchRecord::new(batch0.clone())).unwrap();
    let left = store.unbatched_block_traces(10).unwrap();
    assert_eq!(
        left.iter().map(|t| t.trace.number).collect::<Vec<_>>(),
        vec![4, 5]
    );

    // index 2 would leave a gap after batch #0.
    let gap = build_batch(
        &ParentBatchRef {
            index: 1,
            ..batch0.as_parent()
        },
        blocks(4, 2),
    )
    .unwrap();
    assert!(matches!(
        store.insert_batch(BatchRecord::new(gap)),
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(store.unbatched_block_traces(10).unwrap().len(), 2);

    let batch1 = batch_on(&batch0.as_parent(), 4, 2);
    store.insert_batch(BatchRecord::new(batch1)).unwrap();
    assert!(store.unbatched_block_traces(10).unwrap().is_empty());
    assert_eq!(store.latest_batch().unwrap().unwrap().index(), 1);
    assert_eq!(store.batches_with_status(BatchStatus::Pending).unwrap().len(), 2);
}

fn batch_updates_are_all_or_nothing<S: BatchStore>(store: S) {
    let genesis = ParentBatchRef::genesis(0, H256::zero());
    let batch0 = batch_on(&genesis, 1, 1);
    store.insert_batch(BatchRecord::new(batch0.clone())).unwrap();
    store
        .insert_batch(BatchRecord::new(batch_on(&batch0.as_parent(), 2, 1)))
        .unwrap();

    let updated = store
        .update_batch(0, |r| {
            r.commit_tx = Some(H256::repeat_byte(1));
            r.transition(BatchStatus::Committing)
        })
        .unwrap();
    assert_eq!(updated.status, BatchStatus::Committing);

    let res = store.update_batch(0, |r| {
        r.last_error = Some("lost".into());
        r.transition(BatchStatus::Finalized)
    });
    assert!(matches!(res, Err(Error::InvalidTransition { .. })));
    let stored = store.get_batch(0).unwrap().unwrap();
    assert_eq!(stored.last_error, None);
    assert_eq!(stored.commit_tx, Some(H256::repeat_byte(1)));

    assert!(matches!(
        store.update_batch(9, |_| Ok(())),
        Err(Error::BatchNotFound(9))
    ));

    store.update_batch(0, |r| r.skip("bad")).unwrap();
    assert_eq!(store.first_unfinished_batch().unwrap().unwrap().index(), 1);
}

fn unbatched_traces_drop_from_a_block<S: BlockTraceStore>(store: S) {
    store.insert_block_traces(&blocks(1, 5)).unwrap();
    assert_eq!(store.drop_unbatched_block_traces(3).unwrap(), 3);
    assert_eq!(store.drop_unbatched_block_traces(10).unwrap(), 0);
    let left: Vec<_> = store
        .unbatched_block_traces(10)
        .unwrap()
        .iter()
        .map(|t| t.trace.number)
        .collect();
    assert_eq!(left, vec![1, 2]);
}

fn same_message_in_both_directions<S: MessageStore>(store: S) {
    let down = message_from(Layer::L1, 0, 9);
    let up = message_from(Layer::L2, 0, 9);
    assert!(store.insert_message(down.clone()).unwrap());
    assert!(store.insert_message(up.clone()).unwrap());
    for (source, hash) in [(Layer::L1, down.message_hash), (Layer::L2, up.message_hash)] {
        let pending = store
            .messages_with_status(source, MessageStatus::Pending)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].message_hash, hash);
    }
}

fn messages_unique_per_index<S: MessageStore>(store: S) {
    let msg = message(0, 1);
    assert!(store.insert_message(msg.clone()).unwrap());
    assert!(!store.insert_message(msg.clone()).unwrap());
    assert!(matches!(
        store.insert_message(message(0, 2)),
        Err(Error::DuplicateMessageIndex { index: 0, .. })
    ));
    assert!(store.insert_message(message(1, 2)).unwrap());

    store
        .update_message(msg.message_hash, |m| {
            m.tx_hash = Some(H256::repeat_byte(3));
            m.transition(MessageStatus::Submitted)
        })
        .unwrap();
    let pending = store
        .messages_with_status(Layer::L1, MessageStatus::Pending)
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message_index, 1);
    assert!(store
        .messages_with_status(Layer::L2, MessageStatus::Submitted)
        .unwrap()
        .is_empty());
}

fn pending_txs_replace_atomically<S: PendingTxStore>(store: S) {
    store
        .insert_pending_tx(pending_tx(2, 8, TxEntity::CommitBatch(1)))
        .unwrap();
    store
        .insert_pending_tx(pending_tx(1, 7, TxEntity::CommitBatch(0)))
        .unwrap();
    let nonces: Vec<_> = store
        .pending_txs(Layer::L1)
        .unwrap()
        .iter()
        .map(|tx| tx.nonce)
        .collect();
    assert_eq!(nonces, vec![7, 8]);
    assert!(store.pending_txs(Layer::L2).unwrap().is_empty());

    let mut replacement = pending_tx(3, 7, TxEntity::CommitBatch(0));
    replacement.replaced.push(H256::from_low_u64_be(1));
    replacement.attempts = 1;
    store
        .replace_pending_tx(Layer::L1, H256::from_low_u64_be(1), replacement)
        .unwrap();
    assert!(store
        .get_pending_tx(Layer::L1, H256::from_low_u64_be(1))
        .unwrap()
        .is_none());
    let found = store
        .pending_tx_for(Layer::L1, TxEntity::CommitBatch(0))
        .unwrap()
        .unwrap();
    assert_eq!(found.tx_hash, H256::from_low_u64_be(3));
    assert_eq!(found.attempts, 1);

    assert!(matches!(
        store.replace_pending_tx(
            Layer::L1,
            H256::from_low_u64_be(1),
            pending_tx(4, 7, TxEntity::CommitBatch(0))
        ),
        Err(Error::PendingTxNotFound(_))
    ));

    store
        .update_pending_tx(Layer::L1, H256::from_low_u64_be(3), |tx| {
            tx.observed_block = Some(12);
            Ok(())
        })
        .unwrap();
    let removed = store
        .remove_pending_tx(Layer::L1, H256::from_low_u64_be(3))
        .unwrap()
        .unwrap();
    assert_eq!(removed.observed_block, Some(12));
    assert_eq!(store.pending_txs(Layer::L1).unwrap().len(), 1);
}

#[test]
fn in_memory_store() {
    history_roundtrip(InMemoryStore::default());
    batches_are_contiguous_and_consume_traces(InMemoryStore::default());
    batch_updates_are_all_or_nothing(InMemoryStore::default());
    messages_unique_per_index(InMemoryStore::default());
    same_message_in_both_directions(InMemoryStore::default());
    unbatched_traces_drop_from_a_block(InMemoryStore::default());
    pending_txs_replace_atomically(InMemoryStore::default());
}

#[cfg(feature = "sled")]
#[test]
fn sled_store() {
    history_roundtrip(SledStore::temporary().unwrap());
    batches_are_contiguous_and_consume_traces(SledStore::temporary().unwrap());
    batch_updates_are_all_or_nothing(SledStore::temporary().unwrap());
    messages_unique_per_index(SledStore::temporary().unwrap());
    same_message_in_both_directions(SledStore::temporary().unwrap());
    unbatched_traces_drop_from_a_block(SledStore::temporary().unwrap());
    pending_txs_replace_atomically(SledStore::temporary().unwrap());
}

#[cfg(feature = "sled")]
#[test]
fn sled_store_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let store = SledStore::open(tmp.path()).unwrap();
        store.insert_message(message(5, 1)).unwrap();
        store
            .insert_pending_tx(pending_tx(1, 3, TxEntity::FinalizeBatch(2)))
            .unwrap();
    }
    let store = SledStore::open(tmp.path()).unwrap();
    assert_eq!(
        store
            .messages_with_status(Layer::L1, MessageStatus::Pending)
            .unwrap()
            .len(),
        1
    );
    assert!(store
        .pending_tx_for(Layer::L1, TxEntity::FinalizeBatch(2))
        .unwrap()
        .is_some());
}

#[cfg(feature = "sled")]
#[test]
fn temporary_sled_store_cleans_up_after_the_last_clone() {
    let store = SledStore::temporary().unwrap();
    let dir = store.tmp_dir.as_ref().unwrap().path().to_path_buf();
    let clone = store.clone();
    drop(store);
    assert!(dir.exists());
    drop(clone);
    assert!(!dir.exists());
}
