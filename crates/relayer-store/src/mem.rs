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

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use ethereum_types::H256;
use parking_lot::RwLock;
use rollup_relayer_types::{
    BatchRecord, BatchStatus, BlockTrace, Layer, MessageStatus,
    PendingTransaction, RelayedMessage,
};
use rollup_relayer_utils::{Error, Result};

use super::{
    BatchStore, BlockTraceStore, HistoryStore, HistoryStoreKey, MessageStore,
    PendingTxStore, StoredBlockTrace,
};

#[derive(Default)]
struct Messages {
    by_hash: HashMap<H256, RelayedMessage>,
    by_index: HashMap<(Layer, u64), H256>,
}

#[derive(Default)]
struct Batches {
    records: BTreeMap<u64, BatchRecord>,
    unbatched: BTreeMap<u64, StoredBlockTrace>,
}

/// InMemoryStore is a store that keeps everything in memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    last_block_numbers: Arc<RwLock<HashMap<HistoryStoreKey, u64>>>,
    target_block_numbers: Arc<RwLock<HashMap<HistoryStoreKey, u64>>>,
    batches: Arc<RwLock<Batches>>,
    messages: Arc<RwLock<Messages>>,
    pending_txs: Arc<RwLock<HashMap<(Layer, H256), PendingTransaction>>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore").finish()
    }
}

impl HistoryStore for InMemoryStore {
    #[tracing::instrument(skip(self))]
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        let guard = self.last_block_numbers.read();
        let val = guard
            .get(&key.into())
            .cloned()
            .unwrap_or(default_block_number);
        Ok(val)
    }

    #[tracing::instrument(skip(self))]
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        let mut guard = self.last_block_numbers.write();
        let val = guard.entry(key.into()).or_insert(block_number);
        let old = *val;
        *val = block_number;
        Ok(old)
    }

    #[tracing::instrument(skip(self))]
    fn get_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        let guard = self.target_block_numbers.read();
        let val = guard
            .get(&key.into())
            .cloned()
            .unwrap_or(default_block_number);
        Ok(val)
    }

    #[tracing::instrument(skip(self))]
    fn set_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        let mut guard = self.target_block_numbers.write();
        let val = guard.entry(key.into()).or_insert(block_number);
        let old = *val;
        *val = block_number;
        Ok(old)
    }
}

impl BlockTraceStore for InMemoryStore {
    #[tracing::instrument(skip_all, fields(count = traces.len()))]
    fn insert_block_traces(&self, traces: &[BlockTrace]) -> Result<()> {
        let received_at = rollup_relayer_types::unix_millis();
        let mut guard = self.batches.write();
        for trace in traces {
            guard.unbatched.insert(
                trace.number,
                StoredBlockTrace {
                    trace: trace.clone(),
                    received_at,
                },
            );
        }
        Ok(())
    }

    fn unbatched_block_traces(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredBlockTrace>> {
        let guard = self.batches.read();
        Ok(guard.unbatched.values().take(limit).cloned().collect())
    }

    fn drop_unbatched_block_traces(&self, from: u64) -> Result<usize> {
        let mut guard = self.batches.write();
        Ok(guard.unbatched.split_off(&from).len())
    }
}

impl BatchStore for InMemoryStore {
    #[tracing::instrument(skip_all, fields(index = record.index()))]
    fn insert_batch(&self, record: BatchRecord) -> Result<()> {
        let mut guard = self.batches.write();
        if let Some((tip, _)) = guard.records.last_key_value() {
            if record.index() != tip + 1 {
                return Err(Error::InvalidInput(format!(
                    "batch #{} does not follow the latest batch #{}",
                    record.index(),
                    tip
                )));
            }
        }
        for block in record.batch.blocks() {
            guard.unbatched.remove(&block.number);
        }
        guard.records.insert(record.index(), record);
        Ok(())
    }

    fn get_batch(&self, index: u64) -> Result<Option<BatchRecord>> {
        Ok(self.batches.read().records.get(&index).cloned())
    }

    fn latest_batch(&self) -> Result<Option<BatchRecord>> {
        Ok(self
            .batches
            .read()
            .records
            .last_key_value()
            .map(|(_, r)| r.clone()))
    }

    fn batches_with_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<BatchRecord>> {
        let guard = self.batches.read();
        Ok(guard
            .records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    fn first_unfinished_batch(&self) -> Result<Option<BatchRecord>> {
        let guard = self.batches.read();
        Ok(guard
            .records
            .values()
            .find(|r| !r.status.is_terminal())
            .cloned())
    }

    #[tracing::instrument(skip(self, f))]
    fn update_batch<F>(&self, index: u64, mut f: F) -> Result<BatchRecord>
    where
        F: FnMut(&mut BatchRecord) -> Result<()>,
    {
        let mut guard = self.batches.write();
        let stored = guard
            .records
            .get_mut(&index)
            .ok_or(Error::BatchNotFound(index))?;
        let mut record = stored.clone();
        f(&mut record)?;
        *stored = record.clone();
        Ok(record)
    }
}

impl MessageStore for InMemoryStore {
    #[tracing::instrument(skip_all, fields(hash = ?message.message_hash))]
    fn insert_message(&self, message: RelayedMessage) -> Result<bool> {
        let mut guard = self.messages.write();
        if guard.by_hash.contains_key(&message.message_hash) {
            return Ok(false);
        }
        let index_key = (message.source, message.message_index);
        if guard.by_index.contains_key(&index_key) {
            return Err(Error::DuplicateMessageIndex {
                source_layer: message.source.to_string(),
                index: message.message_index,
            });
        }
        guard.by_index.insert(index_key, message.message_hash);
        guard.by_hash.insert(message.message_hash, message);
        Ok(true)
    }

    fn get_message(&self, hash: H256) -> Result<Option<RelayedMessage>> {
        Ok(self.messages.read().by_hash.get(&hash).cloned())
    }

    fn messages_with_status(
        &self,
        source: Layer,
        status: MessageStatus,
    ) -> Result<Vec<RelayedMessage>> {
        let guard = self.messages.read();
        let mut found: Vec<_> = guard
            .by_hash
            .values()
            .filter(|m| m.source == source && m.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.message_index);
        Ok(found)
    }

    #[tracing::instrument(skip(self, f))]
    fn update_message<F>(&self, hash: H256, mut f: F) -> Result<RelayedMessage>
    where
        F: FnMut(&mut RelayedMessage) -> Result<()>,
    {
        let mut guard = self.messages.write();
        let stored = guard
            .by_hash
            .get_mut(&hash)
            .ok_or(Error::MessageNotFound(hash.0))?;
        let mut message = stored.clone();
        f(&mut message)?;
        *stored = message.clone();
        Ok(message)
    }
}

impl PendingTxStore for InMemoryStore {
    #[tracing::instrument(skip_all, fields(tx_hash = ?tx.tx_hash, nonce = tx.nonce))]
    fn insert_pending_tx(&self, tx: PendingTransaction) -> Result<()> {
        self.pending_txs.write().insert((tx.layer, tx.tx_hash), tx);
        Ok(())
    }

    fn get_pending_tx(
        &self,
        layer: Layer,
        tx_hash: H256,
    ) -> Result<Option<PendingTransaction>> {
        Ok(self.pending_txs.read().get(&(layer, tx_hash)).cloned())
    }

    fn pending_txs(&self, layer: Layer) -> Result<Vec<PendingTransaction>> {
        let guard = self.pending_txs.read();
        let mut txs: Vec<_> = guard
            .values()
            .filter(|tx| tx.layer == layer)
            .cloned()
            .collect();
        txs.sort_by_key(|tx| tx.nonce);
        Ok(txs)
    }

    #[tracing::instrument(skip(self, new), fields(new = ?new.tx_hash))]
    fn replace_pending_tx(
        &self,
        layer: Layer,
        old: H256,
        new: PendingTransaction,
    ) -> Result<()> {
        let mut guard = self.pending_txs.write();
        guard
            .remove(&(layer, old))
            .ok_or(Error::PendingTxNotFound(old.0))?;
        guard.insert((layer, new.tx_hash), new);
        Ok(())
    }

    #[tracing::instrument(skip(self, f))]
    fn update_pending_tx<F>(
        &self,
        layer: Layer,
        tx_hash: H256,
        mut f: F,
    ) -> Result<PendingTransaction>
    where
        F: FnMut(&mut PendingTransaction) -> Result<()>,
    {
        let mut guard = self.pending_txs.write();
        let stored = guard
            .get_mut(&(layer, tx_hash))
            .ok_or(Error::PendingTxNotFound(tx_hash.0))?;
        let mut tx = stored.clone();
        f(&mut tx)?;
        *stored = tx.clone();
        Ok(tx)
    }

    #[tracing::instrument(skip(self))]
    fn remove_pending_tx(
        &self,
        layer: Layer,
        tx_hash: H256,
    ) -> Result<Option<PendingTransaction>> {
        Ok(self.pending_txs.write().remove(&(layer, tx_hash)))
    }
}
