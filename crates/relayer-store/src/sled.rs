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

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use ethereum_types::H256;
use rollup_relayer_types::{
    BatchRecord, BatchStatus, BlockTrace, Layer, MessageStatus,
    PendingTransaction, RelayedMessage,
};
use rollup_relayer_utils::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionResult};
use sled::Transactional;

use super::{
    BatchStore, BlockTraceStore, HistoryStore, HistoryStoreKey,
    MessageStore, PendingTxStore, StoredBlockTrace,
};

const LATEST_BATCH_KEY: &[u8] = b"latest_batch_index";

/// SledStore is a store that keeps the relayer state in a [Sled](https://sled.rs)-based database.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    /// Directory of a temporary store, removed with the last clone.
    pub(crate) tmp_dir: Option<Arc<tempfile::TempDir>>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore").finish()
    }
}

impl SledStore {
    /// Create a new SledStore.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .mode(sled::Mode::HighThroughput)
            .open()?;
        Ok(Self { db, tmp_dir: None })
    }
    /// Creates a temporary SledStore.
    ///
    /// The database is removed from disk once the last clone is dropped.
    pub fn temporary() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let db = sled::Config::new()
            .path(dir.path())
            .temporary(true)
            .open()?;
        Ok(Self {
            db,
            tmp_dir: Some(Arc::new(dir)),
        })
    }

    /// Gets the total amount of data stored on disk
    pub fn get_data_stored_size(&self) -> u64 {
        self.db.size_on_disk().unwrap_or_default()
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut output = [0u8; 8];
    output.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(output)
}

fn message_index_key(source: Layer, index: u64) -> [u8; 9] {
    let mut key = [0u8; 9];
    key[0] = source.as_byte();
    key[1..].copy_from_slice(&index.to_be_bytes());
    key
}

fn pending_tx_key(layer: Layer, tx_hash: H256) -> [u8; 33] {
    let mut key = [0u8; 33];
    key[0] = layer.as_byte();
    key[1..].copy_from_slice(tx_hash.as_bytes());
    key
}

fn decode_all<T: DeserializeOwned>(
    iter: impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
) -> Result<Vec<T>> {
    iter.map(|item| {
        let (_, value) = item?;
        Ok(serde_json::from_slice(&value)?)
    })
    .collect()
}

/// Read-modify-write of a json value, retried until no concurrent writer
/// got in between.
fn update_json<T, F>(
    tree: &sled::Tree,
    key: &[u8],
    mut f: F,
    not_found: impl Fn() -> Error,
) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(&mut T) -> Result<()>,
{
    loop {
        let old = tree.get(key)?.ok_or_else(&not_found)?;
        let mut value: T = serde_json::from_slice(&old)?;
        f(&mut value)?;
        let new = serde_json::to_vec(&value)?;
        match tree.compare_and_swap(key, Some(old), Some(new))? {
            Ok(()) => return Ok(value),
            Err(_) => {
                tracing::trace!("concurrent update, retrying");
            }
        }
    }
}

impl SledStore {
    fn set_block_number(
        &self,
        tree: &str,
        key: HistoryStoreKey,
        block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree(tree)?;
        let old = tree.insert(key.to_bytes(), &block_number.to_be_bytes()[..])?;
        Ok(old.map(|v| read_u64(&v)).unwrap_or(block_number))
    }

    fn get_block_number(
        &self,
        tree: &str,
        key: HistoryStoreKey,
        default_block_number: u64,
    ) -> Result<u64> {
        let tree = self.db.open_tree(tree)?;
        let val = tree.get(key.to_bytes())?;
        Ok(val.map(|v| read_u64(&v)).unwrap_or(default_block_number))
    }
}

impl HistoryStore for SledStore {
    #[tracing::instrument(skip(self))]
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        self.set_block_number("last_block_numbers", key.into(), block_number)
    }

    #[tracing::instrument(skip(self))]
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        self.get_block_number(
            "last_block_numbers",
            key.into(),
            default_block_number,
        )
    }

    #[tracing::instrument(skip(self))]
    fn set_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64> {
        self.set_block_number("target_block_numbers", key.into(), block_number)
    }

    #[tracing::instrument(skip(self))]
    fn get_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64> {
        self.get_block_number(
            "target_block_numbers",
            key.into(),
            default_block_number,
        )
    }
}

impl BlockTraceStore for SledStore {
    #[tracing::instrument(skip_all, fields(count = traces.len()))]
    fn insert_block_traces(&self, traces: &[BlockTrace]) -> Result<()> {
        let tree = self.db.open_tree("unbatched_traces")?;
        let received_at = rollup_relayer_types::unix_millis();
        let mut batch = sled::Batch::default();
        for trace in traces {
            let stored = StoredBlockTrace {
                trace: trace.clone(),
                received_at,
            };
            batch.insert(
                &trace.number.to_be_bytes()[..],
                serde_json::to_vec(&stored)?,
            );
        }
        tree.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn unbatched_block_traces(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredBlockTrace>> {
        let tree = self.db.open_tree("unbatched_traces")?;
        decode_all(tree.iter().take(limit))
    }

    fn drop_unbatched_block_traces(&self, from: u64) -> Result<usize> {
        let tree = self.db.open_tree("unbatched_traces")?;
        let mut batch = sled::Batch::default();
        let mut dropped = 0;
        for item in tree.range(from.to_be_bytes()..) {
            let (key, _) = item?;
            batch.remove(key);
            dropped += 1;
        }
        tree.apply_batch(batch)?;
        self.db.flush()?;
        Ok(dropped)
    }
}

impl BatchStore for SledStore {
    #[tracing::instrument(skip_all, fields(index = record.index()))]
    fn insert_batch(&self, record: BatchRecord) -> Result<()> {
        let batches = self.db.open_tree("batches")?;
        let meta = self.db.open_tree("batch_meta")?;
        let unbatched = self.db.open_tree("unbatched_traces")?;
        let index = record.index();
        let value = serde_json::to_vec(&record)?;
        let consumed: Vec<_> = record
            .batch
            .blocks()
            .iter()
            .map(|b| b.number.to_be_bytes())
            .collect();

        // the new batch and the consumed traces move together, or not at all.
        let result: TransactionResult<(), Error> = (&batches, &meta, &unbatched)
            .transaction(|(batches, meta, unbatched)| {
                if let Some(tip) = meta.get(LATEST_BATCH_KEY)? {
                    let tip = read_u64(&tip);
                    if index != tip + 1 {
                        return Err(ConflictableTransactionError::Abort(
                            Error::InvalidInput(format!(
                                "batch #{index} does not follow the latest batch #{tip}"
                            )),
                        ));
                    }
                }
                batches.insert(&index.to_be_bytes()[..], value.as_slice())?;
                meta.insert(LATEST_BATCH_KEY, &index.to_be_bytes()[..])?;
                for number in &consumed {
                    unbatched.remove(&number[..])?;
                }
                Ok(())
            });
        result?;
        self.db.flush()?;
        Ok(())
    }

    fn get_batch(&self, index: u64) -> Result<Option<BatchRecord>> {
        let tree = self.db.open_tree("batches")?;
        match tree.get(index.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn latest_batch(&self) -> Result<Option<BatchRecord>> {
        let tree = self.db.open_tree("batches")?;
        match tree.last()? {
            Some((_, bytes)) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn batches_with_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<BatchRecord>> {
        let tree = self.db.open_tree("batches")?;
        let all: Vec<BatchRecord> = decode_all(tree.iter())?;
        Ok(all.into_iter().filter(|r| r.status == status).collect())
    }

    fn first_unfinished_batch(&self) -> Result<Option<BatchRecord>> {
        let tree = self.db.open_tree("batches")?;
        for item in tree.iter() {
            let (_, bytes) = item?;
            let record: BatchRecord = serde_json::from_slice(&bytes)?;
            if !record.status.is_terminal() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    #[tracing::instrument(skip(self, f))]
    fn update_batch<F>(&self, index: u64, f: F) -> Result<BatchRecord>
    where
        F: FnMut(&mut BatchRecord) -> Result<()>,
    {
        let tree = self.db.open_tree("batches")?;
        let record = update_json(&tree, &index.to_be_bytes(), f, || {
            Error::BatchNotFound(index)
        })?;
        self.db.flush()?;
        Ok(record)
    }
}

impl MessageStore for SledStore {
    #[tracing::instrument(skip_all, fields(hash = ?message.message_hash))]
    fn insert_message(&self, message: RelayedMessage) -> Result<bool> {
        let messages = self.db.open_tree("messages")?;
        let indices = self.db.open_tree("message_indices")?;
        let hash = message.message_hash;
        let index_key = message_index_key(message.source, message.message_index);
        let value = serde_json::to_vec(&message)?;

        let result: TransactionResult<bool, Error> = (&messages, &indices)
            .transaction(|(messages, indices)| {
                if messages.get(hash.as_bytes())?.is_some() {
                    return Ok(false);
                }
                if indices.get(index_key)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        Error::DuplicateMessageIndex {
                            source_layer: message.source.to_string(),
                            index: message.message_index,
                        },
                    ));
                }
                messages.insert(hash.as_bytes(), value.as_slice())?;
                indices.insert(&index_key[..], hash.as_bytes())?;
                Ok(true)
            });
        let inserted = result?;
        self.db.flush()?;
        Ok(inserted)
    }

    fn get_message(&self, hash: H256) -> Result<Option<RelayedMessage>> {
        let tree = self.db.open_tree("messages")?;
        match tree.get(hash.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn messages_with_status(
        &self,
        source: Layer,
        status: MessageStatus,
    ) -> Result<Vec<RelayedMessage>> {
        let tree = self.db.open_tree("messages")?;
        let all: Vec<RelayedMessage> = decode_all(tree.iter())?;
        let mut found: Vec<_> = all
            .into_iter()
            .filter(|m| m.source == source && m.status == status)
            .collect();
        found.sort_by_key(|m| m.message_index);
        Ok(found)
    }

    #[tracing::instrument(skip(self, f))]
    fn update_message<F>(&self, hash: H256, f: F) -> Result<RelayedMessage>
    where
        F: FnMut(&mut RelayedMessage) -> Result<()>,
    {
        let tree = self.db.open_tree("messages")?;
        let message = update_json(&tree, hash.as_bytes(), f, || {
            Error::MessageNotFound(hash.0)
        })?;
        self.db.flush()?;
        Ok(message)
    }
}

impl PendingTxStore for SledStore {
    #[tracing::instrument(skip_all, fields(tx_hash = ?tx.tx_hash, nonce = tx.nonce))]
    fn insert_pending_tx(&self, tx: PendingTransaction) -> Result<()> {
        let tree = self.db.open_tree("pending_txs")?;
        tree.insert(
            pending_tx_key(tx.layer, tx.tx_hash),
            serde_json::to_vec(&tx)?,
        )?;
        self.db.flush()?;
        Ok(())
    }

    fn get_pending_tx(
        &self,
        layer: Layer,
        tx_hash: H256,
    ) -> Result<Option<PendingTransaction>> {
        let tree = self.db.open_tree("pending_txs")?;
        match tree.get(pending_tx_key(layer, tx_hash))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn pending_txs(&self, layer: Layer) -> Result<Vec<PendingTransaction>> {
        let tree = self.db.open_tree("pending_txs")?;
        let mut txs: Vec<PendingTransaction> =
            decode_all(tree.scan_prefix([layer.as_byte()]))?;
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
        let tree = self.db.open_tree("pending_txs")?;
        let old_key = pending_tx_key(layer, old);
        let new_key = pending_tx_key(layer, new.tx_hash);
        let value = serde_json::to_vec(&new)?;
        let result: TransactionResult<(), Error> = tree.transaction(|tree| {
            if tree.remove(&old_key[..])?.is_none() {
                return Err(ConflictableTransactionError::Abort(
                    Error::PendingTxNotFound(old.0),
                ));
            }
            tree.insert(&new_key[..], value.as_slice())?;
            Ok(())
        });
        result?;
        self.db.flush()?;
        Ok(())
    }

    #[tracing::instrument(skip(self, f))]
    fn update_pending_tx<F>(
        &self,
        layer: Layer,
        tx_hash: H256,
        f: F,
    ) -> Result<PendingTransaction>
    where
        F: FnMut(&mut PendingTransaction) -> Result<()>,
    {
        let tree = self.db.open_tree("pending_txs")?;
        let tx = update_json(&tree, &pending_tx_key(layer, tx_hash), f, || {
            Error::PendingTxNotFound(tx_hash.0)
        })?;
        self.db.flush()?;
        Ok(tx)
    }

    #[tracing::instrument(skip(self))]
    fn remove_pending_tx(
        &self,
        layer: Layer,
        tx_hash: H256,
    ) -> Result<Option<PendingTransaction>> {
        let tree = self.db.open_tree("pending_txs")?;
        let removed = tree.remove(pending_tx_key(layer, tx_hash))?;
        self.db.flush()?;
        match removed {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
