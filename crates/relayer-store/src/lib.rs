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

//! # Relayer Store Module 🕸️
//!
//! A module for managing the storage of the relayer.
//!
//! ## Overview
//!
//! The relayer store keeps the sync cursors of both chains, the block traces
//! waiting to be batched, every batch and relayed message with its status, and
//! the transactions the relayer still has to see settled. Every status change
//! is a read-modify-write closure the store runs atomically.
//!
use std::fmt::{Debug, Display};

use ethereum_types::H256;
use rollup_relayer_types::{
    BatchRecord, BatchStatus, BlockTrace, Layer, MessageStatus,
    PendingTransaction, RelayedMessage, TxEntity,
};
use rollup_relayer_utils::Result;
use serde::{Deserialize, Serialize};

/// A module for managing in-memory storage of the relayer.
pub mod mem;
/// A module for setting up and managing a [Sled](https://sled.rs)-based database.
#[cfg(feature = "sled")]
pub mod sled;

#[cfg(test)]
mod tests;

/// A store that uses [`sled`](https://sled.rs) as the backend.
#[cfg(feature = "sled")]
pub use self::sled::SledStore;
/// A store that uses in memory data structures as the backend.
pub use mem::InMemoryStore;

/// HistoryStoreKey contains the keys used to store the sync cursors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HistoryStoreKey {
    /// Block traces fetched from a chain.
    BlockTraces { layer: Layer },
    /// Cross-chain messages scanned on a chain.
    Messages { layer: Layer },
}

impl HistoryStoreKey {
    /// The chain this key is for.
    pub fn layer(&self) -> Layer {
        match self {
            Self::BlockTraces { layer } | Self::Messages { layer } => *layer,
        }
    }

    /// Returns the bytes of the key.
    pub fn to_bytes(&self) -> Vec<u8> {
        let tag = match self {
            Self::BlockTraces { .. } => 0u8,
            Self::Messages { .. } => 1u8,
        };
        vec![tag, self.layer().as_byte()]
    }
}

impl Display for HistoryStoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockTraces { layer } => write!(f, "BlockTraces({layer})"),
            Self::Messages { layer } => write!(f, "Messages({layer})"),
        }
    }
}

/// A block trace waiting to be put in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlockTrace {
    /// The trace itself.
    pub trace: BlockTrace,
    /// Unix millis at which the relayer stored it.
    pub received_at: u64,
}

/// HistoryStore is a simple trait for storing and retrieving history
/// of block numbers.
pub trait HistoryStore: Clone + Send + Sync {
    /// Sets the new block number for that key in the cache and returns the old one.
    fn set_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64>;
    /// Get the last block number for that key.
    /// if not found, returns the `default_block_number`.
    fn get_last_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64>;

    /// an easy way to call the `get_last_block_number`
    /// where the default block number is `0`.
    fn get_last_block_number_or_default<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
    ) -> Result<u64> {
        self.get_last_block_number(key, 0u64)
    }

    /// Sets the Target Block number (Usually the latest block number of the target chain)
    /// This used to be able to check if we are fully synced with the target chain or not.
    fn set_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        block_number: u64,
    ) -> Result<u64>;
    /// Get the target block number.
    /// if not found, returns the `default_block_number`.
    fn get_target_block_number<K: Into<HistoryStoreKey> + Debug>(
        &self,
        key: K,
        default_block_number: u64,
    ) -> Result<u64>;
}

/// Block traces fetched from the source chain and not batched yet.
pub trait BlockTraceStore: Clone + Send + Sync {
    /// Stores `traces` as unbatched. Already stored numbers are overwritten.
    fn insert_block_traces(&self, traces: &[BlockTrace]) -> Result<()>;

    /// Up to `limit` unbatched traces, lowest block number first.
    fn unbatched_block_traces(
        &self,
        limit: usize,
    ) -> Result<Vec<StoredBlockTrace>>;

    /// Drops every unbatched trace numbered `from` or higher, returning
    /// how many were dropped.
    fn drop_unbatched_block_traces(&self, from: u64) -> Result<usize>;
}

/// Batches and their lifecycle.
pub trait BatchStore: BlockTraceStore {
    /// Stores a new batch and drops its blocks from the unbatched traces,
    /// in one atomic step.
    ///
    /// The batch must directly follow the latest stored batch, otherwise
    /// [`rollup_relayer_utils::Error::InvalidInput`] is returned.
    fn insert_batch(&self, record: BatchRecord) -> Result<()>;

    /// The batch at `index`, if any.
    fn get_batch(&self, index: u64) -> Result<Option<BatchRecord>>;

    /// The batch with the highest index.
    fn latest_batch(&self) -> Result<Option<BatchRecord>>;

    /// All batches in `status`, lowest index first.
    fn batches_with_status(
        &self,
        status: BatchStatus,
    ) -> Result<Vec<BatchRecord>>;

    /// The lowest batch that is neither finalized nor skipped.
    fn first_unfinished_batch(&self) -> Result<Option<BatchRecord>>;

    /// Runs `f` on the stored batch and saves the result atomically.
    ///
    /// Nothing is saved when `f` fails.
    fn update_batch<F>(&self, index: u64, f: F) -> Result<BatchRecord>
    where
        F: FnMut(&mut BatchRecord) -> Result<()>;
}

/// Cross-chain messages and their relay status.
pub trait MessageStore: Clone + Send + Sync {
    /// Stores a newly seen message.
    ///
    /// Returns `false` when the same message is already known. Fails with
    /// [`rollup_relayer_utils::Error::DuplicateMessageIndex`] when another
    /// message already holds its `(source, message_index)`.
    fn insert_message(&self, message: RelayedMessage) -> Result<bool>;

    /// The message with `hash`, if any.
    fn get_message(&self, hash: H256) -> Result<Option<RelayedMessage>>;

    /// Messages sent on `source` in `status`, lowest index first.
    fn messages_with_status(
        &self,
        source: Layer,
        status: MessageStatus,
    ) -> Result<Vec<RelayedMessage>>;

    /// Runs `f` on the stored message and saves the result atomically.
    fn update_message<F>(&self, hash: H256, f: F) -> Result<RelayedMessage>
    where
        F: FnMut(&mut RelayedMessage) -> Result<()>;
}

/// Transactions broadcast by the relayer and not settled yet.
pub trait PendingTxStore: Clone + Send + Sync {
    /// Starts tracking `tx`.
    fn insert_pending_tx(&self, tx: PendingTransaction) -> Result<()>;

    /// The tracked transaction with `tx_hash` on `layer`.
    fn get_pending_tx(
        &self,
        layer: Layer,
        tx_hash: H256,
    ) -> Result<Option<PendingTransaction>>;

    /// All tracked transactions on `layer`, lowest nonce first.
    fn pending_txs(&self, layer: Layer) -> Result<Vec<PendingTransaction>>;

    /// The tracked transaction acting on `entity`, if any.
    fn pending_tx_for(
        &self,
        layer: Layer,
        entity: TxEntity,
    ) -> Result<Option<PendingTransaction>> {
        Ok(self
            .pending_txs(layer)?
            .into_iter()
            .find(|tx| tx.entity == entity))
    }

    /// Swaps the transaction `old` for its replacement in one atomic step.
    fn replace_pending_tx(
        &self,
        layer: Layer,
        old: H256,
        new: PendingTransaction,
    ) -> Result<()>;

    /// Runs `f` on the tracked transaction and saves the result atomically.
    fn update_pending_tx<F>(
        &self,
        layer: Layer,
        tx_hash: H256,
        f: F,
    ) -> Result<PendingTransaction>
    where
        F: FnMut(&mut PendingTransaction) -> Result<()>;

    /// Stops tracking `tx_hash`, returning it if it was tracked.
    fn remove_pending_tx(
        &self,
        layer: Layer,
        tx_hash: H256,
    ) -> Result<Option<PendingTransaction>>;
}

/// Everything the relayers need from a store.
pub trait RollupStore:
    HistoryStore + BatchStore + MessageStore + PendingTxStore + 'static
{
}

impl<T> RollupStore for T where
    T: HistoryStore + BatchStore + MessageStore + PendingTxStore + 'static
{
}
