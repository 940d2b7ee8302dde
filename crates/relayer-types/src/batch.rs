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

use ethers_core::types::H256;
use ethers_core::utils::keccak256;
use rollup_relayer_utils::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::block::BlockTrace;

/// Reference to the batch a new batch is chained onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentBatchRef {
    pub index: u64,
    pub hash: H256,
    pub state_root: H256,
}

impl ParentBatchRef {
    /// The sentinel parent of the very first batch.
    ///
    /// Its hash is zero; its child gets exactly `genesis_index`.
    pub fn genesis(genesis_index: u64, genesis_state_root: H256) -> Self {
        Self {
            index: genesis_index,
            hash: H256::zero(),
            state_root: genesis_state_root,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.hash.is_zero()
    }

    /// Index the next batch built on top of this reference receives.
    pub fn child_index(&self) -> u64 {
        if self.is_genesis() {
            self.index
        } else {
            self.index + 1
        }
    }
}

/// An ordered, content addressed group of consecutive blocks.
///
/// Built only through [`build_batch`], never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    index: u64,
    parent_hash: H256,
    blocks: Vec<BlockTrace>,
    new_state_root: H256,
    data_hash: H256,
    created_at: u64,
}

impl Batch {
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn parent_hash(&self) -> H256 {
        self.parent_hash
    }

    pub fn blocks(&self) -> &[BlockTrace] {
        &self.blocks
    }

    pub fn new_state_root(&self) -> H256 {
        self.new_state_root
    }

    /// The batch identity, also the argument of the commit call.
    pub fn data_hash(&self) -> H256 {
        self.data_hash
    }

    /// Timestamp of the last contained block.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn first_block(&self) -> u64 {
        self.blocks.first().map(|b| b.number).unwrap_or_default()
    }

    pub fn last_block(&self) -> u64 {
        self.blocks.last().map(|b| b.number).unwrap_or_default()
    }

    /// Size of the payload hashed into [`Batch::data_hash`].
    pub fn encoded_len(&self) -> usize {
        encoded_len(&self.blocks)
    }

    /// Parent reference for the batch built after this one.
    pub fn as_parent(&self) -> ParentBatchRef {
        ParentBatchRef {
            index: self.index,
            hash: self.data_hash,
            state_root: self.new_state_root,
        }
    }
}

/// Size of the batch payload `blocks` would produce.
pub fn encoded_len(blocks: &[BlockTrace]) -> usize {
    32 + 32 + blocks.iter().map(BlockTrace::encoded_len).sum::<usize>()
}

/// Builds the batch chained onto `parent` out of `blocks`.
///
/// `blocks` must be non-empty, numbered consecutively, and each block must
/// point at the previous one's hash.
pub fn build_batch(
    parent: &ParentBatchRef,
    blocks: Vec<BlockTrace>,
) -> Result<Batch> {
    let last = blocks
        .last()
        .ok_or_else(|| Error::InvalidInput("empty block list".into()))?;
    for pair in blocks.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.number != prev.number + 1 {
            return Err(Error::InvalidInput(format!(
                "block #{} does not follow block #{}",
                next.number, prev.number
            )));
        }
        if next.parent_hash != prev.hash {
            return Err(Error::InvalidInput(format!(
                "block #{} parent hash {:?} does not match block #{} hash {:?}",
                next.number, next.parent_hash, prev.number, prev.hash
            )));
        }
    }

    let mut payload = Vec::with_capacity(encoded_len(&blocks));
    payload.extend_from_slice(parent.hash.as_bytes());
    payload.extend_from_slice(parent.state_root.as_bytes());
    for block in &blocks {
        block.encode_to(&mut payload);
    }

    Ok(Batch {
        index: parent.child_index(),
        parent_hash: parent.hash,
        new_state_root: last.state_root,
        created_at: last.timestamp,
        data_hash: H256(keccak256(&payload)),
        blocks,
    })
}

/// Where a batch is in its lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum BatchStatus {
    Pending,
    Committing,
    Committed,
    Finalizing,
    Finalized,
    Skipped,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Skipped)
    }

    /// Whether `self -> next` is a legal lifecycle move.
    ///
    /// Going back from an in-flight state (`Committing -> Pending`,
    /// `Finalizing -> Committed`) is how a transient revert is retried.
    pub fn can_transition_to(self, next: Self) -> bool {
        use BatchStatus::*;
        match (self, next) {
            (Finalized | Skipped, _) => false,
            (_, Skipped) => true,
            (Pending, Committing)
            | (Committing, Committed)
            | (Committing, Pending)
            | (Committed, Finalizing)
            | (Finalizing, Finalized)
            | (Finalizing, Committed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Finalizing => "finalizing",
            Self::Finalized => "finalized",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A batch together with what the relayer knows about its progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch: Batch,
    pub status: BatchStatus,
    pub commit_tx: Option<H256>,
    pub finalize_tx: Option<H256>,
    pub revert_retries: u32,
    pub last_error: Option<String>,
    pub skip_reason: Option<String>,
    pub updated_at: u64,
}

impl BatchRecord {
    /// A fresh `Pending` record.
    pub fn new(batch: Batch) -> Self {
        Self {
            batch,
            status: BatchStatus::Pending,
            commit_tx: None,
            finalize_tx: None,
            revert_retries: 0,
            last_error: None,
            skip_reason: None,
            updated_at: crate::unix_millis(),
        }
    }

    pub fn index(&self) -> u64 {
        self.batch.index()
    }

    /// Moves the record to `next`, rejecting illegal moves.
    pub fn transition(&mut self, next: BatchStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = crate::unix_millis();
        Ok(())
    }

    /// Marks the batch as skipped, keeping `reason`.
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(BatchStatus::Skipped)?;
        self.skip_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u64, parent_hash: H256) -> BlockTrace {
        BlockTrace::builder()
            .number(number)
            .hash(H256::from_low_u64_be(1000 + number))
            .parent_hash(parent_hash)
            .timestamp(1_700_000_000 + number)
            .state_root(H256::from_low_u64_be(number))
            .build()
    }

    fn chain(from: u64, len: u64) -> Vec<BlockTrace> {
        let mut parent = H256::from_low_u64_be(1000 + from - 1);
        (from..from + len)
            .map(|n| {
                let b = block(n, parent);
                parent = b.hash;
                b
            })
            .collect()
    }

    #[test]
    fn genesis_child_gets_the_genesis_index() {
        let genesis = ParentBatchRef::genesis(0, H256::repeat_byte(9));
        let batch0 = build_batch(&genesis, chain(1, 3)).unwrap();
        assert_eq!(batch0.index(), 0);
        assert_eq!(batch0.parent_hash(), H256::zero());
        assert_eq!(batch0.new_state_root(), H256::from_low_u64_be(3));

        let batch1 = build_batch(&batch0.as_parent(), chain(4, 2)).unwrap();
        assert_eq!(batch1.index(), 1);
        assert_eq!(batch1.parent_hash(), batch0.data_hash());

        let genesis = ParentBatchRef::genesis(42, H256::zero());
        assert_eq!(build_batch(&genesis, chain(1, 1)).unwrap().index(), 42);
    }

    #[test]
    fn data_hash_is_deterministic() {
        let parent = ParentBatchRef::genesis(0, H256::repeat_byte(9));
        let a = build_batch(&parent, chain(1, 4)).unwrap();
        let b = build_batch(&parent, chain(1, 4)).unwrap();
        assert_eq!(a, b);

        let other_root = ParentBatchRef::genesis(0, H256::repeat_byte(8));
        let c = build_batch(&other_root, chain(1, 4)).unwrap();
        assert_ne!(a.data_hash(), c.data_hash());
    }

    #[test]
    fn data_hash_covers_the_canonical_encoding() {
        let parent = ParentBatchRef::genesis(0, H256::repeat_byte(9));
        let blocks = chain(1, 2);
        let mut payload = Vec::new();
        payload.extend_from_slice(parent.hash.as_bytes());
        payload.extend_from_slice(parent.state_root.as_bytes());
        for b in &blocks {
            payload.extend_from_slice(&b.encode());
        }
        let batch = build_batch(&parent, blocks).unwrap();
        assert_eq!(batch.data_hash(), H256(keccak256(&payload)));
        assert_eq!(batch.encoded_len(), payload.len());
    }

    #[test]
    fn rejects_empty_and_inconsistent_blocks() {
        let parent = ParentBatchRef::genesis(0, H256::zero());
        assert!(matches!(
            build_batch(&parent, vec![]),
            Err(Error::InvalidInput(_))
        ));

        let mut gap = chain(1, 3);
        gap.remove(1);
        assert!(matches!(
            build_batch(&parent, gap),
            Err(Error::InvalidInput(_))
        ));

        let mut broken = chain(1, 3);
        broken[2].parent_hash = H256::repeat_byte(0xff);
        assert!(matches!(
            build_batch(&parent, broken),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn lifecycle_transitions() {
        let parent = ParentBatchRef::genesis(0, H256::zero());
        let mut record = BatchRecord::new(build_batch(&parent, chain(1, 1)).unwrap());
        assert!(matches!(
            record.transition(BatchStatus::Committed),
            Err(Error::InvalidTransition { .. })
        ));
        record.transition(BatchStatus::Committing).unwrap();
        record.transition(BatchStatus::Committed).unwrap();
        record.transition(BatchStatus::Finalizing).unwrap();
        record.transition(BatchStatus::Finalized).unwrap();
        assert!(record.skip("too late").is_err());
        assert_eq!(record.skip_reason, None);

        let mut record = BatchRecord::new(build_batch(&parent, chain(1, 1)).unwrap());
        record.skip("duplicate index").unwrap();
        assert_eq!(record.status, BatchStatus::Skipped);
        assert_eq!(record.skip_reason.as_deref(), Some("duplicate index"));
        assert!(record.transition(BatchStatus::Committing).is_err());
    }
}
