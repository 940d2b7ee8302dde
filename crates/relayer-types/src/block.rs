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

use ethers_core::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// A single transaction executed in a source chain block.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder,
)]
pub struct TransactionTrace {
    pub hash: H256,
    #[builder(default)]
    pub from: Address,
    #[builder(default)]
    pub to: Option<Address>,
    #[builder(default)]
    pub nonce: u64,
    #[builder(default)]
    pub gas: u64,
    #[builder(default)]
    pub value: U256,
    #[builder(default)]
    pub input: Bytes,
}

/// Execution result of one source chain block.
///
/// Immutable once produced by the chain client.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder,
)]
pub struct BlockTrace {
    pub number: u64,
    pub hash: H256,
    pub parent_hash: H256,
    #[builder(default)]
    pub timestamp: u64,
    #[builder(default)]
    pub gas_used: u64,
    #[builder(default)]
    pub transactions: Vec<TransactionTrace>,
    pub state_root: H256,
}

impl BlockTrace {
    /// Length of [`BlockTrace::encode`] without building it.
    pub fn encoded_len(&self) -> usize {
        // number, hash, parent hash, timestamp, gas used, state root, tx count
        8 + 32 + 32 + 8 + 8 + 32 + 4 + 32 * self.transactions.len()
    }

    /// Canonical encoding of the block, as hashed into the batch data hash.
    ///
    /// `number || hash || parent_hash || timestamp || gas_used || state_root
    /// || tx_count || tx_hash...`, integers big endian.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_to(&mut out);
        out
    }

    pub(crate) fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.number.to_be_bytes());
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(self.parent_hash.as_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.gas_used.to_be_bytes());
        out.extend_from_slice(self.state_root.as_bytes());
        out.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for tx in &self.transactions {
            out.extend_from_slice(tx.hash.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_matches_declared_len() {
        let block = BlockTrace::builder()
            .number(5)
            .hash(H256::repeat_byte(1))
            .parent_hash(H256::repeat_byte(2))
            .state_root(H256::repeat_byte(3))
            .transactions(vec![
                TransactionTrace::builder().hash(H256::repeat_byte(4)).build(),
                TransactionTrace::builder().hash(H256::repeat_byte(5)).build(),
            ])
            .build();
        let encoded = block.encode();
        assert_eq!(encoded.len(), block.encoded_len());
        assert_eq!(&encoded[..8], &5u64.to_be_bytes());
        assert_eq!(&encoded[120..124], &2u32.to_be_bytes());
        assert_eq!(&encoded[124..156], H256::repeat_byte(4).as_bytes());
    }
}
