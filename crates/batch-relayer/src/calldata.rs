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

use ethers_core::abi::{self, Token};
use ethers_core::types::{Bytes, U256};
use ethers_core::utils::id;
use rollup_relayer_types::Batch;

/// `commitBatch` of the rollup contract.
pub const COMMIT_BATCH: &str =
    "commitBatch(uint256,bytes32,bytes32,bytes32,uint64,uint64)";
/// `finalizeBatch` of the rollup contract.
pub const FINALIZE_BATCH: &str = "finalizeBatch(uint256,bytes32,bytes32)";

pub fn commit_batch_selector() -> [u8; 4] {
    id(COMMIT_BATCH)
}

pub fn finalize_batch_selector() -> [u8; 4] {
    id(FINALIZE_BATCH)
}

fn with_selector(selector: [u8; 4], tokens: &[Token]) -> Bytes {
    let mut data = selector.to_vec();
    data.extend(abi::encode(tokens));
    data.into()
}

/// Calldata committing `batch`: its index, parent, identity, resulting
/// state root and block range.
pub fn commit_batch(batch: &Batch) -> Bytes {
    with_selector(
        commit_batch_selector(),
        &[
            Token::Uint(U256::from(batch.index())),
            Token::FixedBytes(batch.parent_hash().as_bytes().to_vec()),
            Token::FixedBytes(batch.data_hash().as_bytes().to_vec()),
            Token::FixedBytes(batch.new_state_root().as_bytes().to_vec()),
            Token::Uint(U256::from(batch.first_block())),
            Token::Uint(U256::from(batch.last_block())),
        ],
    )
}

/// Calldata finalizing the already committed `batch`.
pub fn finalize_batch(batch: &Batch) -> Bytes {
    with_selector(
        finalize_batch_selector(),
        &[
            Token::Uint(U256::from(batch.index())),
            Token::FixedBytes(batch.data_hash().as_bytes().to_vec()),
            Token::FixedBytes(batch.new_state_root().as_bytes().to_vec()),
        ],
    )
}
