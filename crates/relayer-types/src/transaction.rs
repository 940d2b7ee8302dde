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

use crate::Layer;

/// EIP-1559 fee fields of a transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct FeeParams {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl FeeParams {
    /// Both fields raised by `percent`, and by at least one wei.
    pub fn bumped(&self, percent: u64) -> Self {
        let bump = |old: U256| {
            let raised = old.saturating_mul(U256::from(100 + percent))
                / U256::from(100);
            raised.max(old.saturating_add(U256::one()))
        };
        Self {
            max_fee_per_gas: bump(self.max_fee_per_gas),
            max_priority_fee_per_gas: bump(self.max_priority_fee_per_gas),
        }
    }

    /// Field-wise maximum of `self` and `floor`.
    pub fn at_least(&self, floor: &FeeParams) -> Self {
        let max_priority_fee_per_gas = self
            .max_priority_fee_per_gas
            .max(floor.max_priority_fee_per_gas);
        Self {
            max_fee_per_gas: self
                .max_fee_per_gas
                .max(floor.max_fee_per_gas)
                .max(max_priority_fee_per_gas),
            max_priority_fee_per_gas,
        }
    }
}

/// What a relayer transaction acts on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum TxEntity {
    CommitBatch(u64),
    FinalizeBatch(u64),
    RelayMessage(H256),
}

impl std::fmt::Display for TxEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommitBatch(index) => write!(f, "commit batch #{index}"),
            Self::FinalizeBatch(index) => write!(f, "finalize batch #{index}"),
            Self::RelayMessage(hash) => write!(f, "relay message {hash:?}"),
        }
    }
}

/// A broadcast transaction that is not settled yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub tx_hash: H256,
    pub layer: Layer,
    pub nonce: u64,
    /// Unix millis of the last broadcast, original or replacement.
    pub submitted_at: u64,
    pub fee: FeeParams,
    pub entity: TxEntity,
    /// Fee bumps made so far.
    pub attempts: u32,
    /// Earlier hashes sent with the same nonce.
    pub replaced: Vec<H256>,
    pub to: Address,
    pub data: Bytes,
    pub gas_limit: u64,
    /// Block the transaction was last seen mined in.
    pub observed_block: Option<u64>,
}

impl PendingTransaction {
    /// The current hash followed by all the replaced ones.
    pub fn all_hashes(&self) -> impl Iterator<Item = H256> + '_ {
        std::iter::once(self.tx_hash).chain(self.replaced.iter().copied())
    }
}

/// What the chain says about a transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TxStatus {
    /// Known to the node but not mined.
    Pending,
    Confirmed { block_number: u64 },
    Reverted { block_number: u64, reason: String },
    NotFound,
}

impl TxStatus {
    /// Block number of a mined transaction, reverted or not.
    pub fn mined_at(&self) -> Option<u64> {
        match self {
            Self::Confirmed { block_number }
            | Self::Reverted { block_number, .. } => Some(*block_number),
            Self::Pending | Self::NotFound => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_is_strict_even_for_tiny_fees() {
        let fee = FeeParams {
            max_fee_per_gas: U256::from(5),
            max_priority_fee_per_gas: U256::zero(),
        };
        let bumped = fee.bumped(10);
        assert_eq!(bumped.max_fee_per_gas, U256::from(6));
        assert_eq!(bumped.max_priority_fee_per_gas, U256::one());

        let fee = FeeParams {
            max_fee_per_gas: U256::from(1_000),
            max_priority_fee_per_gas: U256::from(100),
        };
        let bumped = fee.bumped(10);
        assert_eq!(bumped.max_fee_per_gas, U256::from(1_100));
        assert_eq!(bumped.max_priority_fee_per_gas, U256::from(110));
    }

    #[test]
    fn floor_keeps_max_fee_above_tip() {
        let suggested = FeeParams {
            max_fee_per_gas: U256::from(10),
            max_priority_fee_per_gas: U256::from(1),
        };
        let floor = FeeParams {
            max_fee_per_gas: U256::zero(),
            max_priority_fee_per_gas: U256::from(20),
        };
        let fee = suggested.at_least(&floor);
        assert_eq!(fee.max_priority_fee_per_gas, U256::from(20));
        assert_eq!(fee.max_fee_per_gas, U256::from(20));
    }
}
