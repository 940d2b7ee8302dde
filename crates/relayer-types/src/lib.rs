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

//! Domain types shared by the rollup relayer crates.

use serde::{Deserialize, Serialize};

/// Execution traces of source chain blocks.
pub mod block;
/// Batch Model: chained, content addressed batches and their lifecycle.
pub mod batch;
/// Cross-chain messages and their relay status.
pub mod message;
/// A wrapper around a secret key, loadable from hex or env.
pub mod private_key;
/// Transactions sent by the relayer and still being tracked.
pub mod transaction;

pub use batch::{build_batch, Batch, BatchRecord, BatchStatus, ParentBatchRef};
pub use block::{BlockTrace, TransactionTrace};
pub use message::{MessageStatus, RelayedMessage, SentMessage};
pub use transaction::{FeeParams, PendingTransaction, TxEntity, TxStatus};

/// The two chains the relayer talks to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// The destination chain of batches, hosting the rollup contract.
    L1,
    /// The source chain producing the blocks.
    L2,
}

impl Layer {
    /// The chain on the other side of the bridge.
    pub fn counterpart(self) -> Self {
        match self {
            Self::L1 => Self::L2,
            Self::L2 => Self::L1,
        }
    }

    /// Single byte tag of the layer in hashes and keys.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::L1 => 1,
            Self::L2 => 2,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::L1 => write!(f, "l1"),
            Self::L2 => write!(f, "l2"),
        }
    }
}

/// Milliseconds since the unix epoch.
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
