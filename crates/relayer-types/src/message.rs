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
use ethers_core::utils::keccak256;
use rollup_relayer_utils::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::Layer;

/// A message as emitted by the messenger contract of the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub sender: Address,
    pub target: Address,
    pub value: U256,
    pub message_index: u64,
    pub payload: Bytes,
    pub block_number: u64,
}

impl SentMessage {
    /// `keccak256(source || sender || target || value || message_index || payload)`,
    /// `source` being the chain the message was emitted on.
    ///
    /// Identical messages sent in opposite directions hash differently.
    pub fn message_hash(&self, source: Layer) -> H256 {
        let mut buf =
            Vec::with_capacity(1 + 20 + 20 + 32 + 8 + self.payload.len());
        buf.push(source.as_byte());
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(self.target.as_bytes());
        let mut value = [0u8; 32];
        self.value.to_big_endian(&mut value);
        buf.extend_from_slice(&value);
        buf.extend_from_slice(&self.message_index.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        H256(keccak256(buf))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum MessageStatus {
    Pending,
    Submitted,
    Confirmed,
    Failed,
    Expired,
}

impl MessageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Expired)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        use MessageStatus::*;
        match (self, next) {
            (Confirmed | Failed | Expired, _) => false,
            (Pending, Submitted | Failed | Expired) => true,
            (Submitted, Confirmed | Pending | Failed | Expired) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A cross-chain message and its delivery progress on the counterpart chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedMessage {
    pub message_hash: H256,
    /// Chain the message was emitted on.
    pub source: Layer,
    pub message_index: u64,
    pub sender: Address,
    pub target: Address,
    pub value: U256,
    pub payload: Bytes,
    pub block_number: u64,
    pub status: MessageStatus,
    pub tx_hash: Option<H256>,
    pub revert_retries: u32,
    pub last_error: Option<String>,
}

impl RelayedMessage {
    /// A `Pending` message observed on `source`.
    pub fn new(source: Layer, sent: SentMessage) -> Self {
        Self {
            message_hash: sent.message_hash(source),
            source,
            message_index: sent.message_index,
            sender: sent.sender,
            target: sent.target,
            value: sent.value,
            payload: sent.payload,
            block_number: sent.block_number,
            status: MessageStatus::Pending,
            tx_hash: None,
            revert_retries: 0,
            last_error: None,
        }
    }

    /// Chain the relay transaction is sent to.
    pub fn destination(&self) -> Layer {
        self.source.counterpart()
    }

    pub fn transition(&mut self, next: MessageStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}
