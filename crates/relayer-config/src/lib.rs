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

#![warn(missing_docs)]

//! # Relayer Configuration Module 🕸️
//!
//! A module for configuring the rollup relayer.
//!
//! ## Overview
//!
//! Possible configuration include:
//! * `port`: The port the relayer will listen on. Defaults to 9955
//! * `l1`, `l2`: the two chains, their signing account and transaction sender settings.
//! * `batch`: when batches are sealed and how they are committed.
//! * `relay`: cross-chain message relaying in both directions.
//! * `permanent-revert-reasons`: revert strings that are never retried.

/// Default values of the configuration.
pub mod defaults;
/// Utils for processing configuration
pub mod utils;

use std::time::Duration;

use ethereum_types::{Address, H256};
use rollup_relayer_types::private_key::PrivateKey;
use rollup_relayer_types::Layer;
use serde::{Deserialize, Serialize};

/// RollupRelayerConfig is the configuration for the rollup relayer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RollupRelayerConfig {
    /// HTTP Server Port number
    ///
    /// default to 9955
    #[serde(default = "defaults::port", skip_serializing)]
    pub port: u16,
    /// The destination chain of batches.
    pub l1: ChainConfig,
    /// The source chain of blocks.
    pub l2: ChainConfig,
    /// Batch building and committing.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Cross-chain message relaying.
    #[serde(default)]
    pub relay: MessageRelayConfig,
    /// Case-insensitive substrings of revert reasons that are never retried.
    #[serde(default = "defaults::permanent_revert_reasons")]
    pub permanent_revert_reasons: Vec<String>,
}

impl RollupRelayerConfig {
    /// Configuration of the chain on `layer`.
    pub fn chain(&self, layer: Layer) -> &ChainConfig {
        match layer {
            Layer::L1 => &self.l1,
            Layer::L2 => &self.l2,
        }
    }
}

/// One of the two chains the relayer talks to.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainConfig {
    /// String that groups configuration for this chain on a human-readable name.
    pub name: String,
    /// chain specific id (output of chainId opcode on EVM networks)
    #[serde(rename(serialize = "chainId"))]
    pub chain_id: u64,
    /// The Private Key of the relayer account on this network
    /// the format is more dynamic here:
    /// 1. if it starts with '0x' then this would be raw (64 bytes) hex encoded
    ///    private key.
    ///    Example: 0x8917174396171783496173419137618235192359106130478137647163400318
    ///
    /// 2. if it starts with '$' then it would be considered as an Enviroment variable
    ///    of a hex-encoded private key.
    ///   Example: $L1_PRIVATE_KEY
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// The rollup contract on L1, the messenger contract on L2.
    pub contract_address: Address,
    /// The messenger contract of this chain, if it is not at
    /// `contract-address`.
    #[serde(default)]
    pub messenger_address: Option<Address>,
    /// Blocks to wait on top of a mined block before trusting it.
    #[serde(default = "defaults::block_confirmations")]
    pub block_confirmations: u64,
    /// The maximum number of blocks scanned in one step.
    #[serde(default = "defaults::max_blocks_per_step")]
    pub max_blocks_per_step: u64,
    /// Transaction sender configuration.
    #[serde(default, skip_serializing)]
    pub sender: SenderConfig,
}

impl ChainConfig {
    /// Where relayed messages are delivered on this chain.
    pub fn messenger_address(&self) -> Address {
        self.messenger_address.unwrap_or(self.contract_address)
    }
}

/// Settings of the transaction sender of one chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SenderConfig {
    /// Milliseconds an unmined transaction waits before being bumped.
    #[serde(default = "defaults::tx_timeout")]
    pub tx_timeout: u64,
    /// Percentage both fee fields are raised by on every bump.
    #[serde(default = "defaults::fee_bump_percent")]
    pub fee_bump_percent: u64,
    /// Upper bound (in wei) of the max fee per gas a bump may reach.
    #[serde(default = "defaults::fee_bump_ceiling")]
    pub fee_bump_ceiling: u64,
    /// How many times a transaction can be bumped before it is stuck.
    #[serde(default = "defaults::max_bump_attempts")]
    pub max_bump_attempts: u32,
    /// Floor (in wei) of the max fee per gas.
    #[serde(default)]
    pub min_fee_per_gas: u64,
    /// Floor (in wei) of the priority fee per gas.
    #[serde(default)]
    pub min_priority_fee_per_gas: u64,
    /// Gas limit of relayer transactions.
    #[serde(default = "defaults::gas_limit")]
    pub gas_limit: u64,
    /// Broadcast attempts before a submission error is surfaced.
    #[serde(default = "defaults::max_submit_attempts")]
    pub max_submit_attempts: usize,
    /// Milliseconds between two broadcast attempts.
    #[serde(default = "defaults::submit_retry_interval")]
    pub submit_retry_interval: u64,
}

impl SenderConfig {
    /// [`SenderConfig::tx_timeout`] as a [`Duration`].
    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout)
    }

    /// [`SenderConfig::submit_retry_interval`] as a [`Duration`].
    pub fn submit_retry_interval(&self) -> Duration {
        Duration::from_millis(self.submit_retry_interval)
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            tx_timeout: defaults::tx_timeout(),
            fee_bump_percent: defaults::fee_bump_percent(),
            fee_bump_ceiling: defaults::fee_bump_ceiling(),
            max_bump_attempts: defaults::max_bump_attempts(),
            min_fee_per_gas: 0,
            min_priority_fee_per_gas: 0,
            gas_limit: defaults::gas_limit(),
            max_submit_attempts: defaults::max_submit_attempts(),
            submit_retry_interval: defaults::submit_retry_interval(),
        }
    }
}

/// Batch sealing and committing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatchConfig {
    /// A batch is sealed once this many blocks are waiting.
    #[serde(default = "defaults::batch_blocks_threshold")]
    pub batch_blocks_threshold: usize,
    /// A batch is sealed once the waiting blocks encode to this many bytes.
    #[serde(default = "defaults::batch_bytes_threshold")]
    pub batch_bytes_threshold: usize,
    /// Milliseconds after which the oldest waiting block forces a batch.
    #[serde(default = "defaults::batch_timeout")]
    pub batch_timeout: u64,
    /// Milliseconds between two ticks of the batch relayer.
    #[serde(default = "defaults::commit_poll_interval")]
    pub commit_poll_interval: u64,
    /// Batches allowed in the `Committing` state at once.
    #[serde(default = "defaults::max_inflight_commits")]
    pub max_inflight_commits: usize,
    /// Transient reverts tolerated before a batch is skipped.
    #[serde(default = "defaults::max_revert_retries")]
    pub max_revert_retries: u32,
    /// Index given to the first batch.
    #[serde(default)]
    pub genesis_batch_index: u64,
    /// State root the first batch is chained onto.
    #[serde(default)]
    pub genesis_state_root: H256,
}

impl BatchConfig {
    /// [`BatchConfig::batch_timeout`] as a [`Duration`].
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout)
    }

    /// [`BatchConfig::commit_poll_interval`] as a [`Duration`].
    pub fn commit_poll_interval(&self) -> Duration {
        Duration::from_millis(self.commit_poll_interval)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_blocks_threshold: defaults::batch_blocks_threshold(),
            batch_bytes_threshold: defaults::batch_bytes_threshold(),
            batch_timeout: defaults::batch_timeout(),
            commit_poll_interval: defaults::commit_poll_interval(),
            max_inflight_commits: defaults::max_inflight_commits(),
            max_revert_retries: defaults::max_revert_retries(),
            genesis_batch_index: 0,
            genesis_state_root: H256::zero(),
        }
    }
}

/// Cross-chain message relaying in both directions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MessageRelayConfig {
    /// Relay messages sent on L1 to L2.
    #[serde(default = "defaults::enabled")]
    pub enabled_l1_to_l2: bool,
    /// Relay messages sent on L2 to L1.
    #[serde(default = "defaults::enabled")]
    pub enabled_l2_to_l1: bool,
    /// Milliseconds between two ticks of a message relayer.
    #[serde(default = "defaults::check_interval")]
    pub check_interval: u64,
    /// Transient reverts tolerated before a message fails.
    #[serde(default = "defaults::max_revert_retries")]
    pub max_revert_retries: u32,
}

impl MessageRelayConfig {
    /// Whether messages emitted on `source` are relayed.
    pub fn is_enabled(&self, source: Layer) -> bool {
        match source {
            Layer::L1 => self.enabled_l1_to_l2,
            Layer::L2 => self.enabled_l2_to_l1,
        }
    }

    /// [`MessageRelayConfig::check_interval`] as a [`Duration`].
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval)
    }
}

impl Default for MessageRelayConfig {
    fn default() -> Self {
        Self {
            enabled_l1_to_l2: defaults::enabled(),
            enabled_l2_to_l1: defaults::enabled(),
            check_interval: defaults::check_interval(),
            max_revert_retries: defaults::max_revert_retries(),
        }
    }
}
