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

//! Test harness of the rollup relayer: a relayer wired like the real
//! service, talking to two [`MockChainClient`]s.

#![deny(unsafe_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::{Address, H256, U256};
use ethers_signers::LocalWallet;
use rollup_relayer::service::{self, Sender, Store};
use rollup_relayer_batch::BatchRelayer;
use rollup_relayer_config::RollupRelayerConfig;
use rollup_relayer_context::RelayerContext;
use rollup_relayer_messenger::MessageRelayer;
use rollup_relayer_store::SledStore;
use rollup_relayer_tx_sender::mock::MockChainClient;
use rollup_relayer_types::{BlockTrace, Layer, SentMessage};
use tempfile::TempDir;

pub const L1_CHAIN_ID: u64 = 31_337;
pub const L2_CHAIN_ID: u64 = 31_338;

/// The rollup contract on L1.
pub const ROLLUP: Address = Address::repeat_byte(0xaa);
/// The messenger contract on L1.
pub const L1_MESSENGER: Address = Address::repeat_byte(0xab);
/// The messenger contract on L2.
pub const L2_MESSENGER: Address = Address::repeat_byte(0xbb);

const CONFIG: &str = r#"
port = 0

[l1]
name = "hermes"
chain-id = 31337
private-key = "0x8917174396171783496173419137618235192359106130478137647163400318"
contract-address = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
messenger-address = "0xabababababababababababababababababababab"
block-confirmations = 1
max-blocks-per-step = 10

[l1.sender]
submit-retry-interval = 10

[l2]
name = "athena"
chain-id = 31338
private-key = "0x1ce5a2d4e7c4b6f0d6b5a2e4d7c1b9a8f6e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9"
contract-address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
block-confirmations = 0
max-blocks-per-step = 10

[l2.sender]
submit-retry-interval = 10

[batch]
batch-blocks-threshold = 1
commit-poll-interval = 10
max-revert-retries = 2

[relay]
check-interval = 10
max-revert-retries = 2
"#;

/// The test configuration, read through the regular config loader.
pub fn config() -> RollupRelayerConfig {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("config.toml"), CONFIG).expect("write config");
    rollup_relayer::load_config(dir.path()).expect("valid config")
}

/// A relayer over two mocked chains.
pub struct TestRelayer {
    pub ctx: RelayerContext,
    pub l1: Arc<MockChainClient>,
    pub l2: Arc<MockChainClient>,
    pub l1_sender: Arc<Sender<MockChainClient>>,
    pub l2_sender: Arc<Sender<MockChainClient>>,
}

impl TestRelayer {
    /// A relayer with a throwaway store.
    pub fn new(config: RollupRelayerConfig) -> Self {
        let store = SledStore::temporary().expect("temporary store");
        Self::with_chains(
            config,
            store,
            Arc::new(MockChainClient::new(L1_CHAIN_ID)),
            Arc::new(MockChainClient::new(L2_CHAIN_ID)),
        )
    }

    /// A relayer on the store in `dir`, as after a restart.
    pub fn reopen(
        config: RollupRelayerConfig,
        dir: &Path,
        l1: Arc<MockChainClient>,
        l2: Arc<MockChainClient>,
    ) -> Self {
        let store = SledStore::open(dir).expect("open store");
        Self::with_chains(config, store, l1, l2)
    }

    pub fn with_chains(
        config: RollupRelayerConfig,
        store: SledStore,
        l1: Arc<MockChainClient>,
        l2: Arc<MockChainClient>,
    ) -> Self {
        let ctx = RelayerContext::new(config, store).expect("context");
        let l1_sender = Arc::new(
            service::make_sender(&ctx, Layer::L1, l1.clone()).expect("l1 sender"),
        );
        let l2_sender = Arc::new(
            service::make_sender(&ctx, Layer::L2, l2.clone()).expect("l2 sender"),
        );
        Self {
            ctx,
            l1,
            l2,
            l1_sender,
            l2_sender,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        self.ctx.store()
    }

    pub fn batch_relayer(
        &self,
    ) -> BatchRelayer<MockChainClient, MockChainClient, Store, LocalWallet> {
        service::batch_relayer(&self.ctx, self.l1_sender.clone(), self.l2.clone())
    }

    /// The relayer of the messages sent on `source`.
    pub fn message_relayer(
        &self,
        source: Layer,
    ) -> MessageRelayer<MockChainClient, MockChainClient, Store, LocalWallet> {
        match source {
            Layer::L1 => service::message_relayer(
                &self.ctx,
                Layer::L1,
                self.l1.clone(),
                self.l2_sender.clone(),
            ),
            Layer::L2 => service::message_relayer(
                &self.ctx,
                Layer::L2,
                self.l2.clone(),
                self.l1_sender.clone(),
            ),
        }
    }
}

/// A store directory that outlives the relayers opened on it.
pub fn store_dir() -> TempDir {
    tempfile::tempdir().expect("tempdir")
}

/// Consecutive L2 blocks `from..=to`, each pointing at the previous one.
pub fn blocks(from: u64, to: u64) -> Vec<BlockTrace> {
    (from..=to)
        .map(|n| {
            BlockTrace::builder()
                .number(n)
                .hash(H256::from_low_u64_be(0x10_000 + n))
                .parent_hash(H256::from_low_u64_be(0x10_000 + n - 1))
                .timestamp(1_700_000_000 + 2 * n)
                .gas_used(21_000 * n)
                .state_root(H256::from_low_u64_be(0x20_000 + n))
                .build()
        })
        .collect()
}

/// A message with `index` emitted in `block_number`.
pub fn message(index: u64, block_number: u64, payload: &[u8]) -> SentMessage {
    SentMessage {
        sender: Address::repeat_byte(0x51),
        target: Address::repeat_byte(0x7a),
        value: U256::zero(),
        message_index: index,
        payload: payload.to_vec().into(),
        block_number,
    }
}

/// Polls `done` until it holds, giving up after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let started = tokio::time::Instant::now();
    while started.elapsed() < timeout {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    done()
}
