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
//! Shared state of a running rollup relayer: its configuration, store,
//! metrics and the signal that stops every task.
use std::sync::Arc;

use ethers_signers::{LocalWallet, Signer};
use tokio::sync::{broadcast, Mutex};

use rollup_relayer_config::RollupRelayerConfig;
use rollup_relayer_store::SledStore;
use rollup_relayer_types::Layer;
use rollup_relayer_utils::metric::{self, Metrics};

/// Everything the relayer tasks and HTTP handlers share.
///
/// Cloning is cheap; clones share the store, the metrics and the
/// shutdown channel.
#[derive(Clone)]
pub struct RelayerContext {
    /// The configuration of the relayer.
    pub config: RollupRelayerConfig,
    /// Fires once, when the relayer stops.
    notify_shutdown: broadcast::Sender<()>,
    /// Prometheus counters of the relayer.
    pub metrics: Arc<Mutex<metric::Metrics>>,
    store: Arc<SledStore>,
}

impl RelayerContext {
    /// Creates the context over an opened store.
    pub fn new(
        config: RollupRelayerConfig,
        store: SledStore,
    ) -> rollup_relayer_utils::Result<Self> {
        let (notify_shutdown, _) = broadcast::channel(2);
        let metrics = Arc::new(Mutex::new(Metrics::new()?));
        Ok(Self {
            config,
            notify_shutdown,
            metrics,
            store: Arc::new(store),
        })
    }

    /// A fresh subscription to the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Asks every task holding a [`Shutdown`] to stop.
    pub fn shutdown(&self) {
        // no subscribers left is fine.
        let _ = self.notify_shutdown.send(());
    }

    /// The persistent store of the relayer.
    pub fn store(&self) -> &Arc<SledStore> {
        &self.store
    }

    /// The wallet signing transactions sent on `layer`.
    pub fn wallet(
        &self,
        layer: Layer,
    ) -> rollup_relayer_utils::Result<LocalWallet> {
        let chain = self.config.chain(layer);
        let key = chain
            .private_key
            .as_ref()
            .ok_or(rollup_relayer_utils::Error::MissingSecrets)?;
        Ok(LocalWallet::from_bytes(key.as_bytes())?
            .with_chain_id(chain.chain_id))
    }
}

/// A task's end of the shutdown channel.
///
/// Remembers the signal once seen, so `recv` keeps returning right away.
#[derive(Debug)]
pub struct Shutdown {
    received: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Wraps a receiver of [`RelayerContext::shutdown`].
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            received: false,
            notify,
        }
    }

    /// Whether the signal was already observed.
    pub fn is_shutdown(&self) -> bool {
        self.received
    }

    /// Waits for the signal.
    pub async fn recv(&mut self) {
        if self.received {
            return;
        }
        // a single value is ever sent, lagging is impossible.
        let _ = self.notify.recv().await;
        self.received = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollup_relayer_config::{ChainConfig, SenderConfig};

    fn chain(chain_id: u64, key: Option<&str>) -> ChainConfig {
        ChainConfig {
            name: format!("chain-{chain_id}"),
            chain_id,
            private_key: key.map(|k| {
                serde_json::from_value(serde_json::Value::String(k.into()))
                    .unwrap()
            }),
            contract_address: ethereum_types::Address::zero(),
            messenger_address: None,
            block_confirmations: 1,
            max_blocks_per_step: 10,
            sender: SenderConfig::default(),
        }
    }

    fn config() -> RollupRelayerConfig {
        let key = format!("0x{}", "22".repeat(32));
        RollupRelayerConfig {
            port: 0,
            l1: chain(1, Some(&key)),
            l2: chain(2, None),
            batch: Default::default(),
            relay: Default::default(),
            permanent_revert_reasons: vec![],
        }
    }

    #[test]
    fn wallet_needs_a_private_key() {
        let ctx =
            RelayerContext::new(config(), SledStore::temporary().unwrap())
                .unwrap();
        let wallet = ctx.wallet(Layer::L1).unwrap();
        assert_eq!(wallet.chain_id(), 1);
        assert!(matches!(
            ctx.wallet(Layer::L2),
            Err(rollup_relayer_utils::Error::MissingSecrets)
        ));
    }

    #[tokio::test]
    async fn shutdown_reaches_every_subscriber() {
        let ctx =
            RelayerContext::new(config(), SledStore::temporary().unwrap())
                .unwrap();
        let mut a = ctx.shutdown_signal();
        let mut b = ctx.shutdown_signal();
        ctx.shutdown();
        a.recv().await;
        b.recv().await;
        assert!(a.is_shutdown() && b.is_shutdown());
    }
}
