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

use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::H256;
use rollup_relayer_store::PendingTxStore;
use rollup_relayer_types::{unix_millis, Layer, PendingTransaction, TxStatus};
use rollup_relayer_utils::{probe, Result};

use crate::client::ChainClient;

/// Outcome of one confirmation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Mined successfully, with enough blocks on top.
    Confirmed { tx_hash: H256, block_number: u64 },
    /// Mined and reverted, with enough blocks on top.
    Reverted {
        tx_hash: H256,
        block_number: u64,
        reason: String,
    },
    /// Not settled yet.
    Waiting,
    /// Unmined for longer than the transaction timeout.
    TimedOut,
}

/// Polls the chain for the outcome of pending transactions.
pub struct ConfirmationTracker<C, S> {
    layer: Layer,
    client: Arc<C>,
    store: Arc<S>,
    block_confirmations: u64,
    tx_timeout: Duration,
}

impl<C, S> ConfirmationTracker<C, S>
where
    C: ChainClient,
    S: PendingTxStore,
{
    pub fn new(
        layer: Layer,
        client: Arc<C>,
        store: Arc<S>,
        block_confirmations: u64,
        tx_timeout: Duration,
    ) -> Self {
        Self {
            layer,
            client,
            store,
            block_confirmations,
            tx_timeout,
        }
    }

    /// Checks where `pending` stands.
    ///
    /// The current hash and every hash it replaced are queried together,
    /// since any of them may be the one that lands.
    #[tracing::instrument(
        skip_all,
        fields(layer = %self.layer, tx_hash = ?pending.tx_hash, entity = %pending.entity)
    )]
    pub async fn check(
        &self,
        pending: &PendingTransaction,
    ) -> Result<Confirmation> {
        let hashes: Vec<H256> = pending.all_hashes().collect();
        let statuses = futures::future::join_all(
            hashes
                .iter()
                .map(|hash| self.client.get_transaction_status(*hash)),
        )
        .await;

        let mut mined = None;
        for (hash, status) in hashes.iter().zip(statuses) {
            let status = status?;
            if status.mined_at().is_some() {
                mined = Some((*hash, status));
                break;
            }
        }

        let Some((tx_hash, status)) = mined else {
            if let Some(block) = pending.observed_block {
                tracing::warn!(
                    block,
                    "Tx was mined and is gone now, reorged out; tracking it again",
                );
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::TxSender,
                    layer = %self.layer,
                    tx_hash = ?pending.tx_hash,
                    reorged = true,
                );
                self.store.update_pending_tx(
                    self.layer,
                    pending.tx_hash,
                    |tx| {
                        tx.observed_block = None;
                        Ok(())
                    },
                )?;
            }
            let waited = unix_millis().saturating_sub(pending.submitted_at);
            if Duration::from_millis(waited) >= self.tx_timeout {
                return Ok(Confirmation::TimedOut);
            }
            return Ok(Confirmation::Waiting);
        };

        let block_number = status.mined_at().unwrap_or_default();
        let head = self.client.block_number().await?;
        let confirmations = (head + 1).saturating_sub(block_number);
        if confirmations < self.block_confirmations {
            if pending.observed_block != Some(block_number) {
                self.store.update_pending_tx(
                    self.layer,
                    pending.tx_hash,
                    |tx| {
                        tx.observed_block = Some(block_number);
                        Ok(())
                    },
                )?;
            }
            tracing::trace!(
                block_number,
                confirmations,
                "Tx mined, waiting for more confirmations"
            );
            return Ok(Confirmation::Waiting);
        }

        match status {
            TxStatus::Reverted { reason, .. } => Ok(Confirmation::Reverted {
                tx_hash,
                block_number,
                reason,
            }),
            _ => Ok(Confirmation::Confirmed {
                tx_hash,
                block_number,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChainClient, MockOutcome};
    use ethers_core::types::Address;
    use rollup_relayer_store::InMemoryStore;
    use rollup_relayer_types::{FeeParams, TxEntity};

    fn pending(hash: u64) -> PendingTransaction {
        PendingTransaction {
            tx_hash: H256::from_low_u64_be(hash),
            layer: Layer::L1,
            nonce: 0,
            submitted_at: unix_millis(),
            fee: FeeParams::default(),
            entity: TxEntity::CommitBatch(0),
            attempts: 0,
            replaced: vec![],
            to: Address::zero(),
            data: Default::default(),
            gas_limit: 21_000,
            observed_block: None,
        }
    }

    fn tracker(
        client: Arc<MockChainClient>,
        store: Arc<InMemoryStore>,
        confirmations: u64,
    ) -> ConfirmationTracker<MockChainClient, InMemoryStore> {
        ConfirmationTracker::new(
            Layer::L1,
            client,
            store,
            confirmations,
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn waits_for_block_confirmations() {
        let client = Arc::new(MockChainClient::new(1));
        let store = Arc::new(InMemoryStore::default());
        let tx = pending(1);
        store.insert_pending_tx(tx.clone()).unwrap();
        client.set_status(tx.tx_hash, TxStatus::Confirmed { block_number: 10 });
        client.set_head(10);

        let tracker = tracker(client.clone(), store.clone(), 3);
        assert_eq!(tracker.check(&tx).await.unwrap(), Confirmation::Waiting);
        let tx = store.get_pending_tx(Layer::L1, tx.tx_hash).unwrap().unwrap();
        assert_eq!(tx.observed_block, Some(10));

        client.set_head(12);
        assert_eq!(
            tracker.check(&tx).await.unwrap(),
            Confirmation::Confirmed {
                tx_hash: tx.tx_hash,
                block_number: 10
            }
        );
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn reorged_out_tx_is_tracked_again() {
        let client = Arc::new(MockChainClient::new(1));
        let store = Arc::new(InMemoryStore::default());
        let mut tx = pending(1);
        tx.observed_block = Some(10);
        store.insert_pending_tx(tx.clone()).unwrap();
        client.set_status(tx.tx_hash, TxStatus::Pending);

        let tracker = tracker(client, store.clone(), 3);
        assert_eq!(tracker.check(&tx).await.unwrap(), Confirmation::Waiting);
        let tx = store.get_pending_tx(Layer::L1, tx.tx_hash).unwrap().unwrap();
        assert_eq!(tx.observed_block, None);
        assert!(logs_contain("reorged out"));
    }

    #[tokio::test]
    async fn a_replaced_hash_may_be_the_one_that_lands() {
        let client = Arc::new(MockChainClient::new(1));
        let store = Arc::new(InMemoryStore::default());
        let mut tx = pending(2);
        tx.replaced = vec![H256::from_low_u64_be(1)];
        client.set_status(
            H256::from_low_u64_be(1),
            TxStatus::Reverted {
                block_number: 4,
                reason: "duplicate index".into(),
            },
        );
        client.set_head(4);

        let tracker = tracker(client, store, 1);
        assert_eq!(
            tracker.check(&tx).await.unwrap(),
            Confirmation::Reverted {
                tx_hash: H256::from_low_u64_be(1),
                block_number: 4,
                reason: "duplicate index".into(),
            }
        );
    }

    #[tokio::test]
    async fn unmined_tx_times_out() {
        let client = Arc::new(MockChainClient::new(1));
        client.set_default_outcome(MockOutcome::NeverMine);
        let store = Arc::new(InMemoryStore::default());
        let mut tx = pending(1);
        tx.submitted_at = unix_millis() - 120_000;

        let tracker = tracker(client, store, 1);
        assert_eq!(tracker.check(&tx).await.unwrap(), Confirmation::TimedOut);
    }
}
