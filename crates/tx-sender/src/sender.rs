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

use backoff::backoff::Backoff;
use ethers_core::types::{Address, Bytes, H256, U256};
use rollup_relayer_config::SenderConfig;
use rollup_relayer_store::PendingTxStore;
use rollup_relayer_types::{
    unix_millis, FeeParams, Layer, PendingTransaction, TxEntity, TxStatus,
};
use rollup_relayer_utils::metric::Metrics;
use rollup_relayer_utils::retry::ConstantWithMaxRetryCount;
use rollup_relayer_utils::{probe, Error, Result};
use tokio::sync::Mutex;

use crate::client::{ChainClient, TxSigner, UnsignedTransaction};
use crate::tracker::ConfirmationTracker;

/// Sends the transactions of one signing identity on one chain.
///
/// Nonce allocation and fee bumps are serialized behind one lock, status
/// queries are not. Every broadcast transaction is persisted in the
/// [`PendingTxStore`] until [`TxSender::finish`] is called for it.
pub struct TxSender<C, S, W> {
    layer: Layer,
    client: Arc<C>,
    signer: Arc<W>,
    store: Arc<S>,
    config: SenderConfig,
    metrics: Arc<Mutex<Metrics>>,
    /// `None` until the chain was asked once.
    next_nonce: Mutex<Option<u64>>,
    tracker: ConfirmationTracker<C, S>,
}

impl<C, S, W> TxSender<C, S, W>
where
    C: ChainClient,
    S: PendingTxStore,
    W: TxSigner,
{
    /// Creates a new TxSender.
    ///
    /// `block_confirmations` is handed to the [`ConfirmationTracker`]
    /// of this sender.
    pub fn new(
        layer: Layer,
        client: Arc<C>,
        signer: Arc<W>,
        store: Arc<S>,
        config: SenderConfig,
        block_confirmations: u64,
        metrics: Arc<Mutex<Metrics>>,
    ) -> Self {
        let tracker = ConfirmationTracker::new(
            layer,
            client.clone(),
            store.clone(),
            block_confirmations,
            config.tx_timeout(),
        );
        Self {
            layer,
            client,
            signer,
            store,
            config,
            metrics,
            next_nonce: Mutex::new(None),
            tracker,
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// The account this sender signs with.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ConfirmationTracker<C, S> {
        &self.tracker
    }

    fn fee_floor(&self) -> FeeParams {
        FeeParams {
            max_fee_per_gas: U256::from(self.config.min_fee_per_gas),
            max_priority_fee_per_gas: U256::from(
                self.config.min_priority_fee_per_gas,
            ),
        }
    }

    /// Signs and broadcasts a transaction acting on `entity`, then starts
    /// tracking it.
    ///
    /// A rejected broadcast returns [`Error::Submission`] and leaves the
    /// nonce free for the next call.
    #[tracing::instrument(skip(self, data), fields(layer = %self.layer))]
    pub async fn send(
        &self,
        entity: TxEntity,
        to: Address,
        data: Bytes,
    ) -> Result<H256> {
        let mut next_nonce = self.next_nonce.lock().await;
        let nonce = match *next_nonce {
            Some(nonce) if !self.store.pending_txs(self.layer)?.is_empty() => {
                nonce
            }
            _ => self.client.get_nonce(self.signer.address()).await?,
        };
        let fee = self.client.suggested_fee().await?.at_least(&self.fee_floor());
        let tx = UnsignedTransaction {
            chain_id: self.client.chain_id(),
            nonce,
            to,
            value: U256::zero(),
            data,
            gas_limit: self.config.gas_limit,
            fee,
        };
        let signed = self.signer.sign(&tx)?;
        let tx_hash = match self.client.submit_transaction(&signed).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::TxSender,
                    layer = %self.layer,
                    %entity,
                    nonce,
                    errored = true,
                    error = %e,
                );
                return Err(e);
            }
        };
        // the nonce is spent on chain, even if persisting fails below.
        *next_nonce = Some(nonce + 1);
        self.store.insert_pending_tx(PendingTransaction {
            tx_hash,
            layer: self.layer,
            nonce,
            submitted_at: unix_millis(),
            fee,
            entity,
            attempts: 0,
            replaced: Vec::new(),
            to,
            data: tx.data,
            gas_limit: tx.gas_limit,
            observed_block: None,
        })?;
        self.metrics.lock().await.total_transaction_made.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSender,
            layer = %self.layer,
            %entity,
            nonce,
            ?tx_hash,
            submitted = true,
        );
        tracing::info!("Tx {:?} for {} is submitted and pending!", tx_hash, entity);
        Ok(tx_hash)
    }

    /// [`TxSender::send`], retried under `policy` while the node rejects
    /// the transaction or cannot be reached.
    pub async fn send_with_retry<B>(
        &self,
        entity: TxEntity,
        to: Address,
        data: Bytes,
        policy: B,
    ) -> Result<H256>
    where
        B: Backoff,
    {
        let task = || async {
            self.send(entity, to, data.clone()).await.map_err(|e| {
                if e.is_transient() {
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Retry,
                        layer = %self.layer,
                        %entity,
                        error = %e,
                    );
                }
                e.into_backoff()
            })
        };
        backoff::future::retry(policy, task).await
    }

    /// [`TxSender::send_with_retry`] with the configured retry policy.
    pub async fn submit(
        &self,
        entity: TxEntity,
        to: Address,
        data: Bytes,
    ) -> Result<H256> {
        let policy = ConstantWithMaxRetryCount::new(
            self.config.submit_retry_interval(),
            self.config.max_submit_attempts.saturating_sub(1),
        );
        self.send_with_retry(entity, to, data, policy).await
    }

    /// Replaces the pending transaction `tx_hash` by the same one with
    /// higher fees, returning the hash of the replacement.
    ///
    /// Fails with [`Error::StuckTransaction`] once `max-bump-attempts`
    /// bumps were made, or when the new fee would pass `fee-bump-ceiling`.
    #[tracing::instrument(skip(self), fields(layer = %self.layer))]
    pub async fn bump(&self, tx_hash: H256) -> Result<H256> {
        // bumps reuse a nonce, keep them away from new sends.
        let _nonce_guard = self.next_nonce.lock().await;
        let pending = self
            .store
            .get_pending_tx(self.layer, tx_hash)?
            .ok_or(Error::PendingTxNotFound(tx_hash.0))?;
        let stuck = || Error::StuckTransaction {
            tx_hash: tx_hash.0,
            attempts: pending.attempts,
        };
        if pending.attempts >= self.config.max_bump_attempts {
            return Err(stuck());
        }
        let fee = pending.fee.bumped(self.config.fee_bump_percent);
        if fee.max_fee_per_gas > U256::from(self.config.fee_bump_ceiling) {
            tracing::warn!(
                ?tx_hash,
                max_fee_per_gas = %fee.max_fee_per_gas,
                ceiling = self.config.fee_bump_ceiling,
                "Fee bump would pass the ceiling",
            );
            return Err(stuck());
        }
        let tx = UnsignedTransaction {
            chain_id: self.client.chain_id(),
            nonce: pending.nonce,
            to: pending.to,
            value: U256::zero(),
            data: pending.data.clone(),
            gas_limit: pending.gas_limit,
            fee,
        };
        let signed = self.signer.sign(&tx)?;
        let new_hash = self.client.submit_transaction(&signed).await?;

        let mut replaced = pending.replaced.clone();
        replaced.push(tx_hash);
        let replacement = PendingTransaction {
            tx_hash: new_hash,
            submitted_at: unix_millis(),
            fee,
            attempts: pending.attempts + 1,
            replaced,
            observed_block: None,
            ..pending
        };
        let attempts = replacement.attempts;
        self.store
            .replace_pending_tx(self.layer, tx_hash, replacement)?;
        self.metrics.lock().await.transactions_bumped.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSender,
            layer = %self.layer,
            old_tx_hash = ?tx_hash,
            new_tx_hash = ?new_hash,
            attempts,
            bumped = true,
        );
        Ok(new_hash)
    }

    /// One status read for `tx_hash`.
    pub async fn query_status(&self, tx_hash: H256) -> Result<TxStatus> {
        self.client.get_transaction_status(tx_hash).await
    }

    /// Stops tracking a settled transaction.
    pub fn finish(&self, tx_hash: H256) -> Result<Option<PendingTransaction>> {
        self.store.remove_pending_tx(self.layer, tx_hash)
    }

    /// The pending transaction with `tx_hash`, if still tracked.
    pub fn pending_tx(&self, tx_hash: H256) -> Result<Option<PendingTransaction>> {
        self.store.get_pending_tx(self.layer, tx_hash)
    }

    /// The outstanding transaction acting on `entity`, used to pick up
    /// work after a restart instead of sending twice.
    pub fn pending_for(
        &self,
        entity: TxEntity,
    ) -> Result<Option<PendingTransaction>> {
        self.store.pending_tx_for(self.layer, entity)
    }

    /// How long a transaction may stay unmined before it is bumped.
    pub fn tx_timeout(&self) -> Duration {
        self.config.tx_timeout()
    }
}
