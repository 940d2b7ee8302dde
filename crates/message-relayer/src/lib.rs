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

//! # Message Relayer
//!
//! Delivers the messages emitted by the messenger contract of one layer
//! to the messenger contract of the other layer. One relayer runs per
//! direction.
//!
//! Every message moves on its own; a message that fails or expires never
//! holds back another one.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use ethers_core::types::{Address, H256};
use rollup_relayer_context::Shutdown;
use rollup_relayer_store::{HistoryStoreKey, RollupStore};
use rollup_relayer_tx_sender::{
    ChainClient, Confirmation, RevertClassifier, TxSender, TxSigner,
};
use rollup_relayer_types::{
    Layer, MessageStatus, PendingTransaction, RelayedMessage, TxEntity,
    TxStatus,
};
use rollup_relayer_utils::metric::Metrics;
use rollup_relayer_utils::{probe, retry, Error, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

/// Calldata of the messenger contract calls.
pub mod calldata;

/// Relays the messages sent on `source` to its counterpart.
///
/// * `CS` reads the source chain.
/// * `CD` is the client of the destination chain, used by `sender`.
#[derive(TypedBuilder)]
pub struct MessageRelayer<CS, CD, S, W> {
    source: Layer,
    source_client: Arc<CS>,
    /// Sender on the destination chain.
    sender: Arc<TxSender<CD, S, W>>,
    store: Arc<S>,
    /// The messenger contract on the destination chain.
    messenger_address: Address,
    /// Blocks on top of a source block before its messages are picked up.
    #[builder(default = 1)]
    block_confirmations: u64,
    #[builder(default = 100)]
    max_blocks_per_step: u64,
    #[builder(default = 3)]
    max_revert_retries: u32,
    #[builder(default = Duration::from_secs(3))]
    check_interval: Duration,
    classifier: RevertClassifier,
    metrics: Arc<Mutex<Metrics>>,
}

impl<CS, CD, S, W> MessageRelayer<CS, CD, S, W>
where
    CS: ChainClient,
    CD: ChainClient,
    S: RollupStore,
    W: TxSigner,
{
    pub fn source(&self) -> Layer {
        self.source
    }

    fn entity(message: &RelayedMessage) -> TxEntity {
        TxEntity::RelayMessage(message.message_hash)
    }

    /// Reads the messages of confirmed source blocks past the stored
    /// cursor and stores the unseen ones as Pending.
    ///
    /// Returns how many new messages were stored.
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub async fn process_new_messages(&self) -> Result<usize> {
        let key = HistoryStoreKey::Messages { layer: self.source };
        let head = self.source_client.block_number().await?;
        let target = head.saturating_sub(self.block_confirmations);
        self.store.set_target_block_number(key, target)?;

        let step = self.max_blocks_per_step.max(1);
        let mut from = self.store.get_last_block_number_or_default(key)? + 1;
        let mut stored = 0;
        while from <= target {
            let to = target.min(from + step - 1);
            let sent = self.source_client.get_messages(from, to).await?;
            for message in sent {
                let message = RelayedMessage::new(self.source, message);
                let hash = message.message_hash;
                let index = message.message_index;
                match self.store.insert_message(message) {
                    Ok(true) => {
                        stored += 1;
                        tracing::event!(
                            target: probe::TARGET,
                            tracing::Level::DEBUG,
                            kind = %probe::Kind::Message,
                            source = %self.source,
                            message_hash = ?hash,
                            index,
                            status = %MessageStatus::Pending,
                        );
                    }
                    Ok(false) => {}
                    Err(e @ Error::DuplicateMessageIndex { .. }) => {
                        tracing::error!(
                            "Ignoring message {:?}: {}",
                            hash,
                            e
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
            self.store.set_last_block_number(key, to)?;
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::TRACE,
                kind = %probe::Kind::Sync,
                layer = %self.source,
                block = to,
                target,
            );
            from = to + 1;
        }
        Ok(stored)
    }

    /// Sends the relay transaction of every Pending message.
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub async fn submit_pending_messages(&self) -> Result<()> {
        let pending =
            self.store.messages_with_status(self.source, MessageStatus::Pending)?;
        for message in pending {
            let hash = message.message_hash;
            let entity = Self::entity(&message);
            let sent = match self.sender.pending_for(entity)? {
                Some(tx) => Ok(tx.tx_hash),
                None => {
                    self.sender
                        .submit(
                            entity,
                            self.messenger_address,
                            calldata::relay_message(&message),
                        )
                        .await
                }
            };
            match sent {
                Ok(tx_hash) => {
                    self.store.update_message(hash, |m| {
                        m.transition(MessageStatus::Submitted)?;
                        m.tx_hash = Some(tx_hash);
                        Ok(())
                    })?;
                    tracing::event!(
                        target: probe::TARGET,
                        tracing::Level::DEBUG,
                        kind = %probe::Kind::Message,
                        source = %self.source,
                        message_hash = ?hash,
                        status = %MessageStatus::Submitted,
                        ?tx_hash,
                    );
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!("Could not relay message {:?}: {}", hash, e);
                    let error = e.to_string();
                    self.store.update_message(hash, |m| {
                        m.last_error = Some(error.clone());
                        Ok(())
                    })?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Follows the relay transactions of Submitted messages.
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub async fn check_submitted_messages(&self) -> Result<()> {
        let submitted = self
            .store
            .messages_with_status(self.source, MessageStatus::Submitted)?;
        for message in submitted {
            match self.check_message(&message).await {
                Ok(()) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        "Could not check message {:?}: {}",
                        message.message_hash,
                        e
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn check_message(&self, message: &RelayedMessage) -> Result<()> {
        let hash = message.message_hash;
        let Some(pending) = self.sender.pending_for(Self::entity(message))? else {
            return self.recover_untracked(message).await;
        };

        // the message moves first, the tx is forgotten after.
        match self.sender.tracker().check(&pending).await? {
            Confirmation::Confirmed {
                tx_hash,
                block_number,
            } => {
                self.message_confirmed(hash, tx_hash, block_number).await?;
                self.sender.finish(pending.tx_hash)?;
            }
            Confirmation::Reverted { reason, .. } => {
                self.handle_revert(hash, &reason).await?;
                self.sender.finish(pending.tx_hash)?;
            }
            Confirmation::Waiting => {}
            Confirmation::TimedOut => self.bump(hash, &pending).await?,
        }
        Ok(())
    }

    /// A Submitted message whose tx the sender no longer tracks. The
    /// recorded tx hash is looked up on the destination chain before
    /// anything is sent again.
    async fn recover_untracked(&self, message: &RelayedMessage) -> Result<()> {
        let hash = message.message_hash;
        let status = match message.tx_hash {
            Some(tx_hash) => self.sender.query_status(tx_hash).await?,
            None => TxStatus::NotFound,
        };
        match (message.tx_hash, status) {
            (Some(tx_hash), TxStatus::Confirmed { block_number }) => {
                tracing::warn!(
                    "Untracked relay tx {:?} of message {:?} landed in block #{}",
                    tx_hash,
                    hash,
                    block_number
                );
                self.message_confirmed(hash, tx_hash, block_number).await
            }
            (_, TxStatus::Reverted { reason, .. }) => {
                self.handle_revert(hash, &reason).await
            }
            (Some(tx_hash), TxStatus::Pending) => {
                tracing::warn!(
                    "Untracked relay tx {:?} of message {:?} is still in the mempool",
                    tx_hash,
                    hash
                );
                Ok(())
            }
            _ => {
                tracing::warn!(
                    "Message {:?} is submitted without a tracked tx; relaying again",
                    hash
                );
                self.store.update_message(hash, |m| {
                    m.transition(MessageStatus::Pending)?;
                    m.tx_hash = None;
                    Ok(())
                })?;
                Ok(())
            }
        }
    }

    async fn message_confirmed(
        &self,
        hash: H256,
        tx_hash: H256,
        block_number: u64,
    ) -> Result<()> {
        self.store.update_message(hash, |m| {
            m.transition(MessageStatus::Confirmed)?;
            m.tx_hash = Some(tx_hash);
            Ok(())
        })?;
        self.metrics.lock().await.messages_confirmed.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Message,
            source = %self.source,
            message_hash = ?hash,
            status = %MessageStatus::Confirmed,
            ?tx_hash,
            block_number,
        );
        tracing::info!(
            "Message {:?} relayed to {} in block #{}",
            hash,
            self.source.counterpart(),
            block_number
        );
        Ok(())
    }

    async fn bump(&self, hash: H256, pending: &PendingTransaction) -> Result<()> {
        match self.sender.bump(pending.tx_hash).await {
            Ok(new_hash) => {
                self.store.update_message(hash, |m| {
                    m.tx_hash = Some(new_hash);
                    Ok(())
                })?;
            }
            Err(Error::StuckTransaction { attempts, .. }) => {
                let reason = format!(
                    "relay tx {:?} stuck after {} fee bumps",
                    pending.tx_hash, attempts
                );
                self.store.update_message(hash, |m| {
                    m.transition(MessageStatus::Expired)?;
                    m.last_error = Some(reason.clone());
                    Ok(())
                })?;
                self.metrics.lock().await.messages_expired.inc();
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Message,
                    source = %self.source,
                    message_hash = ?hash,
                    status = %MessageStatus::Expired,
                    reason = %reason,
                );
                tracing::error!("Message {:?} expired: {}", hash, reason);
                self.sender.finish(pending.tx_hash)?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn handle_revert(&self, hash: H256, reason: &str) -> Result<()> {
        let revert = self.classifier.classify(reason);
        let permanent = matches!(revert, Error::Revert { permanent: true, .. });
        let max_retries = self.max_revert_retries;
        let message = self.store.update_message(hash, |m| {
            m.last_error = Some(revert.to_string());
            m.tx_hash = None;
            if permanent || m.revert_retries >= max_retries {
                m.transition(MessageStatus::Failed)
            } else {
                m.revert_retries += 1;
                m.transition(MessageStatus::Pending)
            }
        })?;
        if message.status == MessageStatus::Failed {
            self.metrics.lock().await.messages_failed.inc();
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Message,
                source = %self.source,
                message_hash = ?hash,
                status = %MessageStatus::Failed,
                reason,
                permanent,
            );
            tracing::error!("Message {:?} failed: {}", hash, reason);
        } else {
            tracing::warn!(
                "Relay of message {:?} reverted ({}), retry {}/{}",
                hash,
                reason,
                message.revert_retries,
                max_retries
            );
        }
        Ok(())
    }

    /// Checks the Submitted messages, then sends the Pending ones.
    ///
    /// Both steps run even when the first one fails; the first error is
    /// returned.
    pub async fn drive(&self) -> Result<()> {
        let checked = self.check_submitted_messages().await;
        if let Err(e) = &checked {
            tracing::warn!("{} message check failed: {}", self.source, e);
        }
        let submitted = self.submit_pending_messages().await;
        checked.and(submitted)
    }

    /// One pass: pick up new messages, then [`MessageRelayer::drive`].
    ///
    /// An unreachable source chain does not hold back the destination.
    pub async fn tick(&self) -> Result<()> {
        let picked = self.process_new_messages().await;
        let driven = self.drive().await;
        picked.and(driven)
    }

    /// Runs the relayer every `check-interval` until `shutdown` fires.
    ///
    /// Picking up messages and driving relay txs back off independently.
    pub async fn run(&self, mut shutdown: Shutdown) -> Result<()> {
        let max_wait = Duration::from_secs(60);
        let mut sync_backoff =
            retry::unbounded_exponential(self.check_interval, max_wait);
        let mut drive_backoff =
            retry::unbounded_exponential(self.check_interval, max_wait);
        let mut next_sync = Instant::now();
        let mut next_drive = Instant::now();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            relayer = "message",
            source = %self.source,
            started = true,
        );
        loop {
            let now = Instant::now();
            if now >= next_sync {
                let wait = match self.process_new_messages().await {
                    Ok(_) => {
                        sync_backoff.reset();
                        self.check_interval
                    }
                    Err(e) => self.backed_off("sync", &mut sync_backoff, e).await,
                };
                next_sync = Instant::now() + wait;
            }
            if now >= next_drive {
                let wait = match self.drive().await {
                    Ok(()) => {
                        drive_backoff.reset();
                        self.check_interval
                    }
                    Err(e) => {
                        self.backed_off("drive", &mut drive_backoff, e).await
                    }
                };
                next_drive = Instant::now() + wait;
            }
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep_until(next_sync.min(next_drive)) => {}
            }
        }
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            relayer = "message",
            source = %self.source,
            shutdown = true,
        );
        Ok(())
    }

    async fn backed_off(
        &self,
        step: &str,
        backoff: &mut impl Backoff,
        e: Error,
    ) -> Duration {
        let wait = backoff.next_backoff().unwrap_or(self.check_interval);
        self.metrics.lock().await.relayer_back_off.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            relayer = "message",
            source = %self.source,
            step,
            error = %e,
            wait = ?wait,
        );
        tracing::error!(
            "{} message relayer {} failed: {}, retrying in {:?}",
            self.source,
            step,
            e,
            wait
        );
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::U256;
    use ethers_signers::LocalWallet;
    use rollup_relayer_config::SenderConfig;
    use rollup_relayer_store::{HistoryStore, InMemoryStore, MessageStore};
    use rollup_relayer_tx_sender::mock::{
        calldata_contains, MockChainClient, MockOutcome,
    };
    use rollup_relayer_types::SentMessage;

    type Relayer =
        MessageRelayer<MockChainClient, MockChainClient, InMemoryStore, LocalWallet>;

    const MESSENGER: Address = Address::repeat_byte(0xee);

    struct Harness {
        relayer: Relayer,
        source: Arc<MockChainClient>,
        destination: Arc<MockChainClient>,
        store: Arc<InMemoryStore>,
        sender: Arc<TxSender<MockChainClient, InMemoryStore, LocalWallet>>,
    }

    fn harness(confirmations: u64, sender_config: SenderConfig) -> Harness {
        let source = Arc::new(MockChainClient::new(1));
        let destination = Arc::new(MockChainClient::new(2));
        let store = Arc::new(InMemoryStore::default());
        let metrics = Arc::new(Mutex::new(Metrics::new().unwrap()));
        let wallet = Arc::new(LocalWallet::from_bytes(&[0x22; 32]).unwrap());
        let sender = Arc::new(TxSender::new(
            Layer::L2,
            destination.clone(),
            wallet,
            store.clone(),
            sender_config,
            1,
            metrics.clone(),
        ));
        let relayer = MessageRelayer::builder()
            .source(Layer::L1)
            .source_client(source.clone())
            .sender(sender.clone())
            .store(store.clone())
            .messenger_address(MESSENGER)
            .block_confirmations(confirmations)
            .max_blocks_per_step(2)
            .max_revert_retries(1)
            .classifier(RevertClassifier::new(
                rollup_relayer_config::defaults::permanent_revert_reasons(),
            ))
            .metrics(metrics)
            .build();
        Harness {
            relayer,
            source,
            destination,
            store,
            sender,
        }
    }

    fn message(index: u64, block_number: u64, payload: &[u8]) -> SentMessage {
        SentMessage {
            sender: Address::repeat_byte(0x01),
            target: Address::repeat_byte(0x02),
            value: U256::from(index),
            message_index: index,
            payload: payload.to_vec().into(),
            block_number,
        }
    }

    fn status(store: &InMemoryStore, sent: &SentMessage) -> MessageStatus {
        store
            .get_message(sent.message_hash(Layer::L1))
            .unwrap()
            .unwrap()
            .status
    }

    #[tokio::test]
    async fn picks_up_confirmed_messages_once() {
        let h = harness(1, SenderConfig::default());
        for (index, block) in [(0, 1), (1, 2), (2, 3)] {
            h.source.push_message(message(index, block, b"hi"));
        }

        assert_eq!(h.relayer.process_new_messages().await.unwrap(), 2);
        assert_eq!(h.relayer.process_new_messages().await.unwrap(), 0);
        let key = HistoryStoreKey::Messages { layer: Layer::L1 };
        assert_eq!(h.store.get_last_block_number_or_default(key).unwrap(), 2);

        h.source.advance_blocks(1);
        assert_eq!(h.relayer.process_new_messages().await.unwrap(), 1);
        let pending = h
            .store
            .messages_with_status(Layer::L1, MessageStatus::Pending)
            .unwrap();
        let indices: Vec<_> = pending.iter().map(|m| m.message_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(pending.iter().all(|m| m.destination() == Layer::L2));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn conflicting_index_is_ignored() {
        let h = harness(0, SenderConfig::default());
        let first = message(0, 1, b"first");
        h.source.push_message(first.clone());
        h.source.push_message(message(0, 1, b"second"));

        assert_eq!(h.relayer.process_new_messages().await.unwrap(), 1);
        assert_eq!(status(&h.store, &first), MessageStatus::Pending);
        assert!(logs_contain("Ignoring message"));
    }

    #[tokio::test]
    async fn relays_and_confirms() {
        let h = harness(0, SenderConfig::default());
        let sent = [message(0, 1, b"a"), message(1, 1, b"b")];
        for m in &sent {
            h.source.push_message(m.clone());
        }

        h.relayer.tick().await.unwrap();
        assert!(sent
            .iter()
            .all(|m| status(&h.store, m) == MessageStatus::Submitted));
        let txs = h
            .destination
            .submitted_with_selector(calldata::relay_message_selector());
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().all(|tx| tx.to == MESSENGER));

        h.relayer.tick().await.unwrap();
        assert!(sent
            .iter()
            .all(|m| status(&h.store, m) == MessageStatus::Confirmed));
        assert_eq!(
            h.relayer.metrics.lock().await.messages_confirmed.get() as u64,
            2
        );
    }

    #[tokio::test]
    async fn expired_message_does_not_hold_back_others() {
        let h = harness(
            0,
            SenderConfig {
                tx_timeout: 0,
                max_bump_attempts: 2,
                ..Default::default()
            },
        );
        h.destination
            .on(calldata_contains(b"stuck".to_vec()), MockOutcome::NeverMine);
        let stuck = message(0, 1, b"stuck");
        let fine = message(1, 1, b"fine");
        h.source.push_message(stuck.clone());
        h.source.push_message(fine.clone());

        for _ in 0..4 {
            h.relayer.tick().await.unwrap();
        }
        assert_eq!(status(&h.store, &fine), MessageStatus::Confirmed);
        let expired = h.store.get_message(stuck.message_hash(Layer::L1)).unwrap().unwrap();
        assert_eq!(expired.status, MessageStatus::Expired);
        assert!(expired.last_error.unwrap().contains("stuck after 2"));

        let stuck_txs: Vec<_> = h
            .destination
            .submitted()
            .into_iter()
            .filter(|tx| tx.data.windows(5).any(|w| w == b"stuck"))
            .collect();
        assert_eq!(stuck_txs.len(), 3);
        assert!(stuck_txs.iter().all(|tx| tx.nonce == stuck_txs[0].nonce));
        let metrics = h.relayer.metrics.lock().await;
        assert_eq!(metrics.messages_expired.get() as u64, 1);
        assert_eq!(metrics.transactions_bumped.get() as u64, 2);
    }

    #[tokio::test]
    async fn reverts_fail_or_retry() {
        let h = harness(0, SenderConfig::default());
        h.destination.on(
            calldata_contains(b"dup".to_vec()),
            MockOutcome::Revert("Message already relayed".into()),
        );
        h.destination.on_times(
            calldata_contains(b"gas".to_vec()),
            MockOutcome::Revert("out of gas".into()),
            1,
        );
        let dup = message(0, 1, b"dup");
        let gas = message(1, 1, b"gas");
        h.source.push_message(dup.clone());
        h.source.push_message(gas.clone());

        h.relayer.tick().await.unwrap();
        h.relayer.tick().await.unwrap();
        let failed = h.store.get_message(dup.message_hash(Layer::L1)).unwrap().unwrap();
        assert_eq!(failed.status, MessageStatus::Failed);
        assert_eq!(
            failed.last_error.as_deref(),
            Some("Reverted (permanent: true): Message already relayed")
        );
        let retried = h.store.get_message(gas.message_hash(Layer::L1)).unwrap().unwrap();
        assert_eq!(retried.status, MessageStatus::Submitted);
        assert_eq!(retried.revert_retries, 1);

        h.relayer.tick().await.unwrap();
        assert_eq!(status(&h.store, &gas), MessageStatus::Confirmed);
        assert_eq!(status(&h.store, &dup), MessageStatus::Failed);
    }

    #[tokio::test]
    async fn rejected_relay_stays_pending() {
        let h = harness(
            0,
            SenderConfig {
                max_submit_attempts: 1,
                ..Default::default()
            },
        );
        let first = message(0, 1, b"a");
        let second = message(1, 1, b"b");
        h.source.push_message(first.clone());
        h.source.push_message(second.clone());
        h.destination.reject_next_submissions(1, "txpool is full");

        h.relayer.tick().await.unwrap();
        let rejected = h.store.get_message(first.message_hash(Layer::L1)).unwrap().unwrap();
        assert_eq!(rejected.status, MessageStatus::Pending);
        assert!(rejected.last_error.unwrap().contains("txpool is full"));
        assert_eq!(status(&h.store, &second), MessageStatus::Submitted);

        h.relayer.tick().await.unwrap();
        assert_eq!(status(&h.store, &first), MessageStatus::Submitted);
    }

    #[tokio::test]
    async fn landed_relay_is_not_sent_again_after_losing_its_tx() {
        let h = harness(0, SenderConfig::default());
        let sent = message(0, 1, b"a");
        h.source.push_message(sent.clone());
        h.relayer.tick().await.unwrap();
        let hash = sent.message_hash(Layer::L1);
        let tx_hash = h.store.get_message(hash).unwrap().unwrap().tx_hash.unwrap();
        h.sender.finish(tx_hash).unwrap();

        h.relayer.tick().await.unwrap();
        h.relayer.tick().await.unwrap();
        let relayed = h.store.get_message(hash).unwrap().unwrap();
        assert_eq!(relayed.status, MessageStatus::Confirmed);
        assert_eq!(relayed.tx_hash, Some(tx_hash));
        assert_eq!(
            h.destination
                .submitted_with_selector(calldata::relay_message_selector())
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn dropped_relay_is_sent_again() {
        let h = harness(0, SenderConfig::default());
        h.destination.set_default_outcome(MockOutcome::NeverMine);
        let sent = message(0, 1, b"a");
        h.source.push_message(sent.clone());
        h.relayer.tick().await.unwrap();
        let hash = sent.message_hash(Layer::L1);
        let dropped = h.store.get_message(hash).unwrap().unwrap().tx_hash.unwrap();
        h.destination.set_status(dropped, TxStatus::NotFound);
        h.sender.finish(dropped).unwrap();

        h.relayer.tick().await.unwrap();
        let relayed = h.store.get_message(hash).unwrap().unwrap();
        assert_eq!(relayed.status, MessageStatus::Submitted);
        assert_ne!(relayed.tx_hash, Some(dropped));
        assert_eq!(h.destination.submitted().len(), 2);
    }

    #[tokio::test]
    async fn destination_keeps_going_while_source_is_down() {
        let h = harness(0, SenderConfig::default());
        let sent = message(0, 1, b"a");
        h.source.push_message(sent.clone());
        h.relayer.tick().await.unwrap();
        assert_eq!(status(&h.store, &sent), MessageStatus::Submitted);

        h.source.set_offline(true);
        assert!(matches!(
            h.relayer.tick().await,
            Err(Error::TransientChain(_))
        ));
        assert_eq!(status(&h.store, &sent), MessageStatus::Confirmed);
    }
}
