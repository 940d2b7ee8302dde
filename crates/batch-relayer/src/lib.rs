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

//! # Batch Relayer
//!
//! Turns source chain (L2) blocks into batches and drives every batch
//! through its lifecycle on the destination chain (L1):
//!
//! `Pending -> Committing -> Committed -> Finalizing -> Finalized`
//!
//! with `Skipped` reachable from every non-terminal state. A skipped batch
//! keeps its index, so the batches after it are not held back.
//!
//! All state lives in the store; a restarted relayer picks up where the
//! previous one stopped, adopting the transactions it left in flight.

use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use ethers_core::types::{Address, H256};
use rollup_relayer_config::BatchConfig;
use rollup_relayer_context::Shutdown;
use rollup_relayer_store::{HistoryStoreKey, RollupStore};
use rollup_relayer_tx_sender::{
    ChainClient, Confirmation, RevertClassifier, TxSender, TxSigner,
};
use rollup_relayer_types::{
    batch, build_batch, unix_millis, BatchRecord, BatchStatus, BlockTrace,
    Layer, ParentBatchRef, PendingTransaction, TxEntity, TxStatus,
};
use rollup_relayer_utils::metric::Metrics;
use rollup_relayer_utils::{probe, retry, Error, Result};
use tokio::sync::Mutex;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

/// Calldata of the rollup contract calls.
pub mod calldata;

/// The two transactions a batch goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Commit,
    Finalize,
}

impl Stage {
    fn entity(self, index: u64) -> TxEntity {
        match self {
            Stage::Commit => TxEntity::CommitBatch(index),
            Stage::Finalize => TxEntity::FinalizeBatch(index),
        }
    }

    /// Where the batch goes once the stage transaction lands.
    fn done(self) -> BatchStatus {
        match self {
            Stage::Commit => BatchStatus::Committed,
            Stage::Finalize => BatchStatus::Finalized,
        }
    }

    /// Where the batch goes back to for another try.
    fn retry(self) -> BatchStatus {
        match self {
            Stage::Commit => BatchStatus::Pending,
            Stage::Finalize => BatchStatus::Committed,
        }
    }

    fn set_tx(self, record: &mut BatchRecord, tx_hash: Option<H256>) {
        match self {
            Stage::Commit => record.commit_tx = tx_hash,
            Stage::Finalize => record.finalize_tx = tx_hash,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Commit => f.write_str("commit"),
            Stage::Finalize => f.write_str("finalize"),
        }
    }
}

/// Relays L2 batches to the rollup contract on L1.
///
/// * `C1` talks to L1, where the batches are committed.
/// * `C2` is the L2 trace source.
#[derive(TypedBuilder)]
pub struct BatchRelayer<C1, C2, S, W> {
    /// Sender of the rollup contract calls.
    sender: Arc<TxSender<C1, S, W>>,
    /// Source of the block traces.
    trace_source: Arc<C2>,
    store: Arc<S>,
    config: BatchConfig,
    /// The rollup contract on L1.
    rollup_address: Address,
    /// Blocks on top of an L2 block before it is batched.
    #[builder(default)]
    trace_confirmations: u64,
    /// Most traces fetched in one step.
    #[builder(default = 100)]
    max_blocks_per_step: u64,
    classifier: RevertClassifier,
    metrics: Arc<Mutex<Metrics>>,
}

impl<C1, C2, S, W> BatchRelayer<C1, C2, S, W>
where
    C1: ChainClient,
    C2: ChainClient,
    S: RollupStore,
    W: TxSigner,
{
    /// Pulls newly confirmed L2 traces and seals batches out of them.
    ///
    /// Traces that no longer chain onto the stored ones (an L2 reorg) are
    /// dropped back to the fork point and fetched again on the next call.
    /// Returns the batches built during this call.
    #[tracing::instrument(skip(self))]
    pub async fn process_saved_events(&self) -> Result<Vec<BatchRecord>> {
        let key = HistoryStoreKey::BlockTraces { layer: Layer::L2 };
        let head = self.trace_source.block_number().await?;
        let target = head.saturating_sub(self.trace_confirmations);
        self.store.set_target_block_number(key, target)?;

        let known = self.newest_known_block()?;
        let mut last = self.store.get_last_block_number_or_default(key)?;
        if let Some(known) = known.as_ref().filter(|k| k.number != last) {
            tracing::warn!(
                "Trace cursor at #{} but the newest stored block is #{}; rewinding",
                last,
                known.number
            );
            self.store.set_last_block_number(key, known.number)?;
            last = known.number;
        }

        let to = target.min(last.saturating_add(self.max_blocks_per_step));
        let mut traces: Vec<BlockTrace> = Vec::new();
        for number in last + 1..=to {
            let Some(trace) = self.trace_source.get_block_trace(number).await?
            else {
                break;
            };
            let expected = traces.last().or(known.as_ref()).map(|p| p.hash);
            if expected.map_or(false, |hash| hash != trace.parent_hash) {
                if traces.is_empty() {
                    return self.rewind_to_fork(key).await.map(|_| Vec::new());
                }
                // the chain moved under us, keep what still chains.
                break;
            }
            traces.push(trace);
        }
        if let Some(newest) = traces.last().map(|t| t.number) {
            self.store.insert_block_traces(&traces)?;
            self.store.set_last_block_number(key, newest)?;
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::TRACE,
                kind = %probe::Kind::Sync,
                layer = %Layer::L2,
                block = newest,
                target,
                fetched = traces.len(),
            );
        }

        let mut built = Vec::new();
        while let Some(record) = self.seal_next_batch()? {
            built.push(record);
        }
        Ok(built)
    }

    /// The newest block the relayer holds: the last unbatched trace, or
    /// else the last block of the latest batch.
    fn newest_known_block(&self) -> Result<Option<BlockTrace>> {
        let unbatched = self.store.unbatched_block_traces(usize::MAX)?;
        if let Some(stored) = unbatched.into_iter().last() {
            return Ok(Some(stored.trace));
        }
        Ok(self
            .store
            .latest_batch()?
            .and_then(|r| r.batch.blocks().last().cloned()))
    }

    /// Walks the stored blocks back until one still matches the chain,
    /// then drops the unbatched traces above it.
    ///
    /// Fails with [`Error::InvalidInput`] when the reorg reaches blocks
    /// already sealed in a batch.
    async fn rewind_to_fork(&self, key: HistoryStoreKey) -> Result<()> {
        let unbatched = self.store.unbatched_block_traces(usize::MAX)?;
        let sealed = self
            .store
            .latest_batch()?
            .and_then(|r| r.batch.blocks().last().cloned());
        let stored = unbatched.iter().rev().map(|s| &s.trace);
        for block in stored.chain(sealed.iter()) {
            let on_chain = self.trace_source.get_block_trace(block.number).await?;
            if on_chain.map(|t| t.hash) == Some(block.hash) {
                let dropped =
                    self.store.drop_unbatched_block_traces(block.number + 1)?;
                self.store.set_last_block_number(key, block.number)?;
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Sync,
                    layer = %Layer::L2,
                    fork_point = block.number,
                    dropped,
                    reorg = true,
                );
                tracing::warn!(
                    "L2 reorg: dropped {} unbatched traces above block #{}",
                    dropped,
                    block.number
                );
                return Ok(());
            }
        }
        match sealed {
            Some(block) => Err(Error::InvalidInput(format!(
                "L2 reorged below block #{} which is already batched",
                block.number
            ))),
            None => {
                let fork = unbatched
                    .first()
                    .map(|s| s.trace.number.saturating_sub(1))
                    .unwrap_or_default();
                let dropped = self.store.drop_unbatched_block_traces(0)?;
                self.store.set_last_block_number(key, fork)?;
                tracing::warn!(
                    "L2 reorg: dropped all {} unbatched traces, resyncing from block #{}",
                    dropped,
                    fork + 1
                );
                Ok(())
            }
        }
    }

    /// Builds and stores the next batch if the unbatched traces satisfy
    /// the batching policy.
    fn seal_next_batch(&self) -> Result<Option<BatchRecord>> {
        let threshold = self.config.batch_blocks_threshold;
        let unbatched = self.store.unbatched_block_traces(threshold)?;
        let Some(oldest) = unbatched.first() else {
            return Ok(None);
        };
        let timed_out = unix_millis().saturating_sub(oldest.received_at)
            >= self.config.batch_timeout;

        let mut blocks = Vec::with_capacity(unbatched.len());
        let mut sealed = false;
        for stored in unbatched {
            blocks.push(stored.trace);
            if blocks.len() >= threshold
                || batch::encoded_len(&blocks)
                    >= self.config.batch_bytes_threshold
            {
                sealed = true;
                break;
            }
        }
        if !sealed && !timed_out {
            return Ok(None);
        }

        let latest = self.store.latest_batch()?;
        if let Some(latest) = &latest {
            let follows = latest.batch.blocks().last().map_or(true, |tail| {
                blocks[0].number == tail.number + 1
                    && blocks[0].parent_hash == tail.hash
            });
            if !follows {
                let dropped = self.store.drop_unbatched_block_traces(0)?;
                let key = HistoryStoreKey::BlockTraces { layer: Layer::L2 };
                self.store
                    .set_last_block_number(key, latest.batch.last_block())?;
                tracing::warn!(
                    "Unbatched block #{} does not follow batch #{}; dropped {} traces",
                    blocks[0].number,
                    latest.index(),
                    dropped
                );
                return Ok(None);
            }
        }
        let parent = match latest {
            Some(latest) => latest.batch.as_parent(),
            None => ParentBatchRef::genesis(
                self.config.genesis_batch_index,
                self.config.genesis_state_root,
            ),
        };
        let batch = build_batch(&parent, blocks)?;
        let record = BatchRecord::new(batch);
        self.store.insert_batch(record.clone())?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Batch,
            index = record.index(),
            first_block = record.batch.first_block(),
            last_block = record.batch.last_block(),
            data_hash = ?record.batch.data_hash(),
            built = true,
        );
        tracing::info!(
            "Batch #{} built out of blocks #{}..=#{}",
            record.index(),
            record.batch.first_block(),
            record.batch.last_block(),
        );
        Ok(Some(record))
    }

    /// Commits Pending batches in index order, up to
    /// `max-inflight-commits` at a time.
    #[tracing::instrument(skip(self))]
    pub async fn process_pending_batches(&self) -> Result<()> {
        let mut inflight =
            self.store.batches_with_status(BatchStatus::Committing)?.len();
        while inflight < self.config.max_inflight_commits {
            let pending = self.store.batches_with_status(BatchStatus::Pending)?;
            // only ever the lowest one.
            let Some(record) = pending.into_iter().next() else {
                break;
            };
            let data = calldata::commit_batch(&record.batch);
            self.start_stage(Stage::Commit, &record, data).await?;
            inflight += 1;
        }
        Ok(())
    }

    /// Finalizes the lowest unfinished batch once it is committed.
    #[tracing::instrument(skip(self))]
    pub async fn process_committed_batches(&self) -> Result<()> {
        if !self
            .store
            .batches_with_status(BatchStatus::Finalizing)?
            .is_empty()
        {
            return Ok(());
        }
        let Some(record) = self.store.first_unfinished_batch()? else {
            return Ok(());
        };
        if record.status != BatchStatus::Committed {
            return Ok(());
        }
        let data = calldata::finalize_batch(&record.batch);
        self.start_stage(Stage::Finalize, &record, data).await
    }

    /// Sends the `stage` transaction of `record` and moves it in flight.
    ///
    /// A transaction left behind by a previous run is adopted instead.
    async fn start_stage(
        &self,
        stage: Stage,
        record: &BatchRecord,
        data: ethers_core::types::Bytes,
    ) -> Result<()> {
        let index = record.index();
        let entity = stage.entity(index);
        let tx_hash = match self.sender.pending_for(entity)? {
            Some(pending) => {
                tracing::info!(
                    "Adopting {} tx {:?} of batch #{}",
                    stage,
                    pending.tx_hash,
                    index
                );
                pending.tx_hash
            }
            None => {
                self.sender
                    .submit(entity, self.rollup_address, data)
                    .await?
            }
        };
        let in_flight = match stage {
            Stage::Commit => BatchStatus::Committing,
            Stage::Finalize => BatchStatus::Finalizing,
        };
        self.store.update_batch(index, |r| {
            r.transition(in_flight)?;
            stage.set_tx(r, Some(tx_hash));
            Ok(())
        })?;
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Batch,
            index,
            status = %in_flight,
            ?tx_hash,
        );
        Ok(())
    }

    /// Follows the commit transactions of Committing batches.
    #[tracing::instrument(skip(self))]
    pub async fn check_committing_batches(&self) -> Result<()> {
        for record in self.store.batches_with_status(BatchStatus::Committing)? {
            self.check_stage(Stage::Commit, record).await?;
        }
        Ok(())
    }

    /// Follows the finalize transactions of Finalizing batches.
    #[tracing::instrument(skip(self))]
    pub async fn check_finalizing_batches(&self) -> Result<()> {
        for record in self.store.batches_with_status(BatchStatus::Finalizing)? {
            self.check_stage(Stage::Finalize, record).await?;
        }
        Ok(())
    }

    async fn check_stage(&self, stage: Stage, record: BatchRecord) -> Result<()> {
        let index = record.index();
        let Some(pending) = self.sender.pending_for(stage.entity(index))? else {
            return self.recover_untracked(stage, &record).await;
        };

        // the batch moves first, the tx is forgotten after.
        match self.sender.tracker().check(&pending).await? {
            Confirmation::Confirmed {
                tx_hash,
                block_number,
            } => {
                self.stage_confirmed(stage, index, tx_hash, block_number)
                    .await?;
                self.sender.finish(pending.tx_hash)?;
            }
            Confirmation::Reverted { reason, .. } => {
                self.handle_revert(stage, index, &reason).await?;
                self.sender.finish(pending.tx_hash)?;
            }
            Confirmation::Waiting => {}
            Confirmation::TimedOut => self.bump(stage, index, &pending).await?,
        }
        Ok(())
    }

    /// A batch in flight whose tx is no longer tracked: settle it from
    /// the recorded tx, or send again when the chain never saw it.
    async fn recover_untracked(
        &self,
        stage: Stage,
        record: &BatchRecord,
    ) -> Result<()> {
        let index = record.index();
        let recorded = match stage {
            Stage::Commit => record.commit_tx,
            Stage::Finalize => record.finalize_tx,
        };
        let status = match recorded {
            Some(tx_hash) => self.sender.query_status(tx_hash).await?,
            None => TxStatus::NotFound,
        };
        match (recorded, status) {
            (Some(tx_hash), TxStatus::Confirmed { block_number }) => {
                tracing::warn!(
                    "Untracked {} tx {:?} of batch #{} landed in block #{}",
                    stage,
                    tx_hash,
                    index,
                    block_number
                );
                self.stage_confirmed(stage, index, tx_hash, block_number)
                    .await
            }
            (_, TxStatus::Reverted { reason, .. }) => {
                self.handle_revert(stage, index, &reason).await
            }
            (_, TxStatus::Pending) => {
                tracing::warn!(
                    "Untracked {} tx {:?} of batch #{} is still in the mempool",
                    stage,
                    recorded,
                    index
                );
                Ok(())
            }
            _ => {
                tracing::warn!(
                    "Batch #{} is {} without a tracked {} tx; retrying",
                    index,
                    record.status,
                    stage
                );
                self.store.update_batch(index, |r| {
                    r.transition(stage.retry())?;
                    stage.set_tx(r, None);
                    Ok(())
                })?;
                Ok(())
            }
        }
    }

    async fn stage_confirmed(
        &self,
        stage: Stage,
        index: u64,
        tx_hash: H256,
        block_number: u64,
    ) -> Result<()> {
        self.store.update_batch(index, |r| {
            r.transition(stage.done())?;
            stage.set_tx(r, Some(tx_hash));
            Ok(())
        })?;
        let metrics = self.metrics.lock().await;
        match stage {
            Stage::Commit => metrics.batches_committed.inc(),
            Stage::Finalize => metrics.batches_finalized.inc(),
        }
        drop(metrics);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Batch,
            index,
            status = %stage.done(),
            ?tx_hash,
            block_number,
        );
        tracing::info!(
            "Batch #{} {} in block #{} (tx {:?})",
            index,
            stage.done(),
            block_number,
            tx_hash
        );
        Ok(())
    }

    async fn bump(
        &self,
        stage: Stage,
        index: u64,
        pending: &PendingTransaction,
    ) -> Result<()> {
        match self.sender.bump(pending.tx_hash).await {
            Ok(new_hash) => {
                self.store.update_batch(index, |r| {
                    stage.set_tx(r, Some(new_hash));
                    Ok(())
                })?;
                Ok(())
            }
            Err(Error::StuckTransaction { attempts, .. }) => {
                let reason = format!(
                    "{} tx {:?} stuck after {} fee bumps",
                    stage, pending.tx_hash, attempts
                );
                self.skip_batch(index, &reason).await.map(|_| ())
            }
            // one of the earlier hashes probably landed meanwhile.
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "Could not bump {} tx {:?} of batch #{}: {}",
                    stage,
                    pending.tx_hash,
                    index,
                    e
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_revert(
        &self,
        stage: Stage,
        index: u64,
        reason: &str,
    ) -> Result<()> {
        let revert = self.classifier.classify(reason);
        let permanent = matches!(revert, Error::Revert { permanent: true, .. });
        let max_retries = self.config.max_revert_retries;
        let record = self.store.update_batch(index, |r| {
            r.last_error = Some(revert.to_string());
            if permanent || r.revert_retries >= max_retries {
                r.skip(format!("{stage} reverted: {reason}"))?;
            } else {
                r.revert_retries += 1;
                r.transition(stage.retry())?;
                stage.set_tx(r, None);
            }
            Ok(())
        })?;
        if record.status == BatchStatus::Skipped {
            self.on_skipped(&record).await;
        } else {
            tracing::warn!(
                "Batch #{} {} reverted ({}), retry {}/{}",
                index,
                stage,
                reason,
                record.revert_retries,
                max_retries
            );
        }
        Ok(())
    }

    /// Gives up on batch `index`; its index stays taken.
    ///
    /// Fails with [`Error::InvalidTransition`] when the batch is already
    /// Finalized or Skipped.
    #[tracing::instrument(skip(self))]
    pub async fn skip_batch(
        &self,
        index: u64,
        reason: &str,
    ) -> Result<BatchRecord> {
        if self.store.get_batch(index)?.is_none() {
            return Err(Error::BatchNotFound(index));
        }
        let record = self.store.update_batch(index, |r| r.skip(reason))?;
        for stage in [Stage::Commit, Stage::Finalize] {
            if let Some(pending) = self.sender.pending_for(stage.entity(index))? {
                self.sender.finish(pending.tx_hash)?;
            }
        }
        self.on_skipped(&record).await;
        Ok(record)
    }

    async fn on_skipped(&self, record: &BatchRecord) {
        self.metrics.lock().await.batches_skipped.inc();
        let reason = record.skip_reason.as_deref().unwrap_or_default();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Batch,
            index = record.index(),
            status = %BatchStatus::Skipped,
            reason,
        );
        tracing::error!("Batch #{} skipped: {}", record.index(), reason);
    }

    /// The L1 side of the pipeline: confirmations, commits and
    /// finalizations.
    ///
    /// Every step runs even when an earlier one fails; the first error is
    /// returned.
    pub async fn drive(&self) -> Result<()> {
        let steps = [
            ("commit check", self.check_committing_batches().await),
            ("commit", self.process_pending_batches().await),
            ("finalize check", self.check_finalizing_batches().await),
            ("finalize", self.process_committed_batches().await),
        ];
        let mut failure = None;
        for (step, result) in steps {
            if let Err(e) = result {
                tracing::warn!("Batch relayer {} step failed: {}", step, e);
                failure.get_or_insert(e);
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// One pass over the whole pipeline: L2 ingestion, then
    /// [`BatchRelayer::drive`].
    ///
    /// A failing ingestion does not hold back the L1 side.
    pub async fn tick(&self) -> Result<()> {
        let synced = self.process_saved_events().await;
        let driven = self.drive().await;
        synced.and(driven)
    }

    /// Runs the pipeline every `commit-poll-interval` until `shutdown`
    /// fires.
    ///
    /// L2 ingestion and the L1 side back off independently, so an
    /// unreachable chain only slows down its own half. Shutdown is only
    /// observed between ticks.
    pub async fn run(&self, mut shutdown: Shutdown) -> Result<()> {
        let interval = self.config.commit_poll_interval();
        let max_wait = Duration::from_secs(60);
        let mut sync_backoff = retry::unbounded_exponential(interval, max_wait);
        let mut drive_backoff = retry::unbounded_exponential(interval, max_wait);
        let mut next_sync = Instant::now();
        let mut next_drive = Instant::now();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            relayer = "batch",
            started = true,
        );
        loop {
            let now = Instant::now();
            if now >= next_sync {
                let wait = match self.process_saved_events().await {
                    Ok(_) => {
                        sync_backoff.reset();
                        interval
                    }
                    Err(e) => self.backed_off("sync", &mut sync_backoff, e).await,
                };
                next_sync = Instant::now() + wait;
            }
            if now >= next_drive {
                let wait = match self.drive().await {
                    Ok(()) => {
                        drive_backoff.reset();
                        interval
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
            relayer = "batch",
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
        let wait = backoff
            .next_backoff()
            .unwrap_or(self.config.commit_poll_interval());
        self.metrics.lock().await.relayer_back_off.inc();
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Retry,
            relayer = "batch",
            step,
            transient = e.is_transient(),
            error = %e,
            wait = ?wait,
        );
        tracing::error!(
            "Batch relayer {} failed: {}, retrying in {:?}",
            step,
            e,
            wait
        );
        wait
    }
}
