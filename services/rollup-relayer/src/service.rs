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

//! # Relayer Service Module 🕸️
//!
//! Services are tasks which the relayer constantly runs throughout its
//! lifetime:
//!
//! * the batch relayer, committing L2 batches to L1;
//! * one message relayer per enabled direction.
//!
//! Each chain has a single [`TxSender`], shared by every task sending on
//! it, so one account never hands out a nonce twice.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use ethers_signers::LocalWallet;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use rollup_relayer_batch::BatchRelayer;
use rollup_relayer_context::{RelayerContext, Shutdown};
use rollup_relayer_handlers::routes::{
    handle_batch_status, handle_latest_batch, handle_message_status,
    handle_metric_info, handle_relayer_info,
};
use rollup_relayer_messenger::MessageRelayer;
use rollup_relayer_store::SledStore;
use rollup_relayer_tx_sender::{ChainClient, RevertClassifier, TxSender};
use rollup_relayer_types::Layer;
use rollup_relayer_utils::{probe, Error, Result};

/// Type alias for [Sled](https://sled.rs)-based database store
pub type Store = SledStore;

/// The sender of the relayer account on one chain.
pub type Sender<C> = TxSender<C, Store, LocalWallet>;

/// The HTTP routes of the relayer, all under `/api/v1`.
pub fn build_router(ctx: RelayerContext) -> Router {
    let api = Router::new()
        .route("/info", get(handle_relayer_info))
        .route("/batches/latest", get(handle_latest_batch))
        .route("/batches/:index", get(handle_batch_status))
        .route("/messages/:hash", get(handle_message_status))
        .route("/metrics", get(handle_metric_info));

    Router::new()
        .nest("/api/v1", api)
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(ctx))
}

/// Serves [`build_router`] on the configured port until the relayer
/// shuts down.
pub async fn build_web_services(ctx: RelayerContext) -> Result<()> {
    let socket_addr = SocketAddr::new([0, 0, 0, 0].into(), ctx.config.port);
    let mut shutdown = ctx.shutdown_signal();
    let app = build_router(ctx)
        .into_make_service_with_connect_info::<SocketAddr>();

    tracing::info!("Starting the server on {}", socket_addr);
    axum::Server::bind(&socket_addr)
        .serve(app)
        .with_graceful_shutdown(async move { shutdown.recv().await })
        .await?;
    Ok(())
}

/// Starts every relayer task in the background.
///
/// `l1` and `l2` must talk to the chains of the configuration. The tasks
/// stop on [`RelayerContext::shutdown`]; their handles are returned so the
/// caller can wait for them.
pub fn ignite<C1, C2>(
    ctx: &RelayerContext,
    l1: Arc<C1>,
    l2: Arc<C2>,
) -> Result<Vec<JoinHandle<()>>>
where
    C1: ChainClient + 'static,
    C2: ChainClient + 'static,
{
    ensure_chain_id(ctx, Layer::L1, l1.chain_id())?;
    ensure_chain_id(ctx, Layer::L2, l2.chain_id())?;
    let l1_sender = Arc::new(make_sender(ctx, Layer::L1, l1.clone())?);
    let mut handles = Vec::new();

    let batch_relayer = batch_relayer(ctx, l1_sender.clone(), l2.clone());
    let shutdown = ctx.shutdown_signal();
    handles.push(tokio::spawn(async move {
        if let Err(e) = batch_relayer.run(shutdown).await {
            tracing::error!("Batch relayer stopped: {}", e);
        }
    }));

    let relay = &ctx.config.relay;
    if relay.is_enabled(Layer::L1) {
        let l2_sender = Arc::new(make_sender(ctx, Layer::L2, l2.clone())?);
        let relayer = message_relayer(ctx, Layer::L1, l1, l2_sender);
        handles.push(spawn_message_relayer(relayer, ctx.shutdown_signal()));
    } else {
        tracing::warn!("Relaying of L1 -> L2 messages is disabled");
    }
    if relay.is_enabled(Layer::L2) {
        let relayer = message_relayer(ctx, Layer::L2, l2, l1_sender);
        handles.push(spawn_message_relayer(relayer, ctx.shutdown_signal()));
    } else {
        tracing::warn!("Relaying of L2 -> L1 messages is disabled");
    }

    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        tasks = handles.len(),
        started = true,
    );
    Ok(handles)
}

fn ensure_chain_id(
    ctx: &RelayerContext,
    layer: Layer,
    chain_id: u64,
) -> Result<()> {
    let expected = ctx.config.chain(layer).chain_id;
    if chain_id != expected {
        return Err(Error::InvalidConfig(format!(
            "{layer} client talks to chain {chain_id}, configured for {expected}"
        )));
    }
    Ok(())
}

/// The sender of the relayer account on `layer`, talking through `client`.
///
/// Create one per chain and share it.
pub fn make_sender<C: ChainClient>(
    ctx: &RelayerContext,
    layer: Layer,
    client: Arc<C>,
) -> Result<Sender<C>> {
    let chain = ctx.config.chain(layer);
    let wallet = ctx.wallet(layer)?;
    Ok(TxSender::new(
        layer,
        client,
        Arc::new(wallet),
        ctx.store().clone(),
        chain.sender.clone(),
        chain.block_confirmations,
        ctx.metrics.clone(),
    ))
}

fn revert_classifier(ctx: &RelayerContext) -> RevertClassifier {
    RevertClassifier::new(&ctx.config.permanent_revert_reasons)
}

/// The batch relayer committing to L1 through `l1_sender` the blocks of
/// `l2`.
pub fn batch_relayer<C1, C2>(
    ctx: &RelayerContext,
    l1_sender: Arc<Sender<C1>>,
    l2: Arc<C2>,
) -> BatchRelayer<C1, C2, Store, LocalWallet>
where
    C1: ChainClient,
    C2: ChainClient,
{
    let config = &ctx.config;
    BatchRelayer::builder()
        .sender(l1_sender)
        .trace_source(l2)
        .store(ctx.store().clone())
        .config(config.batch.clone())
        .rollup_address(config.l1.contract_address)
        .trace_confirmations(config.l2.block_confirmations)
        .max_blocks_per_step(config.l2.max_blocks_per_step)
        .classifier(revert_classifier(ctx))
        .metrics(ctx.metrics.clone())
        .build()
}

/// The message relayer of the messages sent on `source`, delivered
/// through `sender`, the sender of the counterpart chain.
pub fn message_relayer<CS, CD>(
    ctx: &RelayerContext,
    source: Layer,
    source_client: Arc<CS>,
    sender: Arc<Sender<CD>>,
) -> MessageRelayer<CS, CD, Store, LocalWallet>
where
    CS: ChainClient,
    CD: ChainClient,
{
    let config = &ctx.config;
    let source_config = config.chain(source);
    MessageRelayer::builder()
        .source(source)
        .source_client(source_client)
        .sender(sender)
        .store(ctx.store().clone())
        .messenger_address(config.chain(source.counterpart()).messenger_address())
        .block_confirmations(source_config.block_confirmations)
        .max_blocks_per_step(source_config.max_blocks_per_step)
        .max_revert_retries(config.relay.max_revert_retries)
        .check_interval(config.relay.check_interval())
        .classifier(revert_classifier(ctx))
        .metrics(ctx.metrics.clone())
        .build()
}

fn spawn_message_relayer<CS, CD>(
    relayer: MessageRelayer<CS, CD, Store, LocalWallet>,
    shutdown: Shutdown,
) -> JoinHandle<()>
where
    CS: ChainClient + 'static,
    CD: ChainClient + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = relayer.run(shutdown).await {
            tracing::error!(
                "{} message relayer stopped: {}",
                relayer.source(),
                e
            );
        }
    })
}
