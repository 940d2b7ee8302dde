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

use axum::extract::State;
use axum::Json;
use ethereum_types::Address;
use ethers_signers::Signer;
use serde::Serialize;

use rollup_relayer_context::RelayerContext;
use rollup_relayer_store::{BatchStore, HistoryStore, HistoryStoreKey};
use rollup_relayer_types::{BatchStatus, Layer};
use rollup_relayer_utils::HandlerError;

/// What the relayer knows about one of its chains.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    name: String,
    chain_id: u64,
    contract_address: Address,
    messenger_address: Address,
    /// The relayer account, `None` without a configured key.
    account: Option<Address>,
    /// Last block whose messages were picked up.
    synced_block: u64,
    /// Last confirmed block seen on the chain.
    target_block: u64,
}

/// Relayer information response struct
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayerInformationResponse {
    l1: ChainInfo,
    l2: ChainInfo,
    /// Last L2 block turned into a batch or waiting for one.
    traced_block: u64,
    latest_batch: Option<(u64, BatchStatus)>,
}

/// Handles relayer information requests.
pub async fn handle_relayer_info(
    State(ctx): State<Arc<RelayerContext>>,
) -> Result<Json<RelayerInformationResponse>, HandlerError> {
    let store = ctx.store();
    let chain = |layer: Layer| -> rollup_relayer_utils::Result<ChainInfo> {
        let config = ctx.config.chain(layer);
        let key = HistoryStoreKey::Messages { layer };
        Ok(ChainInfo {
            name: config.name.clone(),
            chain_id: config.chain_id,
            contract_address: config.contract_address,
            messenger_address: config.messenger_address(),
            account: ctx.wallet(layer).ok().map(|w| w.address()),
            synced_block: store.get_last_block_number_or_default(key)?,
            target_block: store.get_target_block_number(key, 0)?,
        })
    };
    let traced_block = store.get_last_block_number_or_default(
        HistoryStoreKey::BlockTraces { layer: Layer::L2 },
    )?;
    let latest_batch = store
        .latest_batch()?
        .map(|record| (record.index(), record.status));
    Ok(Json(RelayerInformationResponse {
        l1: chain(Layer::L1)?,
        l2: chain(Layer::L2)?,
        traced_block,
        latest_batch,
    }))
}
