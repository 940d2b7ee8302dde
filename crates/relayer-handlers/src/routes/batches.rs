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

use axum::extract::{Path, State};
use axum::Json;
use ethereum_types::H256;
use serde::Serialize;

use rollup_relayer_context::RelayerContext;
use rollup_relayer_store::BatchStore;
use rollup_relayer_types::{BatchRecord, BatchStatus};
use rollup_relayer_utils::{Error, HandlerError};

/// Batch status response struct
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    index: u64,
    status: BatchStatus,
    parent_hash: H256,
    data_hash: H256,
    new_state_root: H256,
    first_block: u64,
    last_block: u64,
    block_count: usize,
    created_at: u64,
    commit_tx: Option<H256>,
    finalize_tx: Option<H256>,
    revert_retries: u32,
    last_error: Option<String>,
    skip_reason: Option<String>,
    updated_at: u64,
}

impl From<BatchRecord> for BatchResponse {
    fn from(record: BatchRecord) -> Self {
        let batch = &record.batch;
        Self {
            index: batch.index(),
            status: record.status,
            parent_hash: batch.parent_hash(),
            data_hash: batch.data_hash(),
            new_state_root: batch.new_state_root(),
            first_block: batch.first_block(),
            last_block: batch.last_block(),
            block_count: batch.blocks().len(),
            created_at: batch.created_at(),
            commit_tx: record.commit_tx,
            finalize_tx: record.finalize_tx,
            revert_retries: record.revert_retries,
            last_error: record.last_error,
            skip_reason: record.skip_reason,
            updated_at: record.updated_at,
        }
    }
}

/// Handles the status of the batch at `index`.
///
/// Responds with `404` if no such batch was built yet.
pub async fn handle_batch_status(
    State(ctx): State<Arc<RelayerContext>>,
    Path(index): Path<u64>,
) -> Result<Json<BatchResponse>, HandlerError> {
    let record = ctx
        .store()
        .get_batch(index)?
        .ok_or(Error::BatchNotFound(index))?;
    Ok(Json(record.into()))
}

/// Handles the status of the most recently built batch.
pub async fn handle_latest_batch(
    State(ctx): State<Arc<RelayerContext>>,
) -> Result<Json<BatchResponse>, HandlerError> {
    match ctx.store().latest_batch()? {
        Some(record) => Ok(Json(record.into())),
        None => Err(HandlerError(
            axum::http::StatusCode::NOT_FOUND,
            "No batch was built yet".to_string(),
        )),
    }
}
