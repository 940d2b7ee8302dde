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
use axum::http::StatusCode;
use ethereum_types::H256;
use rollup_relayer_config::RollupRelayerConfig;
use rollup_relayer_context::RelayerContext;
use rollup_relayer_store::{BatchStore, MessageStore, SledStore};
use rollup_relayer_types::{
    build_batch, BatchRecord, BatchStatus, BlockTrace, Layer, ParentBatchRef,
    RelayedMessage, SentMessage,
};

use crate::routes::*;

fn context() -> Arc<RelayerContext> {
    let config: RollupRelayerConfig = serde_json::from_value(serde_json::json!({
        "l1": {
            "name": "l1",
            "chain-id": 1,
            "contract-address": "0x00000000000000000000000000000000000000aa",
            "private-key": format!("0x{}", "33".repeat(32)),
        },
        "l2": {
            "name": "l2",
            "chain-id": 2,
            "contract-address": "0x00000000000000000000000000000000000000bb",
        },
    }))
    .unwrap();
    let store = SledStore::temporary().unwrap();
    Arc::new(RelayerContext::new(config, store).unwrap())
}

fn record(index: u64) -> BatchRecord {
    let block = BlockTrace::builder()
        .number(index + 1)
        .hash(H256::from_low_u64_be(index + 1))
        .parent_hash(H256::from_low_u64_be(index))
        .state_root(H256::repeat_byte(0x42))
        .build();
    let parent = ParentBatchRef::genesis(index, H256::zero());
    BatchRecord::new(build_batch(&parent, vec![block]).unwrap())
}

#[tokio::test]
async fn batch_status_is_served_from_the_store() {
    let ctx = context();
    let err = handle_latest_batch(State(ctx.clone())).await.unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);

    ctx.store().insert_batch(record(0)).unwrap();
    ctx.store()
        .update_batch(0, |r| r.transition(BatchStatus::Committing))
        .unwrap();

    let latest = handle_latest_batch(State(ctx.clone())).await.unwrap();
    let by_index = handle_batch_status(State(ctx.clone()), Path(0))
        .await
        .unwrap();
    let json = serde_json::to_value(&by_index.0).unwrap();
    assert_eq!(serde_json::to_value(&latest.0).unwrap(), json);
    assert_eq!(json["status"], "committing");
    assert_eq!(json["blockCount"], 1);

    let err = handle_batch_status(State(ctx), Path(9)).await.unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn message_status_is_served_from_the_store() {
    let ctx = context();
    let message = RelayedMessage::new(
        Layer::L2,
        SentMessage {
            sender: Default::default(),
            target: Default::default(),
            value: 7u64.into(),
            message_index: 3,
            payload: vec![1, 2, 3].into(),
            block_number: 12,
        },
    );
    let hash = message.message_hash;
    ctx.store().insert_message(message).unwrap();

    let found = handle_message_status(State(ctx.clone()), Path(hash))
        .await
        .unwrap();
    assert_eq!(found.0.message_index, 3);
    assert_eq!(found.0.destination(), Layer::L1);

    let err = handle_message_status(State(ctx), Path(H256::repeat_byte(1)))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_and_info() {
    let ctx = context();
    ctx.metrics.lock().await.batches_committed.inc();
    let text = handle_metric_info(State(ctx.clone())).await.unwrap();
    assert!(text.contains("rollup_relayer_batches_committed 1"));
    assert!(text.contains("rollup_relayer_total_amount_of_data_stored"));

    let info = handle_relayer_info(State(ctx)).await.unwrap();
    let json = serde_json::to_value(&info.0).unwrap();
    assert_eq!(json["l1"]["chainId"], 1);
    assert!(json["l1"]["account"].is_string());
    assert!(json["l2"]["account"].is_null());
    assert!(json["latestBatch"].is_null());
}
