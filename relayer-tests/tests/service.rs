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

//! The relayer tasks as the service starts them.

use std::time::Duration;

use rollup_relayer::service;
use rollup_relayer_store::{BatchStore, MessageStore};
use rollup_relayer_tests::*;
use rollup_relayer_types::{BatchStatus, Layer, MessageStatus};

#[tokio::test]
async fn ignited_relayer_works_until_shutdown() {
    let t = TestRelayer::new(config());
    t.l2.push_block_traces(blocks(1, 2));
    let up = message(0, 1, b"withdraw");
    t.l2.push_message(up.clone());

    let handles = service::ignite(&t.ctx, t.l1.clone(), t.l2.clone()).unwrap();
    let store = t.store().clone();
    let done = wait_until(Duration::from_secs(10), || {
        let finalized = matches!(
            store.get_batch(1).ok().flatten(),
            Some(record) if record.status == BatchStatus::Finalized
        );
        let relayed = matches!(
            store.get_message(up.message_hash(Layer::L2)).ok().flatten(),
            Some(message) if message.status == MessageStatus::Confirmed
        );
        finalized && relayed
    })
    .await;
    assert!(done);

    t.ctx.shutdown();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task stops on shutdown")
            .unwrap();
    }
}

#[tokio::test]
async fn clients_of_the_wrong_chain_are_refused() {
    let t = TestRelayer::new(config());
    let err = service::ignite(&t.ctx, t.l2.clone(), t.l1.clone()).unwrap_err();
    assert!(err.to_string().contains("31338"));
}
