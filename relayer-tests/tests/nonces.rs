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

//! The L1 account is shared by batch commits and L2 -> L1 relays.

use futures::future::join;
use rollup_relayer_tests::*;
use rollup_relayer_tx_sender::mock::MockOutcome;
use rollup_relayer_types::Layer;

#[tokio::test]
async fn concurrent_tasks_get_distinct_contiguous_nonces() {
    let mut config = config();
    config.batch.max_inflight_commits = 3;
    let t = TestRelayer::new(config);
    t.l1.set_default_outcome(MockOutcome::NeverMine);
    t.l1.set_min_nonce(40);
    t.l2.push_block_traces(blocks(1, 3));
    for i in 0..3 {
        t.l2.push_message(message(i, i + 1, format!("up {i}").as_bytes()));
    }

    let batches = t.batch_relayer();
    let messages = t.message_relayer(Layer::L2);
    let (a, b) = join(batches.tick(), messages.tick()).await;
    a.unwrap();
    b.unwrap();

    let submitted = t.l1.submitted();
    assert_eq!(submitted.len(), 6);
    assert_eq!(submitted.iter().filter(|tx| tx.to == ROLLUP).count(), 3);
    assert_eq!(submitted.iter().filter(|tx| tx.to == L1_MESSENGER).count(), 3);
    let mut nonces: Vec<_> = submitted.iter().map(|tx| tx.nonce).collect();
    nonces.sort_unstable();
    assert_eq!(nonces, (40..46).collect::<Vec<_>>());
}
