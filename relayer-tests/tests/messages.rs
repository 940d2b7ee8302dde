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

//! Cross-chain message relaying in both directions.

use rollup_relayer_messenger::calldata;
use rollup_relayer_store::MessageStore;
use rollup_relayer_tests::*;
use rollup_relayer_tx_sender::mock::{calldata_contains, MockOutcome};
use rollup_relayer_types::{Layer, MessageStatus};

#[tokio::test]
async fn stuck_message_expires_while_the_other_confirms() {
    let mut config = config();
    config.l2.sender.tx_timeout = 0;
    config.l2.sender.max_bump_attempts = 3;
    let t = TestRelayer::new(config);
    t.l2.on(calldata_contains(b"never mined".to_vec()), MockOutcome::NeverMine);

    let stuck = message(0, 1, b"never mined");
    let fine = message(1, 1, b"deposit");
    t.l1.push_message(stuck.clone());
    t.l1.push_message(fine.clone());
    t.l1.advance_blocks(1);

    let relayer = t.message_relayer(Layer::L1);
    for _ in 0..6 {
        relayer.tick().await.unwrap();
    }

    let expired = t.store().get_message(stuck.message_hash(Layer::L1)).unwrap().unwrap();
    assert_eq!(expired.status, MessageStatus::Expired);
    assert!(expired
        .last_error
        .as_deref()
        .unwrap()
        .contains("stuck after 3 fee bumps"));
    let confirmed = t.store().get_message(fine.message_hash(Layer::L1)).unwrap().unwrap();
    assert_eq!(confirmed.status, MessageStatus::Confirmed);

    // the original relay and three replacements, all on one nonce.
    let relays: Vec<_> = t
        .l2
        .submitted()
        .into_iter()
        .filter(|tx| calldata_contains(b"never mined".to_vec())(tx))
        .collect();
    assert_eq!(relays.len(), 4);
    assert!(relays.iter().all(|tx| tx.nonce == relays[0].nonce));
    assert!(relays
        .windows(2)
        .all(|w| w[1].fee.max_fee_per_gas > w[0].fee.max_fee_per_gas));

    let metrics = t.ctx.metrics.lock().await;
    assert_eq!(metrics.messages_expired.get() as u64, 1);
    assert_eq!(metrics.messages_confirmed.get() as u64, 1);
}

#[tokio::test]
async fn messages_go_to_the_messenger_of_the_other_layer() {
    let t = TestRelayer::new(config());
    let down = message(0, 1, b"to l2");
    let up = message(0, 1, b"to l1");
    t.l1.push_message(down.clone());
    t.l1.advance_blocks(1);
    t.l2.push_message(up.clone());

    let l1_to_l2 = t.message_relayer(Layer::L1);
    let l2_to_l1 = t.message_relayer(Layer::L2);
    for _ in 0..2 {
        l1_to_l2.tick().await.unwrap();
        l2_to_l1.tick().await.unwrap();
    }

    for hash in [down.message_hash(Layer::L1), up.message_hash(Layer::L2)] {
        assert_eq!(
            t.store().get_message(hash).unwrap().unwrap().status,
            MessageStatus::Confirmed
        );
    }
    let on_l2 = t.l2.submitted_with_selector(calldata::relay_message_selector());
    let on_l1 = t.l1.submitted_with_selector(calldata::relay_message_selector());
    assert_eq!(on_l2.len(), 1);
    assert_eq!(on_l1.len(), 1);
    assert_eq!(on_l2[0].to, L2_MESSENGER);
    assert_eq!(on_l1[0].to, L1_MESSENGER);
}

#[tokio::test]
async fn failed_message_does_not_block_later_ones() {
    let t = TestRelayer::new(config());
    t.l2.on_times(
        calldata_contains(b"replayed".to_vec()),
        MockOutcome::Revert("execution reverted: Message already relayed".into()),
        1,
    );
    let replayed = message(0, 1, b"replayed");
    let later = message(1, 1, b"withdrawal");
    t.l1.push_message(replayed.clone());
    t.l1.push_message(later.clone());
    t.l1.advance_blocks(1);

    let relayer = t.message_relayer(Layer::L1);
    for _ in 0..3 {
        relayer.tick().await.unwrap();
    }

    let failed = t.store().get_message(replayed.message_hash(Layer::L1)).unwrap().unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.revert_retries, 0);
    assert_eq!(
        t.store().get_message(later.message_hash(Layer::L1)).unwrap().unwrap().status,
        MessageStatus::Confirmed
    );
}
