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

//! A chain living in memory, for tests.
//!
//! Transactions are mined the moment they are submitted, one block each,
//! unless a rule says otherwise.

use std::collections::{BTreeMap, HashMap};

use ethers_core::types::{Address, H256};
use parking_lot::Mutex;
use rollup_relayer_types::{BlockTrace, FeeParams, SentMessage, TxStatus};
use rollup_relayer_utils::{Error, Result};

use crate::client::{ChainClient, SignedTransaction, UnsignedTransaction};

/// What happens to a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Mined in a new block and successful.
    Confirm,
    /// Mined in a new block and reverted with the given reason.
    Revert(String),
    /// Stays in the mempool forever.
    NeverMine,
}

type Matcher = Box<dyn Fn(&UnsignedTransaction) -> bool + Send + Sync>;

struct Rule {
    matcher: Matcher,
    outcome: MockOutcome,
    remaining: Option<usize>,
}

struct State {
    head: u64,
    min_nonce: u64,
    next_nonce: u64,
    fee: FeeParams,
    offline: bool,
    rejections: usize,
    rejection_reason: String,
    default_outcome: MockOutcome,
    rules: Vec<Rule>,
    statuses: HashMap<H256, TxStatus>,
    live_by_nonce: HashMap<u64, H256>,
    submitted: Vec<SignedTransaction>,
    traces: BTreeMap<u64, BlockTrace>,
    messages: Vec<SentMessage>,
}

/// A scriptable [`ChainClient`].
pub struct MockChainClient {
    chain_id: u64,
    state: Mutex<State>,
}

impl MockChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(State {
                head: 0,
                min_nonce: 0,
                next_nonce: 0,
                fee: FeeParams {
                    max_fee_per_gas: 50u64.into(),
                    max_priority_fee_per_gas: 5u64.into(),
                },
                offline: false,
                rejections: 0,
                rejection_reason: String::new(),
                default_outcome: MockOutcome::Confirm,
                rules: Vec::new(),
                statuses: HashMap::new(),
                live_by_nonce: HashMap::new(),
                submitted: Vec::new(),
                traces: BTreeMap::new(),
                messages: Vec::new(),
            }),
        }
    }

    /// Outcome of transactions no rule matches.
    pub fn set_default_outcome(&self, outcome: MockOutcome) {
        self.state.lock().default_outcome = outcome;
    }

    /// Transactions matching `matcher` get `outcome`.
    pub fn on<F>(&self, matcher: F, outcome: MockOutcome)
    where
        F: Fn(&UnsignedTransaction) -> bool + Send + Sync + 'static,
    {
        self.state.lock().rules.push(Rule {
            matcher: Box::new(matcher),
            outcome,
            remaining: None,
        });
    }

    /// Like [`MockChainClient::on`], for the next `times` matching transactions only.
    pub fn on_times<F>(&self, matcher: F, outcome: MockOutcome, times: usize)
    where
        F: Fn(&UnsignedTransaction) -> bool + Send + Sync + 'static,
    {
        self.state.lock().rules.push(Rule {
            matcher: Box::new(matcher),
            outcome,
            remaining: Some(times),
        });
    }

    /// The node refuses the next `count` broadcasts with `reason`.
    pub fn reject_next_submissions(&self, count: usize, reason: &str) {
        let mut state = self.state.lock();
        state.rejections = count;
        state.rejection_reason = reason.to_string();
    }

    /// Every call fails with a transient error while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// The account nonce never goes below `nonce`.
    pub fn set_min_nonce(&self, nonce: u64) {
        self.state.lock().min_nonce = nonce;
    }

    pub fn set_fee(&self, fee: FeeParams) {
        self.state.lock().fee = fee;
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().head = head;
    }

    pub fn advance_blocks(&self, blocks: u64) {
        self.state.lock().head += blocks;
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Overrides what the chain reports for `tx_hash`.
    pub fn set_status(&self, tx_hash: H256, status: TxStatus) {
        self.state.lock().statuses.insert(tx_hash, status);
    }

    /// Adds produced blocks; the head follows the highest one.
    pub fn push_block_traces(&self, traces: impl IntoIterator<Item = BlockTrace>) {
        let mut state = self.state.lock();
        for trace in traces {
            state.head = state.head.max(trace.number);
            state.traces.insert(trace.number, trace);
        }
    }

    /// Adds an emitted message; the head follows its block.
    pub fn push_message(&self, message: SentMessage) {
        let mut state = self.state.lock();
        state.head = state.head.max(message.block_number);
        state.messages.push(message);
    }

    /// Every transaction broadcast so far, replacements included.
    pub fn submitted(&self) -> Vec<UnsignedTransaction> {
        self.state
            .lock()
            .submitted
            .iter()
            .map(|s| s.tx.clone())
            .collect()
    }

    /// Broadcast transactions whose calldata starts with `selector`.
    pub fn submitted_with_selector(
        &self,
        selector: [u8; 4],
    ) -> Vec<UnsignedTransaction> {
        self.submitted()
            .into_iter()
            .filter(|tx| tx.data.starts_with(&selector))
            .collect()
    }

    fn ensure_online(&self, state: &State) -> Result<()> {
        if state.offline {
            return Err(Error::TransientChain(format!(
                "chain {} unreachable",
                self.chain_id
            )));
        }
        Ok(())
    }
}

/// Matches calldata starting with `selector`.
pub fn selector_is(
    selector: [u8; 4],
) -> impl Fn(&UnsignedTransaction) -> bool + Send + Sync + 'static {
    move |tx| tx.data.starts_with(&selector)
}

/// Matches calldata containing `needle` anywhere.
pub fn calldata_contains(
    needle: Vec<u8>,
) -> impl Fn(&UnsignedTransaction) -> bool + Send + Sync + 'static {
    move |tx| {
        !needle.is_empty()
            && tx.data.windows(needle.len()).any(|w| w == needle.as_slice())
    }
}

#[async_trait::async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn block_number(&self) -> Result<u64> {
        let state = self.state.lock();
        self.ensure_online(&state)?;
        Ok(state.head)
    }

    async fn get_nonce(&self, _address: Address) -> Result<u64> {
        let state = self.state.lock();
        self.ensure_online(&state)?;
        Ok(state.next_nonce.max(state.min_nonce))
    }

    async fn suggested_fee(&self) -> Result<FeeParams> {
        let state = self.state.lock();
        self.ensure_online(&state)?;
        Ok(state.fee)
    }

    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<H256> {
        let mut state = self.state.lock();
        self.ensure_online(&state)?;
        if state.rejections > 0 {
            state.rejections -= 1;
            return Err(Error::Submission {
                chain_id: self.chain_id,
                reason: state.rejection_reason.clone(),
            });
        }
        let nonce = tx.tx.nonce;
        if let Some(previous) = state.live_by_nonce.get(&nonce).copied() {
            let previous_status = state.statuses.get(&previous).cloned();
            match previous_status {
                Some(TxStatus::Pending) => {
                    // replaced, the node drops the old one.
                    state.statuses.insert(previous, TxStatus::NotFound);
                }
                Some(TxStatus::Confirmed { .. } | TxStatus::Reverted { .. }) => {
                    return Err(Error::Submission {
                        chain_id: self.chain_id,
                        reason: "nonce too low".into(),
                    });
                }
                _ => {}
            }
        }

        let mut outcome = state.default_outcome.clone();
        let mut exhausted = None;
        for (i, rule) in state.rules.iter_mut().enumerate() {
            if (rule.matcher)(&tx.tx) {
                outcome = rule.outcome.clone();
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                    if *remaining == 0 {
                        exhausted = Some(i);
                    }
                }
                break;
            }
        }
        if let Some(i) = exhausted {
            state.rules.remove(i);
        }

        let status = match outcome {
            MockOutcome::Confirm => {
                state.head += 1;
                TxStatus::Confirmed {
                    block_number: state.head,
                }
            }
            MockOutcome::Revert(reason) => {
                state.head += 1;
                TxStatus::Reverted {
                    block_number: state.head,
                    reason,
                }
            }
            MockOutcome::NeverMine => TxStatus::Pending,
        };
        state.statuses.insert(tx.hash, status);
        state.live_by_nonce.insert(nonce, tx.hash);
        state.next_nonce = state.next_nonce.max(nonce + 1);
        state.submitted.push(tx.clone());
        Ok(tx.hash)
    }

    async fn get_transaction_status(&self, tx_hash: H256) -> Result<TxStatus> {
        let state = self.state.lock();
        self.ensure_online(&state)?;
        Ok(state
            .statuses
            .get(&tx_hash)
            .cloned()
            .unwrap_or(TxStatus::NotFound))
    }

    async fn get_block_trace(&self, number: u64) -> Result<Option<BlockTrace>> {
        let state = self.state.lock();
        self.ensure_online(&state)?;
        Ok(state.traces.get(&number).cloned())
    }

    async fn get_messages(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<SentMessage>> {
        let state = self.state.lock();
        self.ensure_online(&state)?;
        Ok(state
            .messages
            .iter()
            .filter(|m| (from..=to).contains(&m.block_number))
            .cloned()
            .collect())
    }
}
