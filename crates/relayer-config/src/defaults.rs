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

/// The default port the relayer will listen on. Defaults to 9955.
pub const fn port() -> u16 {
    9955
}
/// A mined transaction counts after `1` block by default.
pub const fn block_confirmations() -> u64 {
    1
}
/// The maximum blocks per step is set to `100` by default.
pub const fn max_blocks_per_step() -> u64 {
    100
}
/// A transaction is bumped after `120_000` ms without being mined.
pub const fn tx_timeout() -> u64 {
    120_000
}
/// Fee bumps raise the fees by `10` percent by default.
pub const fn fee_bump_percent() -> u64 {
    10
}
/// `1_000` gwei.
pub const fn fee_bump_ceiling() -> u64 {
    1_000_000_000_000
}
/// A transaction is stuck after `5` fee bumps.
pub const fn max_bump_attempts() -> u32 {
    5
}
/// Gas limit of relayer transactions, `5_000_000` by default.
pub const fn gas_limit() -> u64 {
    5_000_000
}
/// A broadcast is attempted `5` times before giving up.
pub const fn max_submit_attempts() -> usize {
    5
}
/// `1_000` ms between two broadcast attempts.
pub const fn submit_retry_interval() -> u64 {
    1_000
}
/// A batch is sealed at `100` blocks by default.
pub const fn batch_blocks_threshold() -> usize {
    100
}
/// A batch is sealed at `120_000` encoded bytes by default.
pub const fn batch_bytes_threshold() -> usize {
    120_000
}
/// A partial batch is sealed after `300_000` ms.
pub const fn batch_timeout() -> u64 {
    300_000
}
/// The batch relayer ticks every `3_000` ms by default.
pub const fn commit_poll_interval() -> u64 {
    3_000
}
/// One commit in flight at a time by default.
pub const fn max_inflight_commits() -> usize {
    1
}
/// Transient reverts are retried `3` times by default.
pub const fn max_revert_retries() -> u32 {
    3
}
/// Message relaying is enabled by default.
pub const fn enabled() -> bool {
    true
}
/// The message relayers tick every `3_000` ms by default.
pub const fn check_interval() -> u64 {
    3_000
}

/// Revert reasons that no retry can fix.
pub fn permanent_revert_reasons() -> Vec<String> {
    [
        "duplicate index",
        "batch already committed",
        "batch already finalized",
        "incorrect batch index",
        "incorrect parent batch hash",
        "invalid batch",
        "message already relayed",
        "message expired",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
