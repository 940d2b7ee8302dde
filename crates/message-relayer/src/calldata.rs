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

use ethers_core::abi::{self, Token};
use ethers_core::types::{Bytes, U256};
use ethers_core::utils::id;
use rollup_relayer_types::RelayedMessage;

/// `relayMessage` of the messenger contract.
pub const RELAY_MESSAGE: &str =
    "relayMessage(address,address,uint256,uint256,bytes)";

pub fn relay_message_selector() -> [u8; 4] {
    id(RELAY_MESSAGE)
}

/// Calldata delivering `message` on its destination chain.
pub fn relay_message(message: &RelayedMessage) -> Bytes {
    let mut data = relay_message_selector().to_vec();
    data.extend(abi::encode(&[
        Token::Address(message.sender),
        Token::Address(message.target),
        Token::Uint(message.value),
        Token::Uint(U256::from(message.message_index)),
        Token::Bytes(message.payload.to_vec()),
    ]));
    data.into()
}
