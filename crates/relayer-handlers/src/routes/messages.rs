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

use rollup_relayer_context::RelayerContext;
use rollup_relayer_store::MessageStore;
use rollup_relayer_types::RelayedMessage;
use rollup_relayer_utils::{Error, HandlerError};

/// Handles the relay status of the message with `hash`.
///
/// # Arguments
///
/// * `hash` - `0x` prefixed hex encoded message hash.
pub async fn handle_message_status(
    State(ctx): State<Arc<RelayerContext>>,
    Path(hash): Path<H256>,
) -> Result<Json<RelayedMessage>, HandlerError> {
    let message = ctx
        .store()
        .get_message(hash)?
        .ok_or(Error::MessageNotFound(hash.0))?;
    Ok(Json(message))
}
