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

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sled::transaction::TransactionError;

/// Metrics functionality
pub mod metric;
/// A module used for debugging relayer lifecycle, sync state, or other relayer state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// An enum of all possible errors that could be encountered during the execution of the
/// Rollup Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while decoding a hex string.
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// HTTP Error
    #[error(transparent)]
    Hyper(#[from] hyper::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Local wallet error while signing a transaction.
    #[error(transparent)]
    Wallet(#[from] ethers_signers::WalletError),
    #[error(transparent)]
    PrometheusError(#[from] prometheus::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// The loaded configuration is not usable.
    #[error("Invalid configuration: {}", _0)]
    InvalidConfig(String),
    /// Malformed batch inputs, never retried.
    #[error("Invalid input: {}", _0)]
    InvalidInput(String),
    /// The chain rejected the transaction at broadcast time.
    #[error("Submission to chain {chain_id} rejected: {reason}")]
    Submission {
        /// The chain the transaction was sent to.
        chain_id: u64,
        /// The rejection reason reported by the node.
        reason: String,
    },
    /// A transaction stayed unconfirmed after every allowed fee bump.
    #[error("Transaction 0x{} is stuck after {attempts} fee bumps", hex::encode(tx_hash))]
    StuckTransaction {
        /// The hash of the last replacement sent.
        tx_hash: [u8; 32],
        /// How many bumps were already made.
        attempts: u32,
    },
    /// The contract reverted the transaction.
    #[error("Reverted (permanent: {permanent}): {reason}")]
    Revert {
        /// Revert string reported by the chain.
        reason: String,
        /// Whether retrying could ever succeed.
        permanent: bool,
    },
    /// Node unreachable, RPC timeout, ...etc.
    #[error("Transient chain error: {}", _0)]
    TransientChain(String),
    /// A batch or message was asked to move to a state it cannot reach.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: String,
        /// The requested state.
        to: String,
    },
    /// Two different messages share the same source index.
    #[error("Message index {index} from {source_layer} is already taken by another message")]
    DuplicateMessageIndex {
        /// Source layer of the message.
        source_layer: String,
        /// The message index.
        index: u64,
    },
    /// Batch not found in the store.
    #[error("Batch #{} not found", _0)]
    BatchNotFound(u64),
    /// Message not found in the store.
    #[error("Message 0x{} not found", hex::encode(_0))]
    MessageNotFound([u8; 32]),
    /// Pending transaction not found in the store.
    #[error("Pending transaction 0x{} not found", hex::encode(_0))]
    PendingTxNotFound([u8; 32]),
    /// Missing Secrets in the config, the Private key.
    #[error("Missing required private-key in the config")]
    MissingSecrets,
}

impl Error {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Used to decide between [`backoff::Error::transient`] and
    /// [`backoff::Error::permanent`].
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientChain(_)
                | Self::Submission { .. }
                | Self::Io(_)
                | Self::Sled(_)
        )
    }

    /// Wraps the error for the `backoff` crate based on [`Error::is_transient`].
    pub fn into_backoff(self) -> backoff::Error<Self> {
        if self.is_transient() {
            backoff::Error::transient(self)
        } else {
            backoff::Error::permanent(self)
        }
    }
}

impl From<TransactionError<Error>> for Error {
    fn from(e: TransactionError<Error>) -> Self {
        match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => Error::Sled(e),
        }
    }
}

/// A type alias for the result for rollup relayer, that uses the `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for HandlerError {
    fn from(value: Error) -> Self {
        let status = match value {
            Error::BatchNotFound(_)
            | Error::MessageNotFound(_)
            | Error::PendingTxNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::Hex(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HandlerError(status, value.to_string())
    }
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub struct HandlerError(
    /// HTTP status code for response
    pub StatusCode,
    /// Response message
    pub String,
);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retried() {
        let err = Error::TransientChain("connection refused".into());
        assert!(err.is_transient());
        assert!(matches!(err.into_backoff(), backoff::Error::Transient { .. }));

        let err = Error::InvalidInput("empty blocks".into());
        assert!(!err.is_transient());
        assert!(matches!(err.into_backoff(), backoff::Error::Permanent(_)));
    }

    #[test]
    fn sled_transaction_abort_unwraps_inner_error() {
        let err: Error =
            TransactionError::Abort(Error::BatchNotFound(7)).into();
        assert!(matches!(err, Error::BatchNotFound(7)));
    }
}
