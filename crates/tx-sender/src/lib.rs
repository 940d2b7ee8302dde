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

//! # Relayer Transaction Sender 🕸️
//!
//! Sends the relayer transactions of one signing identity on one chain and
//! follows them until they are settled.
//!
//! ## Overview
//!
//! * [`TxSender`] allocates nonces, prices, signs and broadcasts
//!   transactions, and replaces them with higher fees when they are stuck.
//! * [`ConfirmationTracker`] polls the chain for the outcome of a pending
//!   transaction, including every hash it was replaced by.
//! * [`RevertClassifier`] tells permanent reverts from retryable ones.
//!
//! The chain itself is reached through the [`ChainClient`] trait and keys
//! through the [`TxSigner`] trait.

/// Chain client and signer abstractions.
pub mod client;
/// A scriptable in-memory chain for tests.
#[cfg(any(test, feature = "mock"))]
pub mod mock;
/// Revert reason classification.
pub mod revert;
/// Nonce allocation, submission and fee bumping.
pub mod sender;
/// Confirmation polling.
pub mod tracker;

pub use client::{ChainClient, SignedTransaction, TxSigner, UnsignedTransaction};
pub use revert::RevertClassifier;
pub use sender::TxSender;
pub use tracker::{Confirmation, ConfirmationTracker};
