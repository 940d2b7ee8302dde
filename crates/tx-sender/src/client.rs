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

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{
    Address, Bytes, Eip1559TransactionRequest, H256, U256,
};
use ethers_core::utils::keccak256;
use ethers_signers::LocalWallet;
use rollup_relayer_types::{BlockTrace, FeeParams, SentMessage, TxStatus};
use rollup_relayer_utils::Result;

/// Everything the relayer reads from, or sends to, a chain.
///
/// Implementations report a node rejecting a transaction as
/// [`rollup_relayer_utils::Error::Submission`] and an unreachable node as
/// [`rollup_relayer_utils::Error::TransientChain`].
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// The chain id of the chain this client talks to.
    fn chain_id(&self) -> u64;

    /// The latest block number.
    async fn block_number(&self) -> Result<u64>;

    /// The next nonce of `address`, counting transactions in the mempool.
    async fn get_nonce(&self, address: Address) -> Result<u64>;

    /// Fees the node currently suggests.
    async fn suggested_fee(&self) -> Result<FeeParams>;

    /// Broadcasts a signed transaction and returns its hash.
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<H256>;

    /// One read of the status of `tx_hash`.
    async fn get_transaction_status(&self, tx_hash: H256) -> Result<TxStatus>;

    /// The execution trace of block `number`, if the block exists.
    async fn get_block_trace(&self, number: u64) -> Result<Option<BlockTrace>>;

    /// Cross-chain messages sent in the blocks `from..=to`.
    async fn get_messages(&self, from: u64, to: u64)
        -> Result<Vec<SentMessage>>;
}

/// A transaction ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    pub fee: FeeParams,
}

/// A signed transaction, together with what was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub hash: H256,
    /// RLP encoded signed envelope, as broadcast.
    pub raw: Bytes,
    pub tx: UnsignedTransaction,
}

/// Something able to sign relayer transactions.
pub trait TxSigner: Send + Sync {
    /// The account transactions are sent from.
    fn address(&self) -> Address;

    /// Signs `tx`.
    fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction>;
}

impl TxSigner for LocalWallet {
    fn address(&self) -> Address {
        ethers_signers::Signer::address(self)
    }

    fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction> {
        let request = Eip1559TransactionRequest::new()
            .from(TxSigner::address(self))
            .to(tx.to)
            .value(tx.value)
            .data(tx.data.clone())
            .nonce(tx.nonce)
            .gas(tx.gas_limit)
            .max_fee_per_gas(tx.fee.max_fee_per_gas)
            .max_priority_fee_per_gas(tx.fee.max_priority_fee_per_gas)
            .chain_id(tx.chain_id);
        let typed = TypedTransaction::Eip1559(request);
        let signature = self.sign_transaction_sync(&typed)?;
        let raw = typed.rlp_signed(&signature);
        Ok(SignedTransaction {
            hash: H256(keccak256(&raw)),
            raw,
            tx: tx.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_signs_eip1559_envelopes() {
        let wallet = LocalWallet::from_bytes(&[0x11; 32]).unwrap();
        let tx = UnsignedTransaction {
            chain_id: 1,
            nonce: 3,
            to: Address::repeat_byte(9),
            value: U256::zero(),
            data: vec![1, 2, 3].into(),
            gas_limit: 21_000,
            fee: FeeParams {
                max_fee_per_gas: U256::from(100),
                max_priority_fee_per_gas: U256::from(2),
            },
        };
        let signed = TxSigner::sign(&wallet, &tx).unwrap();
        // typed envelope prefix
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash, H256(keccak256(&signed.raw)));

        let mut bumped = tx.clone();
        bumped.fee = tx.fee.bumped(10);
        let replacement = TxSigner::sign(&wallet, &bumped).unwrap();
        assert_ne!(signed.hash, replacement.hash);
    }
}
