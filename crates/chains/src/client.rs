//! What the signer consumes from chain backends.

use std::fmt::Debug;

use async_trait::async_trait;
use bitcoin::{OutPoint, Transaction, Txid};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tss_bridge_primitives::{
    amount::Amount,
    chain::{ChainId, ChainType},
    deposit::DepositIdentifier,
    signature::SignatureData,
};

use crate::{
    errors::{ChainError, FetchError},
    utxo::Utxo,
};

/// A deposit as it appears on its source chain, before any bridge rule is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeposit {
    /// The deposit.
    pub identifier: DepositIdentifier,

    /// Who deposited.
    pub source_address: String,

    /// Token deposited.
    pub token: String,

    /// Amount deposited, in source token units.
    pub amount: Amount,

    /// Height of the including block.
    pub block: u64,

    /// The encoded destination memo.
    pub memo: Vec<u8>,
}

/// Read access to a chain, for every chain family.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// The chain this client talks to.
    fn chain_id(&self) -> &ChainId;

    /// The family of the chain.
    fn chain_type(&self) -> ChainType;

    /// Reads a deposit made on this chain.
    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError>;

    /// Whether `address` is a valid receiver on this chain.
    fn address_valid(&self, address: &str) -> bool;

    /// Whether `hash` is a well-formed transaction hash of this chain.
    fn transaction_hash_valid(&self, hash: &str) -> bool;

    /// Whether `amount` can be withdrawn on this chain.
    fn withdrawal_amount_valid(&self, amount: &Amount) -> bool {
        *amount > Amount::ZERO
    }
}

/// A bitcoin-family chain whose withdrawals the bridge builds and broadcasts itself.
#[async_trait]
pub trait UtxoClient: ChainClient {
    /// The network addresses are checked against.
    fn network(&self) -> bitcoin::Network;

    /// Confirmed outputs the bridge can spend, excluding locked ones.
    async fn list_unspent(&self) -> Result<Vec<Utxo>, ChainError>;

    /// The fee rate withdrawals should pay, in sat/vB.
    async fn fee_rate(&self) -> Result<u64, ChainError>;

    /// Excludes outputs from [`Self::list_unspent`] until they are spent.
    async fn lock_outputs(&self, outpoints: &[OutPoint]) -> Result<(), ChainError>;

    /// Broadcasts a signed transaction.
    async fn send_signed_transaction(&self, tx: &Transaction) -> Result<Txid, ChainError>;
}

/// An asset emission prepared by the Zano wallet, waiting for the bridge signature.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct ZanoEmission {
    /// Hex id of the transaction, which is also the digest to sign.
    pub verified_tx_id: String,

    /// Hex encoded unsigned transaction.
    pub unsigned_tx: String,

    /// Hex encoded finalized transaction.
    pub finalized_tx: String,

    /// Hex encoded one-time transaction key.
    pub tx_secret_key: String,

    /// Receivers of the outputs.
    pub outputs_addresses: Vec<String>,
}

impl ZanoEmission {
    /// The digest the group signs.
    pub fn digest(&self) -> Result<[u8; 32], ChainError> {
        let bytes = hex::decode(&self.verified_tx_id)
            .map_err(|e| ChainError::InvalidResponse(format!("tx id: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| ChainError::InvalidResponse("tx id is not 32 bytes".into()))
    }
}

/// The Zano wallet of the bridge, which emits wrapped assets.
#[async_trait]
pub trait ZanoClient: ChainClient {
    /// Prepares an emission of `amount` of `asset_id` to `receiver`.
    async fn emit_asset(
        &self,
        asset_id: &str,
        receiver: &str,
        amount: &Amount,
    ) -> Result<ZanoEmission, ChainError>;

    /// Whether `emission` emits exactly `amount` of `asset_id` to `receiver`.
    async fn verify_emission(
        &self,
        emission: &ZanoEmission,
        asset_id: &str,
        receiver: &str,
        amount: &Amount,
    ) -> Result<bool, ChainError>;

    /// Submits an emission with the bridge signature, returning the transaction hash.
    async fn send_signed_emission(
        &self,
        emission: &ZanoEmission,
        signature: &SignatureData,
    ) -> Result<String, ChainError>;
}
