//! Digests of withdrawals that the receiver claims on the destination chain.
//!
//! For EVM, TON and Solana the bridge does not send anything itself: it signs a claim that the
//! receiver or an aggregator later presents to the bridge contract.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tss_bridge_primitives::{
    chain::{ChainId, ChainType},
    deposit::{Deposit, DepositIdentifier},
    evm::{keccak256, withdrawal_digest},
    memo::infer_address_family,
};

use crate::{
    client::{ChainClient, RawDeposit},
    errors::{ChainError, FetchError, InvalidDeposit},
};

const SOLANA_PUBKEY_LEN: usize = 32;

/// The digest the group signs to let `deposit` be claimed on a chain of `family`.
pub fn claim_digest(family: ChainType, deposit: &Deposit) -> Result<[u8; 32], InvalidDeposit> {
    match family {
        ChainType::Evm => {
            withdrawal_digest(deposit).map_err(|e| InvalidDeposit::Receiver(e.to_string()))
        }
        ChainType::Ton => Ok(Sha256::digest(ton_preimage(deposit)).into()),
        ChainType::Solana => solana_preimage(deposit).map(|p| keccak256(&p)),
        ChainType::Bitcoin | ChainType::Zano => {
            Err(InvalidDeposit::Destination(deposit.destination_chain_id.clone()))
        }
    }
}

/// Common tail of the non-EVM preimages: source tx, nonce and wrapping flag.
fn source_fields(deposit: &Deposit, out: &mut Vec<u8>) {
    out.extend_from_slice(deposit.identifier.tx_hash.as_bytes());
    out.extend_from_slice(&deposit.identifier.tx_nonce.to_be_bytes());
    out.extend_from_slice(deposit.destination_chain_id.as_str().as_bytes());
    out.push(u8::from(deposit.is_wrapped_token));
}

// TON addresses are hashed in their user-friendly text form; the contract keeps them that way.
fn ton_preimage(deposit: &Deposit) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(deposit.withdrawal_token.as_bytes());
    out.extend_from_slice(&deposit.withdrawal_amount.to_be_bytes());
    out.extend_from_slice(deposit.destination_address.as_bytes());
    source_fields(deposit, &mut out);
    out
}

fn solana_preimage(deposit: &Deposit) -> Result<Vec<u8>, InvalidDeposit> {
    let decode = |text: &str| {
        bs58::decode(text)
            .into_vec()
            .ok()
            .filter(|b| b.len() == SOLANA_PUBKEY_LEN)
    };
    let receiver = decode(&deposit.destination_address)
        .ok_or_else(|| InvalidDeposit::Receiver(deposit.destination_address.clone()))?;
    let mint = decode(&deposit.withdrawal_token).ok_or_else(|| InvalidDeposit::TokenPair {
        token: deposit.withdrawal_token.clone(),
        source_chain: deposit.identifier.chain_id.clone(),
        destination_chain: deposit.destination_chain_id.clone(),
    })?;

    let mut out = Vec::new();
    out.extend_from_slice(&mint);
    out.extend_from_slice(&deposit.withdrawal_amount.to_be_bytes());
    out.extend_from_slice(&receiver);
    source_fields(deposit, &mut out);
    Ok(out)
}

/// A chain the bridge only withdraws to, by signed claims.
///
/// Deposits are not read from such chains, so the client only validates receivers.
#[derive(Debug, Clone)]
pub struct ClaimChain {
    chain_id: ChainId,
    family: ChainType,
}

impl ClaimChain {
    /// A withdrawal-only chain of a claim-based `family`.
    pub fn new(chain_id: ChainId, family: ChainType) -> Self {
        Self { chain_id, family }
    }
}

#[async_trait]
impl ChainClient for ClaimChain {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        self.family
    }

    async fn deposit_data(&self, _id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        Err(ChainError::Unsupported("deposits from a withdrawal-only chain").into())
    }

    fn address_valid(&self, address: &str) -> bool {
        infer_address_family(address).is_ok_and(|family| family == self.family)
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        !hash.is_empty()
    }
}
