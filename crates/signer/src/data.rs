//! What each chain family signs in a round.

use borsh::{BorshDeserialize, BorshSerialize};
use tss_bridge_chains::{claim::claim_digest, client::ZanoEmission, utxo::UnsignedTx};
use tss_bridge_consensus::SigningData;
use tss_bridge_primitives::{chain::ChainType, deposit::Deposit};

/// Signing data that may withdraw a deposit.
pub trait WithdrawalData: SigningData {
    /// The deposit withdrawn, if any.
    fn deposit(&self) -> Option<&Deposit>;
}

/// A claim signature for an EVM, TON or Solana withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ClaimData {
    /// Family of the destination chain, which decides the claim layout.
    pub family: ChainType,

    /// The deposit being withdrawn.
    pub deposit: Deposit,
}

impl SigningData for ClaimData {
    fn digests(&self) -> Vec<[u8; 32]> {
        claim_digest(self.family, &self.deposit).into_iter().collect()
    }
}

impl WithdrawalData for ClaimData {
    fn deposit(&self) -> Option<&Deposit> {
        Some(&self.deposit)
    }
}

/// Why a bitcoin transaction is signed.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum UtxoPurpose {
    /// Pays out a deposit.
    Withdrawal(Deposit),

    /// Merges small bridge outputs into one.
    Consolidation,
}

/// A bitcoin transaction with one digest per input.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct UtxoData {
    /// Why the transaction is signed.
    pub purpose: UtxoPurpose,

    /// The transaction and the outputs it spends.
    pub tx: UnsignedTx,
}

impl SigningData for UtxoData {
    fn digests(&self) -> Vec<[u8; 32]> {
        self.tx.sighashes().unwrap_or_default()
    }
}

impl WithdrawalData for UtxoData {
    fn deposit(&self) -> Option<&Deposit> {
        match &self.purpose {
            UtxoPurpose::Withdrawal(deposit) => Some(deposit),
            UtxoPurpose::Consolidation => None,
        }
    }
}

/// An asset emission of the Zano bridge wallet.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ZanoData {
    /// The deposit being withdrawn.
    pub deposit: Deposit,

    /// The emission prepared by the leader's wallet.
    pub emission: ZanoEmission,
}

impl SigningData for ZanoData {
    fn digests(&self) -> Vec<[u8; 32]> {
        self.emission.digest().into_iter().collect()
    }
}

impl WithdrawalData for ZanoData {
    fn deposit(&self) -> Option<&Deposit> {
        Some(&self.deposit)
    }
}
