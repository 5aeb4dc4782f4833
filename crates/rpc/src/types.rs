//! Types for the RPC server.

use serde::{Deserialize, Serialize};
use tss_bridge_primitives::{
    amount::Amount,
    chain::ChainId,
    deposit::{Deposit, WithdrawalStatus},
    party::Address,
};

/// The local party as reported to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcPartyStatus {
    /// Address of the local party.
    pub address: Address,

    /// Whether the node takes part in sessions.
    pub ready: bool,

    /// Number of parties in the signing group, the local one included.
    pub parties: usize,

    /// Size of the signer set of a signing round.
    pub threshold: usize,
}

/// A deposit and the progress of the withdrawal it requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcWithdrawal {
    /// Chain the deposit was made on.
    pub chain_id: ChainId,

    /// Hash of the deposit transaction.
    pub tx_hash: String,

    /// Index of the deposit within its transaction.
    pub tx_nonce: u64,

    /// Depositor on the source chain.
    pub source_address: String,

    /// Amount deposited.
    pub deposit_amount: Amount,

    /// Receiver on the destination chain.
    pub destination_address: String,

    /// Chain the withdrawal is made on.
    pub destination_chain_id: ChainId,

    /// Amount withdrawn, after commission.
    pub withdrawal_amount: Amount,

    /// Token withdrawn.
    pub withdrawal_token: String,

    /// Current status.
    pub status: WithdrawalStatus,

    /// Signature the receiver claims the withdrawal with, on chains where they do.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,

    /// Hash of the withdrawal transaction, on chains where the bridge submits it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub withdrawal_tx_hash: Option<String>,
}

impl From<Deposit> for RpcWithdrawal {
    fn from(deposit: Deposit) -> Self {
        Self {
            chain_id: deposit.identifier.chain_id,
            tx_hash: deposit.identifier.tx_hash,
            tx_nonce: deposit.identifier.tx_nonce,
            source_address: deposit.source_address,
            deposit_amount: deposit.deposit_amount,
            destination_address: deposit.destination_address,
            destination_chain_id: deposit.destination_chain_id,
            withdrawal_amount: deposit.withdrawal_amount,
            withdrawal_token: deposit.withdrawal_token,
            status: deposit.status,
            signature: deposit.signature,
            withdrawal_tx_hash: deposit.withdrawal_tx_hash,
        }
    }
}
