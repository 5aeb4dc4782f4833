//! Deposits and the lifecycle of the withdrawal they request.

use std::{fmt, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{amount::Amount, chain::ChainId, errors::ParseError};

/// Uniquely identifies a deposit across all source chains.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct DepositIdentifier {
    /// Hash of the source chain transaction.
    pub tx_hash: String,

    /// Index of the deposit event (or output) within the transaction.
    pub tx_nonce: u64,

    /// The chain the deposit was made on.
    pub chain_id: ChainId,
}

impl DepositIdentifier {
    /// Creates a new identifier.
    pub fn new(tx_hash: impl Into<String>, tx_nonce: u64, chain_id: ChainId) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            tx_nonce,
            chain_id,
        }
    }
}

impl fmt::Display for DepositIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.tx_hash, self.tx_nonce, self.chain_id)
    }
}

/// The status of the withdrawal a deposit requests.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Waiting to be selected by a signing session.
    Pending,

    /// Selected by a signing session that has not finished yet.
    Processing,

    /// Signed, and submitted where the destination requires it.
    Processed,

    /// Withdrawal was abandoned.
    Failed,

    /// The deposit does not satisfy the bridge rules and will never be withdrawn.
    Invalid,
}

impl WithdrawalStatus {
    /// Whether no further transitions are allowed from this status.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed | Self::Invalid)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Processing -> Pending` is only legal as the rollback of a failed session.
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use WithdrawalStatus::*;

        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Invalid)
                | (Pending, Failed)
                | (Processing, Processed)
                | (Processing, Pending)
                | (Processing, Failed)
                | (Processing, Invalid)
        )
    }

    /// Database and RPC representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Failed => "FAILED",
            Self::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WithdrawalStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "PROCESSED" => Ok(Self::Processed),
            "FAILED" => Ok(Self::Failed),
            "INVALID" => Ok(Self::Invalid),
            other => Err(ParseError::InvalidStatus(other.to_string())),
        }
    }
}

/// A deposit together with the withdrawal it requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Deposit {
    /// Identifies the deposit.
    pub identifier: DepositIdentifier,

    /// Depositor on the source chain.
    pub source_address: String,

    /// Amount deposited, in source token units.
    pub deposit_amount: Amount,

    /// Token deposited on the source chain.
    pub deposit_token: String,

    /// Height of the block the deposit was included in.
    pub deposit_block: u64,

    /// Receiver on the destination chain.
    pub destination_address: String,

    /// Chain the withdrawal is made on.
    pub destination_chain_id: ChainId,

    /// Amount withdrawn, in destination token units, after commission.
    pub withdrawal_amount: Amount,

    /// Token withdrawn on the destination chain.
    pub withdrawal_token: String,

    /// Whether the destination token is a wrapped representation minted by the bridge.
    pub is_wrapped_token: bool,

    /// Referral attached to the deposit memo.
    pub referral_id: u16,

    /// Current withdrawal status.
    pub status: WithdrawalStatus,

    /// Hex encoded bridge signature, for chains where the user claims the withdrawal.
    pub signature: Option<String>,

    /// Hash of the withdrawal transaction, for chains where the bridge submits it.
    pub withdrawal_tx_hash: Option<String>,

    /// Whether this node has already announced the deposit to its peers.
    pub distributed: bool,
}

impl Deposit {
    /// Whether `other` requests the same withdrawal as `self`.
    ///
    /// Ignores bookkeeping that legitimately differs between nodes: status, signature,
    /// withdrawal transaction hash and the distributed flag.
    pub fn same_withdrawal(&self, other: &Deposit) -> bool {
        self.identifier == other.identifier
            && self.source_address == other.source_address
            && self.deposit_amount == other.deposit_amount
            && self.deposit_token == other.deposit_token
            && self.deposit_block == other.deposit_block
            && self.destination_address == other.destination_address
            && self.destination_chain_id == other.destination_chain_id
            && self.withdrawal_amount == other.withdrawal_amount
            && self.withdrawal_token == other.withdrawal_token
            && self.is_wrapped_token == other.is_wrapped_token
            && self.referral_id == other.referral_id
    }

    /// Creates an invalid placeholder row for a deposit that could not be parsed.
    pub fn invalid(identifier: DepositIdentifier) -> Self {
        Self {
            identifier,
            source_address: String::new(),
            deposit_amount: Amount::ZERO,
            deposit_token: String::new(),
            deposit_block: 0,
            destination_address: String::new(),
            destination_chain_id: ChainId::from(""),
            withdrawal_amount: Amount::ZERO,
            withdrawal_token: String::new(),
            is_wrapped_token: false,
            referral_id: 0,
            status: WithdrawalStatus::Invalid,
            signature: None,
            withdrawal_tx_hash: None,
            distributed: true,
        }
    }
}
