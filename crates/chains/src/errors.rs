//! Errors of chain backends and of deposit fetching.

use thiserror::Error;
use tss_bridge_primitives::{chain::ChainId, memo::MemoError};

/// A chain or bridge backend call failed.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// The backend could not be reached or answered with an error.
    #[error("rpc: {0}")]
    Rpc(String),

    /// The backend answered with something that does not make sense.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The chain does not support the operation.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// Not enough spendable outputs for a transaction.
    #[error("insufficient funds: {needed} sat needed, {available} sat available")]
    InsufficientFunds {
        /// Amount the transaction needs, fee included.
        needed: u64,

        /// Amount the wallet can spend.
        available: u64,
    },
}

impl From<jsonrpsee::core::ClientError> for ChainError {
    fn from(value: jsonrpsee::core::ClientError) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// Why a deposit can never be withdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDeposit {
    /// The output or event does not look like a deposit to the bridge.
    #[error("bad deposit script: {0}")]
    Script(String),

    /// The destination memo cannot be decoded.
    #[error("bad memo: {0}")]
    Memo(#[from] MemoError),

    /// The destination address is not valid on the destination chain.
    #[error("bad receiver {0}")]
    Receiver(String),

    /// The destination chain is not bridged.
    #[error("unsupported destination chain {0}")]
    Destination(ChainId),

    /// The amount is below the destination minimum or cannot be converted.
    #[error("bad amount: {0}")]
    Amount(String),

    /// No token pair connects the source token to the destination chain.
    #[error("no token pair for {token} from {source_chain} to {destination_chain}")]
    TokenPair {
        /// Token deposited.
        token: String,

        /// Source chain.
        source_chain: ChainId,

        /// Destination chain.
        destination_chain: ChainId,
    },
}

/// Why a deposit could not be fetched.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The transaction is not in a block yet.
    #[error("transaction is pending")]
    TxPending,

    /// The transaction is in a block without enough confirmations.
    #[error("transaction has {confirmations} of {required} confirmations")]
    TxNotConfirmed {
        /// Confirmations so far.
        confirmations: u64,

        /// Confirmations required.
        required: u64,
    },

    /// The transaction does not exist.
    #[error("transaction {0} not found")]
    TxNotFound(String),

    /// The deposit breaks a bridge rule.
    #[error("invalid deposit: {0}")]
    InvalidDeposit(#[from] InvalidDeposit),

    /// No client is configured for the source chain.
    #[error("unknown chain {0}")]
    UnknownChain(ChainId),

    /// A backend call failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl FetchError {
    /// Whether a later attempt may succeed. Callers must not mark such deposits invalid.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TxPending | Self::TxNotConfirmed { .. } | Self::Chain(_)
        )
    }

    /// Whether the deposit is invalid for good.
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidDeposit(_))
    }
}
