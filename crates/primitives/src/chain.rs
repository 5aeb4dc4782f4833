//! Chain identifiers and families.

use std::{fmt, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// Identifies a chain, e.g. `"1"` for Ethereum mainnet or `"bitcoin"`.
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
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    /// Creates a chain identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ChainId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The family a chain belongs to. Determines how withdrawals to it are signed and finalized.
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
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// EVM compatible chains. Withdrawals are claimed by the user with a bridge signature.
    Evm,

    /// Bitcoin. Withdrawals are batched into a transaction spending bridge outputs.
    Bitcoin,

    /// Zano. Withdrawals are asset emissions.
    Zano,

    /// TON. Withdrawals are claimed by the user with a bridge signature.
    Ton,

    /// Solana. Withdrawals are claimed by the user with a bridge signature.
    Solana,
}

impl ChainType {
    /// Whether withdrawals on this chain are claimed by the user with a per-deposit signature.
    pub const fn is_claim_based(&self) -> bool {
        matches!(self, Self::Evm | Self::Ton | Self::Solana)
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Evm => "evm",
            Self::Bitcoin => "bitcoin",
            Self::Zano => "zano",
            Self::Ton => "ton",
            Self::Solana => "solana",
        };
        f.write_str(s)
    }
}

impl FromStr for ChainType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evm" => Ok(Self::Evm),
            "bitcoin" => Ok(Self::Bitcoin),
            "zano" => Ok(Self::Zano),
            "ton" => Ok(Self::Ton),
            "solana" => Ok(Self::Solana),
            other => Err(ParseError::InvalidChainType(other.to_string())),
        }
    }
}
