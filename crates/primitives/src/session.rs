//! Session identifiers.
//!
//! Every message exchanged between parties is tagged with the identifier of the session it
//! belongs to. Signing sessions are scoped to a chain and carry a monotonically increasing
//! counter, so that the same logical session can advance by renaming rather than by being
//! recreated.

use std::{fmt, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{chain::ChainId, errors::ParseError};

const KEYGEN_PREFIX: &str = "KEYGEN_";
const SIGN_PREFIX: &str = "SIGN_";
const DEPOSIT_DISTRIBUTION: &str = "DEPOSIT_DISTRIBUTION";

/// The kind of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum SessionKind {
    /// Distributed key generation.
    Keygen,

    /// Periodic withdrawal signing for a single chain.
    Sign,

    /// The long-lived deposit distribution session.
    DepositDistribution,
}

/// Where a session is in its current round.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Sleeping until the round starts.
    AwaitingStart,

    /// Agreeing on what to sign and who signs it.
    Consensus,

    /// Running threshold signing.
    Signing,

    /// Handing signatures to the parties that did not sign.
    Distributing,

    /// Persisting and submitting the signed artifact.
    Finalizing,

    /// The session has nothing left to do.
    Done,
}

/// Identifies a session, e.g. `SIGN_bitcoin_42`.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId {
    kind: SessionKind,
    scope: String,
    counter: u64,
}

impl SessionId {
    /// A signing session for `chain` with the given counter.
    pub fn sign(chain: &ChainId, counter: u64) -> Self {
        Self {
            kind: SessionKind::Sign,
            scope: chain.to_string(),
            counter,
        }
    }

    /// A key generation session with the given counter.
    pub fn keygen(counter: u64) -> Self {
        Self {
            kind: SessionKind::Keygen,
            scope: String::new(),
            counter,
        }
    }

    /// The deposit distribution session.
    pub fn deposit_distribution() -> Self {
        Self {
            kind: SessionKind::DepositDistribution,
            scope: String::new(),
            counter: 0,
        }
    }

    /// The kind of this session.
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// The chain a signing session is scoped to. Empty for other kinds.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The session counter.
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// The identifier of the session that follows this one.
    pub fn next(&self) -> Self {
        Self {
            kind: self.kind,
            scope: self.scope.clone(),
            counter: self.counter + 1,
        }
    }

    /// The identifier of this session with `counter` replaced.
    pub fn with_counter(&self, counter: u64) -> Self {
        Self {
            kind: self.kind,
            scope: self.scope.clone(),
            counter,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SessionKind::Keygen => write!(f, "{KEYGEN_PREFIX}{}", self.counter),
            SessionKind::Sign => write!(f, "{SIGN_PREFIX}{}_{}", self.scope, self.counter),
            SessionKind::DepositDistribution => f.write_str(DEPOSIT_DISTRIBUTION),
        }
    }
}

impl FromStr for SessionId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidSessionId(s.to_string());

        if s == DEPOSIT_DISTRIBUTION {
            return Ok(Self::deposit_distribution());
        }

        if let Some(counter) = s.strip_prefix(KEYGEN_PREFIX) {
            let counter = counter.parse().map_err(|_| invalid())?;
            return Ok(Self::keygen(counter));
        }

        if let Some(rest) = s.strip_prefix(SIGN_PREFIX) {
            let (scope, counter) = rest.rsplit_once('_').ok_or_else(invalid)?;
            if scope.is_empty() {
                return Err(invalid());
            }

            let counter = counter.parse().map_err(|_| invalid())?;
            return Ok(Self {
                kind: SessionKind::Sign,
                scope: scope.to_string(),
                counter,
            });
        }

        Err(invalid())
    }
}

impl TryFrom<String> for SessionId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.to_string()
    }
}
