//! Broadcast errors.

use thiserror::Error;
use tss_bridge_primitives::{party::Address, session::SessionId};

/// Why a broadcast delivered nothing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// No value with a complete signature chain arrived before the deadline.
    #[error("no value was delivered")]
    NotDelivered,

    /// The proposer signed more than one value.
    #[error("proposer equivocated with {0} distinct values")]
    Equivocation(usize),
}

/// Why an inbound round message was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidMessage {
    /// The payload is not a round message.
    #[error("malformed round message: {0}")]
    Malformed(String),

    /// The message belongs to another session.
    #[error("message for session {0}")]
    WrongSession(SessionId),

    /// The round exceeds the last relay round.
    #[error("round {0} is past the last relay round")]
    RoundTooHigh(u32),

    /// The sender already sent a message for this round.
    #[error("second message from {sender} in round {round}")]
    Duplicate {
        /// The offending party.
        sender: Address,

        /// The repeated round.
        round: u32,
    },

    /// The chain does not carry `round + 1` signatures.
    #[error("chain of {actual} signatures, expected {expected}")]
    ChainLength {
        /// `round + 1`.
        expected: usize,

        /// What the message carries.
        actual: usize,
    },

    /// A signer is not part of the party set.
    #[error("unknown signer {0}")]
    UnknownSigner(Address),

    /// A signer appears twice in the chain.
    #[error("duplicate signer {0}")]
    DuplicateSigner(Address),

    /// The chain does not start with the proposer.
    #[error("chain starts with {0} instead of the proposer")]
    WrongProposer(Address),

    /// The chain does not end with the party that sent the message.
    #[error("chain ends with {last} but was sent by {sender}")]
    WrongSender {
        /// The authenticated sender.
        sender: Address,

        /// The last signer of the chain.
        last: Address,
    },

    /// A signature does not verify.
    #[error("invalid signature by {0}")]
    BadSignature(Address),
}
