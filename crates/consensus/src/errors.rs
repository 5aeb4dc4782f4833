//! Consensus errors.

use thiserror::Error;
use tss_bridge_broadcast::BroadcastError;

/// Why a consensus or distribution phase ended without a result.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// A reliable broadcast delivered nothing.
    #[error("broadcast: {0}")]
    Broadcast(#[from] BroadcastError),

    /// Too few parties accepted the proposal.
    #[error("{acceptors} acceptors, {required} required")]
    TooFewAcceptors {
        /// Acceptors besides the leader.
        acceptors: usize,

        /// Acceptors besides the leader needed to fill the signer set.
        required: usize,
    },

    /// There is no party to lead the round.
    #[error("empty party set")]
    EmptyPartySet,

    /// A delivered value could not be decoded.
    #[error("malformed {what}: {reason}")]
    Malformed {
        /// What was being decoded.
        what: &'static str,

        /// Decoder error.
        reason: String,
    },

    /// The mechanism failed to form a proposal.
    #[error("mechanism: {0}")]
    Mechanism(String),

    /// A distributed signature does not verify.
    #[error("distributed signature {index} does not verify")]
    InvalidSignature {
        /// Position of the signature.
        index: usize,
    },

    /// The number of distributed signatures does not match the number of digests.
    #[error("{actual} signatures distributed, {expected} expected")]
    SignatureCount {
        /// Digests signed in the round.
        expected: usize,

        /// Signatures received.
        actual: usize,
    },
}

impl ConsensusError {
    /// A [`ConsensusError::Malformed`] error.
    pub fn malformed(what: &'static str, reason: impl ToString) -> Self {
        Self::Malformed {
            what,
            reason: reason.to_string(),
        }
    }
}
