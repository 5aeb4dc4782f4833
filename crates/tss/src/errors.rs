//! Threshold protocol errors.

use std::io;

use thiserror::Error;
use tss_bridge_primitives::party::Address;

/// Errors that end a threshold protocol run.
#[derive(Debug, Error)]
pub enum TssError {
    /// The backend rejected its input or a peer message.
    #[error("backend: {0}")]
    Backend(String),

    /// The local party is not among the participants.
    #[error("{0} does not take part in this run")]
    NotParticipant(Address),

    /// Fewer participants than the protocol needs.
    #[error("{actual} participants, at least {required} required")]
    TooFewParticipants {
        /// Minimum participant count.
        required: usize,

        /// Participants supplied.
        actual: usize,
    },

    /// The run did not finish before its deadline.
    #[error("protocol timed out")]
    Timeout,

    /// The produced signature does not verify against the group key.
    #[error("signature does not verify against the group key")]
    InvalidSignature,

    /// The key share is unusable.
    #[error("invalid key share: {0}")]
    InvalidShare(String),

    /// Reading or writing the key share failed.
    #[error("key share io: {0}")]
    Io(#[from] io::Error),

    /// The key share could not be (de)serialized.
    #[error("key share json: {0}")]
    Json(#[from] serde_json::Error),
}
