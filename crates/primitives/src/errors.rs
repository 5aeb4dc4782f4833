//! Parse errors for the primitive types.

use thiserror::Error;

/// Errors that occur while parsing a primitive from its textual or binary form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The party address is not a valid bech32 string with the expected prefix.
    #[error("invalid party address: {0}")]
    InvalidAddress(String),

    /// The session identifier does not match any known layout.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// The withdrawal status is not one of the known values.
    #[error("unknown withdrawal status: {0}")]
    InvalidStatus(String),

    /// The amount is not a base-10 unsigned integer that fits in 256 bits.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The commission rate is not a non-negative decimal number.
    #[error("invalid commission rate: {0}")]
    InvalidRate(String),

    /// The chain type is not supported.
    #[error("unknown chain type: {0}")]
    InvalidChainType(String),

    /// A signature encoding could not be decoded.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),
}
