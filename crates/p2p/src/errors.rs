//! Transport errors.

use std::io;

use quinn::{ConnectError, ConnectionError, ReadExactError, WriteError};
use thiserror::Error;
use tss_bridge_primitives::party::Address;

use crate::wire::RpcError;

/// Errors that can occur when sending a message to a peer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The destination is not a configured peer.
    #[error("unknown peer {0}")]
    UnknownPeer(Address),

    /// The connection could not be initiated.
    #[error("connect: {0}")]
    Connect(#[from] ConnectError),

    /// The connection failed or was closed.
    #[error("connection: {0}")]
    Connection(#[from] ConnectionError),

    /// Writing the request failed.
    #[error("write: {0}")]
    Write(#[from] WriteError),

    /// Reading the response failed.
    #[error("read: {0}")]
    Read(#[from] ReadExactError),

    /// A frame could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(#[from] io::Error),

    /// The peer did not answer in time.
    #[error("request timed out")]
    Timeout,

    /// The peer rejected the request.
    #[error("rejected by peer: {0}")]
    Rejected(RpcError),

    /// The peer answered with a response of the wrong kind.
    #[error("unexpected response")]
    UnexpectedResponse,
}

/// Errors that occur while setting up a QUIC endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The TLS configuration cannot be used for QUIC.
    #[error("tls configuration has no initial cipher suite")]
    NoInitialCipherSuite(#[from] quinn::crypto::rustls::NoInitialCipherSuite),

    /// The endpoint could not be bound.
    #[error("bind: {0}")]
    Bind(#[from] io::Error),
}
