//! Messages exchanged over the P2P surface and their framing.
//!
//! A frame is a little-endian [`LengthUint`] followed by that many bytes of a borsh encoded
//! [`ClientMessage`] or [`ServerMessage`]. Each request opens its own bidirectional stream and
//! receives exactly one response frame.

use std::{fmt, io};

use borsh::{BorshDeserialize, BorshSerialize};
use tss_bridge_primitives::{
    party::Address,
    session::{SessionId, SessionKind, SessionState},
};

/// Length prefix of a frame.
pub type LengthUint = u32;

/// Frames longer than this are rejected before allocating.
pub const MAX_FRAME_LEN: LengthUint = 16 * 1024 * 1024;

/// What a [`SubmitRequest`] carries. Sessions dispatch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub enum RequestType {
    /// Key generation protocol message.
    Keygen,

    /// Threshold signing protocol message.
    Sign,

    /// Reliable broadcast of a consensus proposal.
    Proposal,

    /// Acceptance vote sent to the leader.
    Acceptance,

    /// Reliable broadcast of the chosen signer set.
    SignStart,

    /// Reliable broadcast of produced signatures.
    SignatureDistribution,

    /// Announcement of newly observed deposits.
    DepositDistribution,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Keygen => "KEYGEN",
            Self::Sign => "SIGN",
            Self::Proposal => "PROPOSAL",
            Self::Acceptance => "ACCEPTANCE",
            Self::SignStart => "SIGN_START",
            Self::SignatureDistribution => "SIGNATURE_DISTRIBUTION",
            Self::DepositDistribution => "DEPOSIT_DISTRIBUTION",
        };
        f.write_str(s)
    }
}

/// A message from one party to a session of another.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SubmitRequest {
    /// The party that sent the message. Must match the authenticated peer.
    pub sender: Address,

    /// The session the message is for.
    pub session_id: SessionId,

    /// What the payload is.
    pub request_type: RequestType,

    /// Opaque, session-specific bytes.
    pub payload: Vec<u8>,
}

impl SubmitRequest {
    /// Creates a request.
    pub fn new(
        sender: Address,
        session_id: SessionId,
        request_type: RequestType,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            sender,
            session_id,
            request_type,
            payload,
        }
    }
}

/// Readiness of a party.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PartyStatus {
    /// The party's address.
    pub address: Address,

    /// Whether the party has finished starting up and accepts session traffic.
    pub ready: bool,
}

/// Where a session currently is.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SessionInfo {
    /// Current identifier of the session.
    pub session_id: SessionId,

    /// Current phase.
    pub state: SessionState,

    /// Unix timestamp in milliseconds at which the next round starts.
    pub next_start_ms: u64,
}

/// Coarse classification of a rejected request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ErrorCode {
    /// The request is malformed or not authorized.
    InvalidArgument,

    /// No session matches the request.
    NotFound,

    /// The receiver failed to process a valid request.
    Internal,
}

/// A rejected request.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct RpcError {
    /// Classification.
    pub code: ErrorCode,

    /// Human readable reason.
    pub message: String,
}

impl RpcError {
    /// An [`ErrorCode::InvalidArgument`] error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidArgument,
            message: message.into(),
        }
    }

    /// An [`ErrorCode::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::NotFound,
            message: message.into(),
        }
    }

    /// An [`ErrorCode::Internal`] error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: message.into(),
        }
    }
}

/// Requests a client can make.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ClientMessage {
    /// Deliver a message to a session.
    Submit(SubmitRequest),

    /// Query the party's readiness.
    Status,

    /// Query the session of the given kind and scope.
    SessionInfo {
        /// Kind of the session.
        kind: SessionKind,

        /// Chain scope for signing sessions, empty otherwise.
        scope: String,
    },
}

/// Responses a server sends.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum ServerMessage {
    /// The request was accepted.
    Empty,

    /// Answer to [`ClientMessage::Status`].
    Status(PartyStatus),

    /// Answer to [`ClientMessage::SessionInfo`].
    SessionInfo(SessionInfo),

    /// The request was rejected.
    Error(RpcError),
}

/// Serializes `msg` into a length-prefixed frame.
pub fn encode_frame<T: BorshSerialize>(msg: &T) -> io::Result<Vec<u8>> {
    let body = borsh::to_vec(msg)?;
    let len = LengthUint::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_LEN)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;

    let mut frame = Vec::with_capacity(size_of::<LengthUint>() + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes the length prefix of a frame, rejecting oversized frames.
pub fn decode_len(prefix: [u8; size_of::<LengthUint>()]) -> io::Result<usize> {
    let len = LengthUint::from_le_bytes(prefix);
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }

    Ok(len as usize)
}
