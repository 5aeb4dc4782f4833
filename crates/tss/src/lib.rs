//! Threshold ECDSA parties.
//!
//! The cryptographic protocol is supplied by a [`ThresholdBackend`](backend::ThresholdBackend)
//! as a message-driven state machine. This crate drives such machines over a
//! [`Transport`](tss_bridge_p2p::transport::Transport): it feeds them inbound wire messages in
//! per-sender order and delivers what they emit.

pub mod backend;
pub mod dealer;
pub mod driver;
pub mod errors;
pub mod keygen;
pub mod share;
pub mod signing;

pub use errors::TssError;
pub use keygen::KeygenParty;
pub use share::KeyShare;
pub use signing::SigningParty;
