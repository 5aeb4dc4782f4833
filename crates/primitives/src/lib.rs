//! This crate contains the general types and pure functions shared by every other crate in the
//! signer workspace: party identities, session identifiers, deposits and their lifecycle,
//! amount arithmetic, destination memo codecs, EVM withdrawal hashing and signature encodings.
//!
//! It lies at the bottom of the crate hierarchy i.e., it does not depend on any other crate in
//! this workspace.

pub mod amount;
pub mod chain;
pub mod constants;
pub mod deposit;
pub mod errors;
pub mod evm;
pub mod memo;
pub mod party;
pub mod session;
pub mod signature;
pub mod timing;
