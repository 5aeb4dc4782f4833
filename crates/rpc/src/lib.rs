//! The JSON-RPC API of a signer node.
//!
//! Deposits observed by a user or a relayer enter the node through [`SignerDepositApi`]; the
//! node fetches them from their source chain on its own, stores them and announces them to the
//! other parties. The same API reports how far the withdrawal each deposit requests has
//! progressed.

pub mod traits;
pub mod types;

pub use traits::*;
