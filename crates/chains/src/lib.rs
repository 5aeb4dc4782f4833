//! Everything the signer needs to know about the chains it bridges.
//!
//! Chain RPC backends sit behind the traits of [`client`], the bridge module behind
//! [`bridge_core::BridgeCore`]. On top of them the [`fetcher::DepositFetcher`] turns a deposit
//! identifier into a normalized [`Deposit`](tss_bridge_primitives::deposit::Deposit), and
//! [`utxo`] builds, checks and completes bitcoin withdrawal transactions.

pub mod bitcoind;
pub mod bridge_core;
pub mod claim;
pub mod client;
pub mod errors;
pub mod evm;
pub mod fetcher;
pub mod registry;
pub mod utxo;
pub mod zano;

pub use bitcoind::{BitcoindClient, BitcoindConfig};
pub use bridge_core::{BridgeCore, JsonRpcBridgeCore, TokenPair};
pub use claim::{claim_digest, ClaimChain};
pub use client::{ChainClient, RawDeposit, UtxoClient, ZanoClient, ZanoEmission};
pub use errors::{ChainError, FetchError, InvalidDeposit};
pub use evm::{EvmClient, EvmConfig};
pub use fetcher::DepositFetcher;
pub use registry::ChainRegistry;
pub use zano::{ZanoConfig, ZanoWallet};
