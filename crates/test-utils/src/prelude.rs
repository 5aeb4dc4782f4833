//! Re-exports of the most commonly used test utilities.

pub use crate::{
    chains::{MockBridgeCore, MockChainClient, MockUtxoClient, MockZanoClient},
    deposit::{generate_deposit, generate_deposit_identifier, generate_tx_hash},
    keys::{generate_account, generate_parties, generate_secret_key},
};
