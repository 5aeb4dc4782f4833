//! Traits for the RPC server.

use jsonrpsee::{core::RpcResult, proc_macros::rpc};

use crate::types::{RpcPartyStatus, RpcWithdrawal};

/// RPCs related to information about the node itself.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "signer"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "signer"))]
pub trait SignerControlApi {
    /// Get the uptime for the node in seconds assuming the clock is strictly monotonically
    /// increasing.
    #[method(name = "uptime")]
    async fn get_uptime(&self) -> RpcResult<u64>;

    /// Get the local party and whether it takes part in sessions.
    #[method(name = "status")]
    async fn get_status(&self) -> RpcResult<RpcPartyStatus>;
}

/// RPCs feeding deposits into the node and tracking their withdrawals.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "signer"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "signer"))]
pub trait SignerDepositApi {
    /// Fetches a deposit from its source chain and stores it for signing.
    ///
    /// Returns the stored record, which is `INVALID` if the deposit breaks a bridge rule.
    /// Deposits that are not final yet are rejected and may be submitted again later.
    #[method(name = "submitDeposit")]
    async fn submit_deposit(
        &self,
        chain_id: String,
        tx_hash: String,
        tx_nonce: u64,
    ) -> RpcResult<RpcWithdrawal>;

    /// Get the stored record of a deposit, if the node knows it.
    #[method(name = "withdrawalStatus")]
    async fn get_withdrawal_status(
        &self,
        chain_id: String,
        tx_hash: String,
        tx_nonce: u64,
    ) -> RpcResult<Option<RpcWithdrawal>>;
}
