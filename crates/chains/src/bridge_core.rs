//! The on-chain bridge module: token metadata and final deposit submission.

use std::fmt::Debug;

use async_trait::async_trait;
use jsonrpsee::{
    http_client::{HttpClient, HttpClientBuilder},
    proc_macros::rpc,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tss_bridge_primitives::{chain::ChainId, deposit::Deposit};

use crate::errors::ChainError;

/// How a source token maps onto a destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Token paid out on the destination chain.
    pub destination_token: String,

    /// Decimals of the source token.
    pub source_decimals: u8,

    /// Decimals of the destination token.
    pub destination_decimals: u8,

    /// Whether the destination token is minted by the bridge.
    pub is_wrapped: bool,

    /// Commission rate as a decimal string, e.g. `"0.001"`.
    pub commission_rate: String,
}

/// Read and write access to the bridge module.
#[async_trait]
pub trait BridgeCore: Debug + Send + Sync {
    /// The pair connecting `source_token` on `source_chain` to `destination_chain`, if any.
    async fn token_pair(
        &self,
        source_chain: &ChainId,
        source_token: &str,
        destination_chain: &ChainId,
    ) -> Result<Option<TokenPair>, ChainError>;

    /// Records a processed deposit on the bridge module.
    async fn submit_deposit(&self, deposit: &Deposit) -> Result<(), ChainError>;
}

/// JSON-RPC methods of the bridge module.
#[rpc(client, namespace = "bridge")]
pub trait BridgeCoreApi {
    /// Looks up a token pair.
    #[method(name = "tokenPair")]
    async fn token_pair(
        &self,
        source_chain: ChainId,
        source_token: String,
        destination_chain: ChainId,
    ) -> RpcResult<Option<TokenPair>>;

    /// Submits a processed deposit.
    #[method(name = "submitDeposit")]
    async fn submit_deposit(&self, deposit: Deposit) -> RpcResult<()>;
}

/// [`BridgeCore`] over JSON-RPC.
#[derive(Debug, Clone)]
pub struct JsonRpcBridgeCore {
    client: HttpClient,
}

impl JsonRpcBridgeCore {
    /// Creates a client for the bridge module at `url`. Nothing is sent until the first call.
    pub fn new(url: &str) -> Result<Self, ChainError> {
        let client = HttpClientBuilder::default().build(url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BridgeCore for JsonRpcBridgeCore {
    async fn token_pair(
        &self,
        source_chain: &ChainId,
        source_token: &str,
        destination_chain: &ChainId,
    ) -> Result<Option<TokenPair>, ChainError> {
        debug!(%source_chain, %source_token, %destination_chain, "looking up token pair");
        Ok(BridgeCoreApiClient::token_pair(
            &self.client,
            source_chain.clone(),
            source_token.to_string(),
            destination_chain.clone(),
        )
        .await?)
    }

    async fn submit_deposit(&self, deposit: &Deposit) -> Result<(), ChainError> {
        debug!(deposit = %deposit.identifier, "submitting deposit to the bridge module");
        Ok(BridgeCoreApiClient::submit_deposit(&self.client, deposit.clone()).await?)
    }
}
