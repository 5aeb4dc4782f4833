//! Bootstraps the JSON-RPC server of the signer node.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonrpsee::{
    core::RpcResult,
    types::{ErrorCode, ErrorObjectOwned},
    RpcModule,
};
use tracing::{debug, info, warn};
use tss_bridge_chains::{errors::FetchError, fetcher::DepositFetcher};
use tss_bridge_db::{deposits::DepositStore, errors::DbError};
use tss_bridge_p2p::{manager::SessionManager, transport::MessageHandler};
use tss_bridge_primitives::{
    chain::ChainId,
    deposit::{Deposit, DepositIdentifier},
};
use tss_bridge_rpc::{
    types::{RpcPartyStatus, RpcWithdrawal},
    SignerControlApiServer, SignerDepositApiServer,
};

/// Error code of deposits that cannot be read yet, e.g. for lack of confirmations.
const DEPOSIT_NOT_READY: i32 = -32001;

/// Starts the JSON-RPC server and serves until it is stopped.
pub(crate) async fn start_rpc<T>(rpc_impl: &T, rpc_addr: &str) -> anyhow::Result<()>
where
    T: SignerControlApiServer + SignerDepositApiServer + Clone + Sync + Send,
{
    let mut rpc_module = RpcModule::new(rpc_impl.clone());

    let control_api = SignerControlApiServer::into_rpc(rpc_impl.clone());
    let deposit_api = SignerDepositApiServer::into_rpc(rpc_impl.clone());

    rpc_module.merge(control_api).context("merge control api")?;
    rpc_module.merge(deposit_api).context("merge deposit api")?;

    info!("starting signer rpc server at {rpc_addr}");
    let rpc_server = jsonrpsee::server::ServerBuilder::new()
        .build(&rpc_addr)
        .await
        .context("build signer rpc server")?;

    let rpc_handle = rpc_server.start(rpc_module);
    debug!("signer rpc server started");

    rpc_handle.stopped().await;
    info!("rpc server stopped");

    Ok(())
}

/// Serves the API from the node's deposit store.
#[derive(Debug, Clone)]
pub(crate) struct SignerRpc {
    start_time: DateTime<Utc>,
    db: Arc<dyn DepositStore>,
    fetcher: DepositFetcher,
    manager: SessionManager,
    parties: usize,
    threshold: usize,
}

impl SignerRpc {
    pub(crate) fn new(
        db: Arc<dyn DepositStore>,
        fetcher: DepositFetcher,
        manager: SessionManager,
        parties: usize,
        threshold: usize,
    ) -> Self {
        Self {
            start_time: Utc::now(),
            db,
            fetcher,
            manager,
            parties,
            threshold,
        }
    }

    async fn stored(&self, id: &DepositIdentifier) -> RpcResult<Option<Deposit>> {
        self.db.get_deposit(id).await.map_err(internal)
    }
}

fn internal(e: DbError) -> ErrorObjectOwned {
    warn!("deposit store failed: {e}");
    ErrorObjectOwned::owned(
        ErrorCode::InternalError.code(),
        format!("deposit store failed: {e}"),
        None::<()>,
    )
}

fn fetch_failed(e: &FetchError) -> ErrorObjectOwned {
    let code = match e {
        FetchError::UnknownChain(_) => ErrorCode::InvalidParams.code(),
        _ => DEPOSIT_NOT_READY,
    };
    ErrorObjectOwned::owned(code, e.to_string(), None::<()>)
}

#[async_trait]
impl SignerControlApiServer for SignerRpc {
    async fn get_uptime(&self) -> RpcResult<u64> {
        let uptime = Utc::now().timestamp() - self.start_time.timestamp();
        Ok(uptime.try_into().unwrap_or_default())
    }

    async fn get_status(&self) -> RpcResult<RpcPartyStatus> {
        let status = self.manager.status().await;
        Ok(RpcPartyStatus {
            address: status.address,
            ready: status.ready,
            parties: self.parties,
            threshold: self.threshold,
        })
    }
}

#[async_trait]
impl SignerDepositApiServer for SignerRpc {
    async fn submit_deposit(
        &self,
        chain_id: String,
        tx_hash: String,
        tx_nonce: u64,
    ) -> RpcResult<RpcWithdrawal> {
        let id = DepositIdentifier::new(tx_hash, tx_nonce, ChainId::from(chain_id));
        if let Some(known) = self.stored(&id).await? {
            debug!(deposit = %id, "deposit already known");
            return Ok(known.into());
        }

        let deposit = match self.fetcher.fetch(&id).await {
            Ok(deposit) => deposit,
            Err(e) if e.is_invalid() => {
                warn!(deposit = %id, "submitted deposit is invalid: {e}");
                Deposit::invalid(id.clone())
            }
            Err(e) => {
                debug!(deposit = %id, "submitted deposit cannot be read yet: {e}");
                return Err(fetch_failed(&e));
            }
        };

        if self.db.insert_deposit(&deposit).await.map_err(internal)? {
            info!(deposit = %id, status = %deposit.status, "deposit submitted");
        }

        // a peer may have announced it in the meantime
        let stored = self.stored(&id).await?.unwrap_or(deposit);
        Ok(stored.into())
    }

    async fn get_withdrawal_status(
        &self,
        chain_id: String,
        tx_hash: String,
        tx_nonce: u64,
    ) -> RpcResult<Option<RpcWithdrawal>> {
        let id = DepositIdentifier::new(tx_hash, tx_nonce, ChainId::from(chain_id));
        Ok(self.stored(&id).await?.map(Into::into))
    }
}
