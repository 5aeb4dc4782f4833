//! Runs the signing sessions of every configured chain.

use std::{fs, sync::Arc};

use anyhow::{bail, Context};
use futures::future::select_all;
use tokio::{signal, spawn, task::JoinHandle};
use tracing::{error, info, warn};
use tss_bridge_chains::{
    BitcoindClient, BridgeCore, ChainRegistry, ClaimChain, DepositFetcher, EvmClient,
    JsonRpcBridgeCore, ZanoWallet,
};
use tss_bridge_db::persistent::sqlite::SqliteDb;
use tss_bridge_primitives::chain::ChainType;
use tss_bridge_signer::{
    context::SignerContext, spawn_deposit_distribution, spawn_signing_sessions,
};
use tss_bridge_tss::KeyShare;

use super::{init_network, Network};
use crate::{
    config::{ChainConfig, Config},
    rpc_server::{start_rpc, SignerRpc},
};

/// Bootstraps the node: the deposit store, chain clients, P2P surface, sessions and the API.
pub(crate) async fn bootstrap(config: Config) -> anyhow::Result<()> {
    info!("bootstrapping signer node");
    config.tss.check_backend()?;

    let network = init_network(&config).await?;
    let share = load_share(&config, &network).await?;
    info!(public_key = %share.public_key, threshold = share.threshold, "loaded key share");
    if share.backend.is_insecure() {
        warn!("⚠️ running with an insecure key share, for development networks only");
    }

    let db = Arc::new(init_database_handle(&config).await?);
    let core: Arc<dyn BridgeCore> =
        Arc::new(JsonRpcBridgeCore::new(&config.core.url).context("bridge core client")?);
    let chains = Arc::new(init_chains(&config.chains)?);
    let fetcher = DepositFetcher::new(chains.clone(), core.clone());

    let Network {
        account,
        parties,
        manager,
        transport,
        mut tasks,
    } = network;

    let ctx = Arc::new(SignerContext {
        backend: share.backend.build(),
        share: Arc::new(share),
        account,
        parties: parties.clone(),
        db: db.clone(),
        chains,
        core,
        fetcher: fetcher.clone(),
        transport,
        manager: manager.clone(),
        timings: config.tss.timings.timings(),
    });

    let start_ms = u64::try_from(config.tss.start_time.timestamp_millis())
        .context("tss.start_time is before the unix epoch")?;
    tasks.extend(spawn_signing_sessions(ctx.clone(), start_ms));
    tasks.push(spawn_deposit_distribution(ctx.clone()));

    info!("starting the RPC server");
    let rpc = SignerRpc::new(db, fetcher, manager.clone(), parties.len(), ctx.threshold());
    tasks.push(start_rpc_server(rpc, config.api.listen_addr.clone()));

    manager.set_ready(true);
    info!(address = %ctx.account.address(), "signer node ready");

    wait_for_shutdown(tasks).await
}

/// Reads the key share and checks it belongs to this node and party set.
async fn load_share(config: &Config, network: &Network) -> anyhow::Result<KeyShare> {
    let path = &config.tss.share_path;
    let share = KeyShare::load(path)
        .await
        .with_context(|| format!("failed to load key share {}", path.display()))?;

    if &share.address != network.account.address() {
        bail!("key share belongs to {}", share.address);
    }
    if share.parties != network.parties.addresses() {
        bail!("key share was generated for a different party set");
    }
    if share.threshold != config.tss.threshold {
        bail!(
            "key share has threshold {}, configured {}",
            share.threshold,
            config.tss.threshold
        );
    }
    if share.backend != config.tss.backend {
        bail!("key share belongs to the {:?} backend", share.backend);
    }

    Ok(share)
}

async fn init_database_handle(config: &Config) -> anyhow::Result<SqliteDb> {
    if let Some(dir) = config.db.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create datadir at {}", dir.display()))?;
    }

    info!(path = %config.db.path.display(), "opening deposit store");
    SqliteDb::connect(&config.db)
        .await
        .context("failed to open deposit store")
}

/// Builds the client of every configured chain.
fn init_chains(configs: &[ChainConfig]) -> anyhow::Result<ChainRegistry> {
    let mut registry = ChainRegistry::new();

    for chain in configs {
        let id = chain.chain_id.clone();
        if registry.get(&id).is_some() {
            bail!("chain {id} is configured twice");
        }
        let missing = |section: &str| format!("chain {id} lacks a [chains.{section}] section");

        match chain.family {
            ChainType::Evm => {
                let evm = chain.evm.as_ref().with_context(|| missing("evm"))?;
                registry.register(Arc::new(EvmClient::new(id.clone(), evm)?));
            }
            ChainType::Bitcoin => {
                let btc = chain.bitcoin.as_ref().with_context(|| missing("bitcoin"))?;
                registry.register_utxo(Arc::new(BitcoindClient::new(id.clone(), btc)?));
            }
            ChainType::Zano => {
                let zano = chain.zano.as_ref().with_context(|| missing("zano"))?;
                registry.register_zano(Arc::new(ZanoWallet::new(id.clone(), zano)?));
            }
            ChainType::Ton | ChainType::Solana => {
                registry.register(Arc::new(ClaimChain::new(id.clone(), chain.family)));
            }
        }
        info!(chain = %id, family = %chain.family, "configured chain");
    }

    if registry.chains().is_empty() {
        warn!("no chains configured, the node will not sign anything");
    }

    Ok(registry)
}

fn start_rpc_server(rpc: SignerRpc, rpc_addr: String) -> JoinHandle<()> {
    spawn(async move {
        if let Err(e) = start_rpc(&rpc, rpc_addr.as_str()).await {
            error!(?e, "RPC server failed");
        }
    })
}

/// Runs until interrupted or until any long-lived task ends.
async fn wait_for_shutdown(tasks: Vec<JoinHandle<()>>) -> anyhow::Result<()> {
    tokio::select! {
        res = signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            info!("received ctrl-c, shutting down");
            Ok(())
        }
        (res, index, rest) = select_all(tasks) => {
            for task in rest {
                task.abort();
            }
            match res {
                Ok(()) => bail!("task {index} stopped unexpectedly"),
                Err(e) => bail!("task {index} failed: {e}"),
            }
        }
    }
}
