//! What the node does once started, and the plumbing both commands share.

use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, Context};
use secp256k1::SecretKey;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tss_bridge_p2p::{
    client::{Config as ClientConfig, PeerEndpoint, QuicTransport},
    manager::SessionManager,
    server::{Server, ServerConfig},
    tls::{client_config, load_identity, server_config},
};
use tss_bridge_primitives::party::{Account, PartySet};

use crate::config::Config;

pub(crate) mod keygen;
pub(crate) mod signer;

/// The local party, its peers and the P2P surface connecting them.
#[derive(Debug)]
pub(crate) struct Network {
    pub(crate) account: Account,
    pub(crate) parties: Arc<PartySet>,
    pub(crate) manager: SessionManager,
    pub(crate) transport: Arc<QuicTransport>,
    pub(crate) tasks: Vec<JoinHandle<()>>,
}

/// Reads the node's identity key.
fn load_account(path: &Path) -> anyhow::Result<Account> {
    let hex = fs::read_to_string(path)
        .with_context(|| format!("failed to read account key {}", path.display()))?;
    let key: SecretKey = hex
        .trim()
        .trim_start_matches("0x")
        .parse()
        .context("account key is not a hex encoded secp256k1 secret key")?;

    Ok(Account::new(key))
}

/// Loads the identity, starts the P2P server and prepares the client side.
pub(crate) async fn init_network(config: &Config) -> anyhow::Result<Network> {
    let account = load_account(&config.account.key_file)?;
    info!(address = %account.address(), "loaded account");

    if let Some(peer) = config.p2p.peers.iter().find(|p| !p.is_consistent()) {
        bail!("peer {} does not match its public key", peer.address);
    }
    let parties = config
        .p2p
        .party_set(account.party())
        .context("party list contains duplicates")?;
    info!(parties = parties.len(), "loaded party set");

    let identity = load_identity(&config.tls)
        .await
        .context("failed to load tls identity")?;

    let (manager, manager_task) = SessionManager::new(account.address().clone());

    let server = Server::bind(ServerConfig {
        addr: config.p2p.listen_addr,
        connection_limit: config.p2p.connection_limit,
        tls_config: server_config(&identity)?,
        peers: config.p2p.fingerprints(),
    })
    .context("failed to bind p2p server")?;
    let server_task = tokio::spawn(server.run(Arc::new(manager.clone())));

    let transport = QuicTransport::new(ClientConfig {
        me: account.address().clone(),
        local_addr: None,
        tls_config: client_config(&identity)?,
        timeout: config.p2p.request_timeout,
        peers: config
            .p2p
            .peers
            .iter()
            .map(|p| PeerEndpoint {
                address: p.address.clone(),
                addr: p.addr,
                server_name: p.server_name.clone(),
            })
            .collect(),
    })
    .context("failed to bind p2p client")?;

    if parties.len() < 2 {
        warn!("no peers configured, the node signs alone");
    }

    Ok(Network {
        account,
        parties: Arc::new(parties),
        manager,
        transport: Arc::new(transport),
        tasks: vec![manager_task, server_task],
    })
}
