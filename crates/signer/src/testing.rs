//! Shared test helpers for the signer crate.
//!
//! A [`Cluster`] is a set of signer nodes on one [`MemoryNetwork`], each with its own deposit
//! store and session manager. Chain backends and the bridge module are shared, so tests can
//! inspect what the leader submitted.

use std::{sync::Arc, time::Duration};

use secp256k1::{PublicKey, SecretKey, SECP256K1};
use tokio::{task::JoinHandle, time::sleep};
use tss_bridge_chains::{fetcher::DepositFetcher, registry::ChainRegistry};
use tss_bridge_db::{deposits::DepositStore, inmemory::InMemoryDepositStore};
use tss_bridge_p2p::{
    manager::SessionManager,
    memory::{MemoryNetwork, MemoryTransport},
};
use tss_bridge_primitives::{
    deposit::{Deposit, DepositIdentifier, WithdrawalStatus},
    party::{Address, PartySet},
    session::SessionId,
    timing::SessionTimings,
};
use tss_bridge_test_utils::prelude::*;
use tss_bridge_tss::{backend::BackendKind, KeyShare};

use crate::context::SignerContext;

/// Phase durations short enough for tests and long enough for a loaded test runner.
pub(crate) fn test_timings() -> SessionTimings {
    SessionTimings {
        round_timeout: Duration::from_millis(150),
        acceptance_window: Duration::from_millis(150),
        sign: Duration::from_millis(600),
        finalize: Duration::from_millis(300),
        bitcoin_sign_round_delay: Duration::from_millis(50),
    }
}

/// One signer node.
pub(crate) struct Node {
    pub(crate) ctx: Arc<SignerContext<MemoryTransport>>,
    pub(crate) db: Arc<InMemoryDepositStore>,
}

impl Node {
    pub(crate) fn address(&self) -> &Address {
        self.ctx.account.address()
    }

    pub(crate) async fn deposit(&self, id: &DepositIdentifier) -> Deposit {
        self.db
            .get_deposit(id)
            .await
            .expect("in-memory store must not fail")
            .expect("deposit must be stored")
    }
}

/// Nodes sharing a dealer key.
pub(crate) struct Cluster {
    pub(crate) nodes: Vec<Node>,
    pub(crate) network: MemoryNetwork,
    pub(crate) parties: Arc<PartySet>,
    pub(crate) core: Arc<MockBridgeCore>,
    pub(crate) group_key: PublicKey,
}

impl Cluster {
    /// `n` nodes with signer sets of `threshold` parties.
    pub(crate) fn new(n: usize, threshold: usize, chains: ChainRegistry) -> Self {
        let core = Arc::new(MockBridgeCore::new());
        Self::with_key(n, threshold, chains, core, generate_secret_key())
    }

    /// Like [`Self::new`], with a given bridge module and group secret.
    pub(crate) fn with_key(
        n: usize,
        threshold: usize,
        chains: ChainRegistry,
        core: Arc<MockBridgeCore>,
        key: SecretKey,
    ) -> Self {
        let (accounts, parties) = generate_parties(n);
        let parties = Arc::new(parties);
        let addresses = parties.addresses();
        let chains = Arc::new(chains);
        let network = MemoryNetwork::new();

        let nodes = accounts
            .into_iter()
            .map(|account| {
                let address = account.address().clone();
                let (manager, _) = SessionManager::new(address.clone());
                manager.set_ready(true);
                network.register(address.clone(), Arc::new(manager.clone()));

                let db = Arc::new(InMemoryDepositStore::new());
                let ctx = SignerContext {
                    share: Arc::new(dealer_share(
                        &key,
                        address.clone(),
                        addresses.clone(),
                        threshold,
                    )),
                    transport: Arc::new(network.transport(address)),
                    account,
                    parties: parties.clone(),
                    backend: BackendKind::Dealer.build(),
                    db: db.clone(),
                    chains: chains.clone(),
                    core: core.clone(),
                    fetcher: DepositFetcher::new(chains.clone(), core.clone()),
                    manager,
                    timings: test_timings(),
                };

                Node {
                    ctx: Arc::new(ctx),
                    db,
                }
            })
            .collect();

        Self {
            nodes,
            network,
            parties,
            core,
            group_key: key.public_key(SECP256K1),
        }
    }

    /// The node leading the round `session_id`.
    pub(crate) fn leader(&self, session_id: &SessionId) -> &Node {
        let leader = tss_bridge_consensus::leader::leader(session_id, &self.parties)
            .expect("parties are not empty");
        self.nodes
            .iter()
            .find(|node| node.address() == &leader)
            .expect("leader is a node")
    }

    /// Stores `deposit` on every node.
    pub(crate) async fn insert_everywhere(&self, deposit: &Deposit) {
        for node in &self.nodes {
            node.db
                .insert_deposit(deposit)
                .await
                .expect("in-memory store must not fail");
        }
    }

    /// Status of `id` on every node, `None` where it is unknown.
    pub(crate) async fn statuses(&self, id: &DepositIdentifier) -> Vec<Option<WithdrawalStatus>> {
        let mut statuses = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let deposit = node.db.get_deposit(id).await.expect("in-memory store must not fail");
            statuses.push(deposit.map(|d| d.status));
        }
        statuses
    }

    /// Polls until `done` holds for the statuses of `id` or `timeout` passes.
    pub(crate) async fn wait_for(
        &self,
        id: &DepositIdentifier,
        timeout: Duration,
        done: impl Fn(&[Option<WithdrawalStatus>]) -> bool,
    ) -> Vec<Option<WithdrawalStatus>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let statuses = self.statuses(id).await;
            if done(&statuses) || tokio::time::Instant::now() >= deadline {
                return statuses;
            }
            sleep(Duration::from_millis(50)).await;
        }
    }
}

/// A dealer backend share of `key`.
pub(crate) fn dealer_share(
    key: &SecretKey,
    address: Address,
    parties: Vec<Address>,
    threshold: usize,
) -> KeyShare {
    KeyShare {
        backend: BackendKind::Dealer,
        address,
        parties,
        threshold,
        public_key: key.public_key(SECP256K1),
        secret: key.secret_bytes().to_vec(),
    }
}

/// Aborts the spawned sessions when dropped.
pub(crate) struct Tasks(pub(crate) Vec<JoinHandle<()>>);

impl Drop for Tasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}
