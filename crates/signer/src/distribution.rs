//! Gossip of newly observed deposits between the parties.
//!
//! A deposit submitted to one node is announced to every peer, which fetches it from its source
//! chain on its own. Announcements repeat until every peer has acknowledged them, so each peer
//! receives an identifier at least once.

use std::{collections::HashSet, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn, Instrument};
use tss_bridge_p2p::{
    transport::Transport,
    wire::{RequestType, SessionInfo, SubmitRequest},
};
use tss_bridge_primitives::{
    deposit::{Deposit, DepositIdentifier},
    session::{SessionId, SessionState},
};

use crate::{context::SignerContext, errors::SessionError};

/// How often undistributed deposits are announced.
pub const DISTRIBUTION_INTERVAL: Duration = Duration::from_secs(5);

/// Deposits announced per tick.
const DISTRIBUTION_BATCH: u32 = 100;

/// The long-lived deposit distribution session.
#[derive(Debug)]
pub struct DepositDistribution<T> {
    ctx: Arc<SignerContext<T>>,
    interval: Duration,
    fetching: Arc<Mutex<HashSet<DepositIdentifier>>>,
}

impl<T: Transport> DepositDistribution<T> {
    /// Creates the session, announcing every [`DISTRIBUTION_INTERVAL`].
    pub fn new(ctx: Arc<SignerContext<T>>) -> Self {
        Self {
            ctx,
            interval: DISTRIBUTION_INTERVAL,
            fetching: Arc::default(),
        }
    }

    /// Overrides the announcement interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Announces local deposits and stores announced ones until the manager stops.
    pub async fn run(self) -> Result<(), SessionError> {
        let (_handle, mut inbox) = self
            .ctx
            .manager
            .register(SessionInfo {
                session_id: SessionId::deposit_distribution(),
                state: SessionState::Distributing,
                next_start_ms: 0,
            })
            .await?;
        info!("deposit distribution started");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.announce().await,
                request = inbox.recv() => match request {
                    Some(request) => self.receive(request).await,
                    None => break,
                },
            }
        }

        info!("deposit distribution stopped");
        Ok(())
    }

    /// Sends every undistributed deposit to every peer, flagging those all peers accepted.
    async fn announce(&self) {
        let ctx = &self.ctx;
        let ids = match ctx.db.undistributed_deposits(DISTRIBUTION_BATCH).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("failed to read undistributed deposits: {e}");
                return;
            }
        };
        if ids.is_empty() {
            return;
        }

        let peers = ctx.parties.others(ctx.account.address());
        let mut delivered = Vec::with_capacity(ids.len());
        for id in ids {
            let payload = match borsh::to_vec(&id) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(deposit = %id, "failed to encode deposit identifier: {e}");
                    continue;
                }
            };
            let request = ctx.transport.request(
                SessionId::deposit_distribution(),
                RequestType::DepositDistribution,
                payload,
            );

            let failed = ctx
                .transport
                .broadcast(&peers, request)
                .await
                .into_iter()
                .filter(|(_, result)| result.is_err())
                .count();
            if failed == 0 {
                delivered.push(id);
            } else {
                debug!(deposit = %id, failed, "announcement not acknowledged by every peer");
            }
        }

        if delivered.is_empty() {
            return;
        }
        match ctx.db.mark_distributed(&delivered).await {
            Ok(()) => info!(count = delivered.len(), "deposits distributed"),
            Err(e) => warn!("failed to flag distributed deposits: {e}"),
        }
    }

    /// Stores a deposit announced by a peer after fetching it from its source chain.
    async fn receive(&self, request: SubmitRequest) {
        let ctx = &self.ctx;
        if request.request_type != RequestType::DepositDistribution
            || &request.sender == ctx.account.address()
            || !ctx.parties.contains(&request.sender)
        {
            warn!(sender = %request.sender, kind = %request.request_type, "unexpected announcement");
            return;
        }

        let id: DepositIdentifier = match borsh::from_slice(&request.payload) {
            Ok(id) => id,
            Err(e) => {
                warn!(sender = %request.sender, "malformed announcement: {e}");
                return;
            }
        };

        match ctx.db.get_deposit(&id).await {
            Ok(Some(_)) => {
                trace!(deposit = %id, "announced deposit already known");
                return;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(deposit = %id, "failed to read deposit: {e}");
                return;
            }
        }

        // source chains may be slow, so fetches run beside the announcement loop
        if !self.fetching.lock().insert(id.clone()) {
            trace!(deposit = %id, "announced deposit is already being fetched");
            return;
        }
        let ctx = self.ctx.clone();
        let fetching = self.fetching.clone();
        tokio::spawn(
            async move {
                store_announced(&ctx, &id).await;
                fetching.lock().remove(&id);
            }
            .in_current_span(),
        );
    }
}

/// Fetches an announced deposit from its source chain and stores it.
async fn store_announced<T>(ctx: &SignerContext<T>, id: &DepositIdentifier) {
    let deposit = match ctx.fetcher.fetch(id).await {
        Ok(mut deposit) => {
            deposit.distributed = true;
            deposit
        }
        Err(e) if e.is_invalid() => {
            warn!(deposit = %id, "announced deposit is invalid: {e}");
            Deposit::invalid(id.clone())
        }
        Err(e) => {
            debug!(deposit = %id, "cannot fetch announced deposit yet: {e}");
            return;
        }
    };

    match ctx.db.insert_deposit(&deposit).await {
        Ok(true) => info!(deposit = %id, status = %deposit.status, "announced deposit stored"),
        Ok(false) => {}
        Err(e) => warn!(deposit = %id, "failed to store announced deposit: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tss_bridge_chains::{
        bridge_core::TokenPair,
        client::{ChainClient, RawDeposit},
        registry::ChainRegistry,
        FetchError,
    };
    use tss_bridge_db::deposits::DepositStore;
    use tss_bridge_primitives::{
        amount::Amount,
        chain::{ChainId, ChainType},
        deposit::WithdrawalStatus,
    };
    use tss_bridge_test_utils::prelude::*;

    use super::*;
    use crate::testing::{Cluster, Tasks};

    const TOKEN: &str = "0x00000000000000000000000000000000000000cc";
    const RECEIVER: &str = "0xbeefD475A76Ec312502ba7B566a9B4CEA91ab030";

    /// A source chain whose node never answers.
    #[derive(Debug)]
    struct Stalled(ChainId);

    #[async_trait]
    impl ChainClient for Stalled {
        fn chain_id(&self) -> &ChainId {
            &self.0
        }

        fn chain_type(&self) -> ChainType {
            ChainType::Evm
        }

        async fn deposit_data(&self, _id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
            std::future::pending().await
        }

        fn address_valid(&self, _address: &str) -> bool {
            true
        }

        fn transaction_hash_valid(&self, _hash: &str) -> bool {
            true
        }
    }

    fn cluster(source: MockChainClient) -> Cluster {
        cluster_with(source, None)
    }

    fn cluster_with(source: MockChainClient, stalled: Option<&str>) -> Cluster {
        let core = Arc::new(MockBridgeCore::new());
        core.add_pair(
            "56",
            TOKEN,
            "1",
            TokenPair {
                destination_token: "0x00000000000000000000000000000000000000aa".into(),
                source_decimals: 18,
                destination_decimals: 18,
                is_wrapped: false,
                commission_rate: "0".into(),
            },
        );

        let mut chains = ChainRegistry::new();
        chains.register(Arc::new(source));
        chains.register(Arc::new(MockChainClient::new("1", ChainType::Evm)));
        if let Some(chain) = stalled {
            chains.register(Arc::new(Stalled(ChainId::from(chain))));
        }
        Cluster::with_key(3, 2, chains, core, generate_secret_key())
    }

    fn raw(id: &DepositIdentifier, memo: &str) -> RawDeposit {
        RawDeposit {
            identifier: id.clone(),
            source_address: RECEIVER.into(),
            token: TOKEN.into(),
            amount: Amount::from(5_000),
            block: 10,
            memo: memo.as_bytes().to_vec(),
        }
    }

    fn spawn(cluster: &Cluster) -> Tasks {
        Tasks(
            cluster
                .nodes
                .iter()
                .map(|node| {
                    let session = DepositDistribution::new(node.ctx.clone())
                        .with_interval(Duration::from_millis(100));
                    tokio::spawn(async move {
                        let _ = session.run().await;
                    })
                })
                .collect(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submitted_deposit_reaches_every_peer() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.add_deposit(raw(&id, &format!("{RECEIVER}#1")));
        let cluster = cluster(source);

        let origin = &cluster.nodes[0];
        let deposit = origin.ctx.fetcher.fetch(&id).await.expect("must fetch");
        assert!(!deposit.distributed);
        origin.db.insert_deposit(&deposit).await.expect("must insert");

        let _tasks = spawn(&cluster);
        let known = |s: &[Option<WithdrawalStatus>]| s.iter().all(Option::is_some);
        let statuses = cluster.wait_for(&id, Duration::from_secs(3), known).await;
        assert!(
            statuses.iter().all(|s| *s == Some(WithdrawalStatus::Pending)),
            "statuses: {statuses:?}"
        );

        for node in &cluster.nodes[1..] {
            let stored = node.deposit(&id).await;
            assert!(stored.distributed, "peers never re-announce");
            assert!(stored.same_withdrawal(&deposit));
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(origin.deposit(&id).await.distributed);
        let undistributed = origin.db.undistributed_deposits(10).await.expect("must read");
        assert!(undistributed.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn announcement_of_a_bogus_deposit_is_recorded_invalid() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.add_deposit(raw(&id, "no receiver here"));
        let cluster = cluster(source);

        // the origin stored it anyway, e.g. from an older release
        let mut deposit = generate_deposit("56", "1");
        deposit.identifier = id.clone();
        cluster.nodes[0]
            .db
            .insert_deposit(&deposit)
            .await
            .expect("must insert");

        let _tasks = spawn(&cluster);
        let known = |s: &[Option<WithdrawalStatus>]| s.iter().all(Option::is_some);
        let statuses = cluster.wait_for(&id, Duration::from_secs(3), known).await;
        assert_eq!(statuses[1], Some(WithdrawalStatus::Invalid));
        assert_eq!(statuses[2], Some(WithdrawalStatus::Invalid));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn peers_that_cannot_read_the_chain_yet_store_nothing() {
        let id = generate_deposit_identifier("56");
        let cluster = cluster(MockChainClient::new("56", ChainType::Evm));

        let mut deposit = generate_deposit("56", "1");
        deposit.identifier = id.clone();
        cluster.nodes[0]
            .db
            .insert_deposit(&deposit)
            .await
            .expect("must insert");

        let _tasks = spawn(&cluster);
        tokio::time::sleep(Duration::from_millis(500)).await;

        let statuses = cluster.statuses(&id).await;
        assert_eq!(statuses, vec![Some(WithdrawalStatus::Pending), None, None]);
        // delivery counts as distribution even when peers could not store it
        assert!(cluster.nodes[0].deposit(&id).await.distributed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reannouncement_after_a_restart_changes_nothing() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.add_deposit(raw(&id, &format!("{RECEIVER}#1")));
        let cluster = cluster(source);

        let origin = &cluster.nodes[0];
        let deposit = origin.ctx.fetcher.fetch(&id).await.expect("must fetch");

        // the peers already signed it, the origin lost its distribution flag
        for node in &cluster.nodes[1..] {
            let db = &node.db;
            db.insert_deposit(&deposit).await.expect("must insert");
            db.transition(&id, WithdrawalStatus::Pending, WithdrawalStatus::Processing)
                .await
                .expect("must start processing");
            db.mark_processed(&id, Some("ab".repeat(65)), None)
                .await
                .expect("must mark processed");
        }
        origin.db.insert_deposit(&deposit).await.expect("must insert");

        let _tasks = spawn(&cluster);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(origin.deposit(&id).await.distributed);
        for node in &cluster.nodes[1..] {
            let stored = node.deposit(&id).await;
            assert_eq!(stored.status, WithdrawalStatus::Processed);
            assert_eq!(stored.signature, Some("ab".repeat(65)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_source_chain_does_not_hold_up_other_announcements() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.add_deposit(raw(&id, &format!("{RECEIVER}#1")));
        let cluster = cluster_with(source, Some("97"));

        let origin = &cluster.nodes[0];
        let stuck = generate_deposit("97", "1");
        origin.db.insert_deposit(&stuck).await.expect("must insert");
        let deposit = origin.ctx.fetcher.fetch(&id).await.expect("must fetch");
        origin.db.insert_deposit(&deposit).await.expect("must insert");

        let _tasks = spawn(&cluster);
        let known = |s: &[Option<WithdrawalStatus>]| s.iter().all(Option::is_some);
        let statuses = cluster.wait_for(&id, Duration::from_secs(3), known).await;
        assert!(known(&statuses), "statuses: {statuses:?}");

        let stuck = cluster.statuses(&stuck.identifier).await;
        assert_eq!(stuck[1..], [None, None]);
    }
}
