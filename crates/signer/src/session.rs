//! The periodic signing session of one destination chain.
//!
//! A session is registered once and then advances by renaming itself to the next counter. Each
//! round runs consensus, the signing rounds, signature distribution and finalization inside a
//! fixed window, so that every node starts the next round at the same time without
//! coordinating.

use std::sync::Arc;

use futures::future::join_all;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use tss_bridge_consensus::{
    ConsensusOutcome, ConsensusParty, Mechanism, SignatureDistributor, SigningData,
};
use tss_bridge_p2p::{
    manager::{Inbox, SessionHandle},
    transport::Transport,
    wire::SessionInfo,
};
use tss_bridge_primitives::{
    chain::ChainId,
    deposit::{Deposit, WithdrawalStatus},
    session::{SessionId, SessionKind, SessionState},
    signature::SignatureData,
};
use tss_bridge_tss::SigningParty;

use crate::{
    context::SignerContext,
    data::WithdrawalData,
    errors::SessionError,
    finalizer::{finalize, mark_failed, Finalizer},
    router::{RoundInbox, SessionRouter},
    schedule::{instant_at, majority_start, now_ms, Schedule},
};

/// Signing rounds of one destination chain.
#[derive(Debug)]
pub struct SigningSession<M, F, T> {
    ctx: Arc<SignerContext<T>>,
    chain_id: ChainId,
    mechanism: Arc<M>,
    finalizer: Arc<F>,
    first_start_ms: u64,
}

impl<M, F, T> SigningSession<M, F, T>
where
    M: Mechanism,
    M::Data: WithdrawalData,
    F: Finalizer<Data = M::Data>,
    T: Transport,
{
    /// Creates the session of `chain_id` whose round 0 starts at `first_start_ms`.
    pub fn new(
        ctx: Arc<SignerContext<T>>,
        chain_id: ChainId,
        mechanism: M,
        finalizer: F,
        first_start_ms: u64,
    ) -> Self {
        Self {
            ctx,
            chain_id,
            mechanism: Arc::new(mechanism),
            finalizer: Arc::new(finalizer),
            first_start_ms,
        }
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            first_start_ms: self.first_start_ms,
            period: self.ctx.timings.signing_session(self.ctx.faulty()),
        }
    }

    /// The first round to take part in and its start.
    ///
    /// Rounds with several signing rounds stretch the period, so running peers know the real
    /// schedule better than the local clock does. The clock is the fallback when no majority of
    /// peers answers.
    async fn join(&self) -> (u64, u64) {
        let scope = self.chain_id.to_string();
        let me = self.ctx.account.address();
        let queries = self
            .ctx
            .parties
            .addresses()
            .into_iter()
            .filter(|peer| peer != me)
            .map(|peer| {
                let scope = &scope;
                async move {
                    self.ctx
                        .transport
                        .session_info(&peer, SessionKind::Sign, scope)
                        .await
                }
            });
        let answers = timeout(self.ctx.timings.round_timeout, join_all(queries))
            .await
            .unwrap_or_default();

        let now = now_ms();
        let starts = answers.into_iter().filter_map(Result::ok).map(|info| upcoming(&info));
        match majority_start(starts, now) {
            Some((counter, start_ms)) => {
                debug!(chain = %self.chain_id, counter, start_ms, "joining the peers' schedule");
                (counter, start_ms)
            }
            None => self.schedule().catch_up(now),
        }
    }

    /// Runs rounds forever. Only fails if the session cannot register.
    pub async fn run(self) -> Result<(), SessionError> {
        let (counter, mut start_ms) = self.join().await;
        let mut session_id = SessionId::sign(&self.chain_id, counter);

        let (mut handle, inbox) = self
            .ctx
            .manager
            .register(SessionInfo {
                session_id: session_id.clone(),
                state: SessionState::AwaitingStart,
                next_start_ms: start_ms,
            })
            .await?;
        let (router, _router_task) = SessionRouter::spawn(inbox);
        let mut round = router.open_round(session_id.clone());
        info!(session = %session_id, start_ms, "signing session registered");

        loop {
            handle.set_state(SessionState::AwaitingStart, start_ms);
            let start = instant_at(start_ms);
            sleep_until(start).await;

            let span = info_span!("round", session = %session_id);
            let rounds = self
                .run_round(&handle, &router, round, start, start_ms)
                .instrument(span)
                .await;

            let period = self
                .ctx
                .timings
                .signing_session_with_rounds(self.ctx.faulty(), rounds);
            start_ms += u64::try_from(period.as_millis()).unwrap_or(u64::MAX);

            // routes first, so messages released by the rename land in the new round
            session_id = session_id.next();
            round = router.open_round(session_id.clone());
            handle.rename(session_id.clone());
        }
    }

    /// Runs one round, returning how many signing rounds it scheduled.
    async fn run_round(
        &self,
        handle: &SessionHandle,
        router: &SessionRouter,
        inbox: RoundInbox,
        start: Instant,
        start_ms: u64,
    ) -> usize {
        let timings = self.ctx.timings;
        let faulty = self.ctx.faulty();
        let next_start = |rounds| {
            let period = timings.signing_session_with_rounds(faulty, rounds);
            start_ms + u64::try_from(period.as_millis()).unwrap_or(u64::MAX)
        };
        let mut next_start_ms = next_start(1);
        let session_id = handle.id().clone();

        handle.set_state(SessionState::Consensus, next_start_ms);
        let party = ConsensusParty::new(
            self.ctx.round(session_id.clone()),
            self.mechanism.clone(),
            self.ctx.transport.clone(),
        );
        let outcome = match party.run(inbox.consensus, start).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("consensus failed: {e}");
                handle.set_state(SessionState::Done, next_start_ms);
                return 1;
            }
        };
        let Some(data) = outcome.data.clone() else {
            debug!("nothing to sign");
            handle.set_state(SessionState::Done, next_start_ms);
            return 1;
        };

        let digests = data.digests();
        if digests.is_empty() {
            warn!("agreed data has nothing to sign");
            handle.set_state(SessionState::Done, next_start_ms);
            return 1;
        }
        let rounds = digests.len();
        next_start_ms = next_start(rounds);
        handle.set_state(SessionState::Consensus, next_start_ms);

        let finalizes = outcome.accepted && self.start_processing(data.deposit()).await;
        let sign_start = start + timings.consensus(faulty);

        let result = self
            .sign_and_distribute(handle, router, inbox.distribution, &outcome, digests, sign_start)
            .await;
        let signatures = match result {
            Ok(signatures) => signatures,
            Err(e) => {
                warn!("round failed: {e}");
                if finalizes {
                    self.rollback(data.deposit()).await;
                }
                handle.set_state(SessionState::Done, next_start_ms);
                return rounds;
            }
        };

        if finalizes {
            handle.set_state(SessionState::Finalizing, next_start_ms);
            let is_leader = &outcome.leader == self.ctx.account.address();
            let db = self.ctx.db.as_ref();
            let finalized = finalize(self.finalizer.as_ref(), db, &data, &signatures, is_leader);

            match timeout(timings.finalize, finalized).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("finalization failed: {e}"),
                Err(_) => {
                    warn!("finalization timed out");
                    if let Some(deposit) = data.deposit() {
                        mark_failed(db, &deposit.identifier).await;
                    }
                }
            }
        }

        handle.set_state(SessionState::Done, next_start_ms);
        rounds
    }

    /// Moves the agreed deposit to processing. Rounds without a deposit always proceed.
    async fn start_processing(&self, deposit: Option<&Deposit>) -> bool {
        let Some(deposit) = deposit else {
            return true;
        };

        match self
            .ctx
            .db
            .transition(
                &deposit.identifier,
                WithdrawalStatus::Pending,
                WithdrawalStatus::Processing,
            )
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!(deposit = %deposit.identifier, "agreed deposit is no longer pending");
                false
            }
            Err(e) => {
                warn!(deposit = %deposit.identifier, "failed to start processing: {e}");
                false
            }
        }
    }

    async fn rollback(&self, deposit: Option<&Deposit>) {
        let Some(deposit) = deposit else {
            return;
        };

        match self
            .ctx
            .db
            .transition(
                &deposit.identifier,
                WithdrawalStatus::Processing,
                WithdrawalStatus::Pending,
            )
            .await
        {
            Ok(true) => info!(deposit = %deposit.identifier, "deposit returned to pending"),
            Ok(false) => {}
            Err(e) => warn!(deposit = %deposit.identifier, "failed to roll back: {e}"),
        }
    }

    /// Signs every digest if the local party was selected, then runs signature distribution.
    async fn sign_and_distribute(
        &self,
        handle: &SessionHandle,
        router: &SessionRouter,
        distribution: Inbox,
        outcome: &ConsensusOutcome<M::Data>,
        digests: Vec<[u8; 32]>,
        sign_start: Instant,
    ) -> Result<Vec<SignatureData>, SessionError> {
        let ctx = &self.ctx;
        let timings = ctx.timings;
        let faulty = ctx.faulty();
        let session_id = handle.id().clone();
        let next_start_ms = handle.info().next_start_ms;
        let rounds = digests.len();

        let mut signatures = Vec::with_capacity(rounds);
        if let Some(signers) = &outcome.signers {
            handle.set_state(SessionState::Signing, next_start_ms);
            let step = timings.sign + timings.bitcoin_sign_round_delay;

            for (index, digest) in digests.iter().enumerate() {
                let round = index as u32;
                let round_start = sign_start + step * round;
                sleep_until(round_start).await;

                let party = SigningParty::new(
                    ctx.backend.clone(),
                    ctx.share.clone(),
                    signers.clone(),
                    *digest,
                    session_id.clone(),
                    round,
                    ctx.transport.clone(),
                );
                let signature = party
                    .sign(router.sign_inbox(round), round_start + timings.sign)
                    .await?;
                signatures.push(signature);
            }
        }

        handle.set_state(SessionState::Distributing, next_start_ms);
        let distributor = SignatureDistributor::new(
            ctx.round(session_id),
            outcome.leader.clone(),
            digests,
            ctx.share.public_key,
            ctx.transport.clone(),
        );

        let delivered = if &outcome.leader == ctx.account.address() {
            let deadline = Instant::now() + timings.distribution_for_signer(faulty);
            distributor
                .distribute(&signatures, distribution, deadline)
                .await?
        } else if outcome.is_signer() {
            let deadline = Instant::now() + timings.distribution_for_signer(faulty);
            distributor.receive(distribution, deadline).await?
        } else {
            let deadline = sign_start + timings.distribution_for_observer(faulty, rounds);
            distributor.receive(distribution, deadline).await?
        };

        Ok(delivered)
    }
}

/// The round a peer reporting `info` will run next, and its start.
fn upcoming(info: &SessionInfo) -> (u64, u64) {
    let counter = info.session_id.counter();
    match info.state {
        SessionState::AwaitingStart => (counter, info.next_start_ms),
        _ => (counter + 1, info.next_start_ms),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bitcoin::{hashes::Hash, Amount as BtcAmount, CompressedPublicKey, Network, OutPoint, Txid};
    use tss_bridge_chains::{
        registry::ChainRegistry,
        utxo::{group_script, Utxo},
    };
    use tss_bridge_broadcast::RoundMessage;
    use tss_bridge_db::deposits::DepositStore;
    use tss_bridge_p2p::{transport::MessageHandler, wire::RequestType};
    use tss_bridge_primitives::{amount::Amount, chain::ChainType};
    use tss_bridge_test_utils::prelude::*;

    use super::*;
    use crate::{
        spawn_signing_sessions,
        testing::{Cluster, Tasks},
    };

    const WAIT: Duration = Duration::from_secs(8);

    fn evm_chains() -> ChainRegistry {
        let mut chains = ChainRegistry::new();
        chains.register(Arc::new(MockChainClient::new("1", ChainType::Evm)));
        chains
    }

    fn bitcoin_wallet(group_key: &secp256k1::PublicKey, amounts: &[u64]) -> Arc<MockUtxoClient> {
        let utxos = amounts
            .iter()
            .enumerate()
            .map(|(i, &sat)| Utxo {
                outpoint: OutPoint {
                    txid: Txid::from_byte_array([i as u8 + 1; 32]),
                    vout: 0,
                },
                amount: BtcAmount::from_sat(sat),
                script_pubkey: group_script(group_key),
            })
            .collect();
        Arc::new(MockUtxoClient::new("bitcoin", 2, utxos))
    }

    /// A 40 000 sat withdrawal, which takes two 30 000 sat inputs.
    fn bitcoin_deposit() -> Deposit {
        let mut deposit = generate_deposit("1", "bitcoin");
        let receiver = CompressedPublicKey(generate_account().public_key());
        deposit.destination_address =
            bitcoin::Address::p2wpkh(&receiver, Network::Regtest).to_string();
        deposit.withdrawal_amount = Amount::from(40_000);
        deposit
    }

    fn spawn_all(cluster: &Cluster, start_ms: u64) -> Tasks {
        Tasks(
            cluster
                .nodes
                .iter()
                .flat_map(|node| spawn_signing_sessions(node.ctx.clone(), start_ms))
                .collect(),
        )
    }

    fn all_processed(statuses: &[Option<WithdrawalStatus>]) -> bool {
        statuses
            .iter()
            .all(|s| *s == Some(WithdrawalStatus::Processed))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_node_processes_an_evm_withdrawal() {
        let cluster = Cluster::new(4, 3, evm_chains());
        let deposit = generate_deposit("56", "1");
        cluster.insert_everywhere(&deposit).await;

        let _tasks = spawn_all(&cluster, now_ms() + 300);
        let statuses = cluster
            .wait_for(&deposit.identifier, WAIT, all_processed)
            .await;
        assert!(all_processed(&statuses), "statuses: {statuses:?}");

        let mut signatures = Vec::new();
        for node in &cluster.nodes {
            let stored = node.deposit(&deposit.identifier).await;
            assert!(stored.signature.is_some());
            signatures.push(stored.signature);
        }
        signatures.dedup();
        assert_eq!(signatures.len(), 1, "every node stores the same signature");

        let submitted = cluster.core.submitted();
        assert_eq!(submitted.len(), 1, "only the leader submits");
        assert_eq!(submitted[0].identifier, deposit.identifier);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn offline_party_does_not_stall_the_round() {
        let cluster = Cluster::new(4, 2, evm_chains());
        let deposit = generate_deposit("56", "1");
        cluster.insert_everywhere(&deposit).await;

        let leader = cluster
            .leader(&SessionId::sign(&ChainId::from("1"), 0))
            .address()
            .clone();
        let offline = cluster
            .nodes
            .iter()
            .position(|node| node.address() != &leader)
            .expect("there are followers");
        cluster.network.disconnect(cluster.nodes[offline].address());

        let tasks = cluster
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != offline)
            .flat_map(|(_, node)| spawn_signing_sessions(node.ctx.clone(), now_ms() + 300))
            .collect();
        let _tasks = Tasks(tasks);

        let online = |statuses: &[Option<WithdrawalStatus>]| {
            statuses
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != offline)
                .all(|(_, s)| *s == Some(WithdrawalStatus::Processed))
        };
        let statuses = cluster.wait_for(&deposit.identifier, WAIT, online).await;
        assert!(online(&statuses), "statuses: {statuses:?}");
        assert_eq!(statuses[offline], Some(WithdrawalStatus::Pending));
        assert_eq!(cluster.core.submitted().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn disputed_withdrawal_stays_pending() {
        let cluster = Cluster::new(4, 3, evm_chains());
        let deposit = generate_deposit("56", "1");
        let leader = cluster.leader(&SessionId::sign(&ChainId::from("1"), 0));

        // the leader's copy pays out more than the deposit allows
        let mut inflated = deposit.clone();
        inflated.withdrawal_amount = Amount::from(inflated.withdrawal_amount.to_u64().expect("fits") * 2);
        for node in &cluster.nodes {
            let stored = if node.address() == leader.address() {
                &inflated
            } else {
                &deposit
            };
            node.db.insert_deposit(stored).await.expect("must insert");
        }

        let start_ms = now_ms() + 300;
        let _tasks = spawn_all(&cluster, start_ms);
        let period = leader.ctx.timings.signing_session(leader.ctx.faulty());
        tokio::time::sleep(Duration::from_millis(300) + period).await;

        let statuses = cluster.statuses(&deposit.identifier).await;
        assert!(
            statuses.iter().all(|s| *s == Some(WithdrawalStatus::Pending)),
            "statuses: {statuses:?}"
        );
        assert!(cluster.core.submitted().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_signing_returns_the_deposit_to_pending() {
        let cluster = Cluster::new(4, 3, evm_chains());
        let deposit = generate_deposit("56", "1");
        cluster.insert_everywhere(&deposit).await;

        // every signer but the leader falls silent once the signer set is announced
        let leader = cluster
            .leader(&SessionId::sign(&ChainId::from("1"), 0))
            .address()
            .clone();
        for node in cluster.nodes.iter().filter(|node| node.address() != &leader) {
            cluster.network.intercept(node.address().clone(), |_, request| {
                (request.request_type != RequestType::Sign).then_some(request)
            });
        }

        let _tasks = spawn_all(&cluster, now_ms() + 300);
        let processing = |statuses: &[Option<WithdrawalStatus>]| {
            statuses
                .iter()
                .all(|s| *s == Some(WithdrawalStatus::Processing))
        };
        let statuses = cluster
            .wait_for(&deposit.identifier, WAIT, processing)
            .await;
        assert!(processing(&statuses), "statuses: {statuses:?}");

        let pending = |statuses: &[Option<WithdrawalStatus>]| {
            statuses
                .iter()
                .all(|s| *s == Some(WithdrawalStatus::Pending))
        };
        let statuses = cluster.wait_for(&deposit.identifier, WAIT, pending).await;
        assert!(pending(&statuses), "statuses: {statuses:?}");
        for node in &cluster.nodes {
            assert!(node.deposit(&deposit.identifier).await.signature.is_none());
        }
        assert!(cluster.core.submitted().is_empty());

        // a later round retries once the signers speak again
        for node in &cluster.nodes {
            cluster.network.clear_interceptor(node.address());
        }
        let statuses = cluster
            .wait_for(&deposit.identifier, WAIT, all_processed)
            .await;
        assert!(all_processed(&statuses), "statuses: {statuses:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn equivocating_leader_gets_nothing_signed() {
        let cluster = Cluster::new(4, 3, evm_chains());
        let deposit = generate_deposit("56", "1");
        cluster.insert_everywhere(&deposit).await;

        let leader = cluster.leader(&SessionId::sign(&ChainId::from("1"), 0));
        let account = leader.ctx.account.clone();
        let victim = cluster
            .nodes
            .iter()
            .find(|node| node.address() != leader.address())
            .expect("there are followers")
            .address()
            .clone();

        // the leader signs a second proposal for one of its followers
        cluster
            .network
            .intercept(leader.address().clone(), move |to, mut request| {
                if to != &victim || request.request_type != RequestType::Proposal {
                    return Some(request);
                }
                let msg: RoundMessage = borsh::from_slice(&request.payload).ok()?;
                if msg.round != 0 {
                    return Some(request);
                }
                let forged =
                    RoundMessage::initial(&account, msg.session_id, Some(b"conflicting".to_vec()));
                request.payload = borsh::to_vec(&forged).ok()?;
                Some(request)
            });

        let _tasks = spawn_all(&cluster, now_ms() + 300);
        // past the consensus of round 0, before round 1 could sign anything
        tokio::time::sleep(Duration::from_millis(1_800)).await;

        let statuses = cluster.statuses(&deposit.identifier).await;
        assert!(
            statuses.iter().all(|s| *s == Some(WithdrawalStatus::Pending)),
            "statuses: {statuses:?}"
        );
        for node in &cluster.nodes {
            assert!(node.deposit(&deposit.identifier).await.signature.is_none());
        }
        assert!(cluster.core.submitted().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bitcoin_withdrawal_signs_every_input() {
        let core = Arc::new(MockBridgeCore::new());
        let key = generate_secret_key();
        let group_key = key.public_key(secp256k1::SECP256K1);
        let client = bitcoin_wallet(&group_key, &[30_000, 30_000, 5_000]);
        let mut chains = ChainRegistry::new();
        chains.register_utxo(client.clone());

        let cluster = Cluster::with_key(4, 3, chains, core, key);
        assert_eq!(cluster.group_key, group_key);

        let deposit = bitcoin_deposit();
        cluster.insert_everywhere(&deposit).await;

        let _tasks = spawn_all(&cluster, now_ms() + 300);
        let statuses = cluster
            .wait_for(&deposit.identifier, WAIT, all_processed)
            .await;
        assert!(all_processed(&statuses), "statuses: {statuses:?}");

        let sent = client.sent();
        assert_eq!(sent.len(), 1, "only the leader broadcasts");
        let tx = &sent[0];
        assert_eq!(tx.input.len(), 2);
        assert!(tx.input.iter().all(|input| !input.witness.is_empty()));

        let txid = tx.compute_txid().to_string();
        for node in &cluster.nodes {
            let stored = node.deposit(&deposit.identifier).await;
            assert_eq!(stored.withdrawal_tx_hash.as_deref(), Some(txid.as_str()));
            let inputs = stored.signature.as_deref().map(|s| s.split(',').count());
            assert_eq!(inputs, Some(2));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn late_node_follows_a_stretched_schedule() {
        let core = Arc::new(MockBridgeCore::new());
        let key = generate_secret_key();
        let group_key = key.public_key(secp256k1::SECP256K1);
        let client = bitcoin_wallet(&group_key, &[30_000, 30_000, 30_000, 30_000]);
        let mut chains = ChainRegistry::new();
        chains.register_utxo(client);

        let cluster = Cluster::with_key(4, 2, chains, core, key);
        let chain = ChainId::from("bitcoin");
        let leader = cluster.leader(&SessionId::sign(&chain, 0)).address().clone();
        let late = cluster
            .nodes
            .iter()
            .position(|node| node.address() != &leader)
            .expect("there are followers");

        // round 0 spends two inputs, so it runs longer than a single-input period
        let first = bitcoin_deposit();
        for (i, node) in cluster.nodes.iter().enumerate() {
            if i != late {
                node.db.insert_deposit(&first).await.expect("must insert");
            }
        }

        let start_ms = now_ms() + 300;
        let mut tasks: Vec<_> = cluster
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != late)
            .flat_map(|(_, node)| spawn_signing_sessions(node.ctx.clone(), start_ms))
            .collect();

        let started = |statuses: &[Option<WithdrawalStatus>]| {
            statuses.iter().enumerate().filter(|(i, _)| *i != late).all(|(_, s)| {
                matches!(
                    s,
                    Some(WithdrawalStatus::Processing | WithdrawalStatus::Processed)
                )
            })
        };
        let statuses = cluster.wait_for(&first.identifier, WAIT, started).await;
        assert!(started(&statuses), "statuses: {statuses:?}");

        tasks.extend(spawn_signing_sessions(cluster.nodes[late].ctx.clone(), start_ms));
        let _tasks = Tasks(tasks);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let ctx = &cluster.nodes[late].ctx;
        let period = ctx.timings.signing_session_with_rounds(ctx.faulty(), 2);
        let expected = (1, start_ms + period.as_millis() as u64);
        let joined = ctx
            .manager
            .session_info(SessionKind::Sign, "bitcoin")
            .await
            .expect("the late node must be registered");
        assert_eq!(upcoming(&joined), expected);

        let second = bitcoin_deposit();
        cluster.insert_everywhere(&second).await;
        let statuses = cluster
            .wait_for(&second.identifier, Duration::from_secs(15), all_processed)
            .await;
        assert!(all_processed(&statuses), "statuses: {statuses:?}");
    }
}
