//! One consensus instance.

use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use tss_bridge_broadcast::ReliableBroadcast;
use tss_bridge_p2p::{manager::Inbox, transport::Transport, wire::RequestType};
use tss_bridge_primitives::party::Address;

use crate::{
    context::RoundContext,
    data::SigningData,
    errors::ConsensusError,
    mechanism::Mechanism,
    messages::{Acceptance, ConsensusInbox, SignStart},
    selection::select_signers,
};

/// What a consensus instance decided.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusOutcome<D> {
    /// The agreed data. `None` means there is nothing to sign this round.
    pub data: Option<D>,

    /// The signer set, present only if the local party is in it.
    pub signers: Option<Vec<Address>>,

    /// Whether the local party accepted the data. Always true for the leader.
    pub accepted: bool,

    /// The round's leader.
    pub leader: Address,
}

impl<D> ConsensusOutcome<D> {
    fn no_work(leader: Address) -> Self {
        Self {
            data: None,
            signers: None,
            accepted: false,
            leader,
        }
    }

    /// Whether the local party signs this round.
    pub fn is_signer(&self) -> bool {
        self.signers.is_some()
    }
}

/// Absolute deadlines of the three phases, derived from the round start.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    proposal: Instant,
    acceptance: Instant,
    sign_start: Instant,
}

impl Schedule {
    fn new(ctx: &RoundContext, start: Instant) -> Self {
        let broadcast = ctx.timings.broadcast(ctx.faulty());
        let proposal = start + broadcast;
        let acceptance = proposal + ctx.timings.acceptance_window;

        Self {
            proposal,
            acceptance,
            sign_start: acceptance + broadcast,
        }
    }
}

/// The local party's part in agreeing on a round's data and signer set.
///
/// The leader proposes, every other party votes, and the leader announces the signers it picked
/// among the parties that accepted. Both announcements go through a reliable broadcast, so every
/// honest party ends the round with the same data and the same signer set, or with an error.
#[derive(Debug)]
pub struct ConsensusParty<M, T> {
    ctx: RoundContext,
    mechanism: Arc<M>,
    transport: Arc<T>,
}

impl<M: Mechanism, T: Transport> ConsensusParty<M, T> {
    /// Creates the instance of one round.
    pub fn new(ctx: RoundContext, mechanism: Arc<M>, transport: Arc<T>) -> Self {
        Self {
            ctx,
            mechanism,
            transport,
        }
    }

    /// Runs consensus. Every phase deadline is derived from `start`, the wall-clock start of the
    /// round shared by all parties.
    pub async fn run(
        self,
        inbox: ConsensusInbox,
        start: Instant,
    ) -> Result<ConsensusOutcome<M::Data>, ConsensusError> {
        let leader = self.ctx.leader().ok_or(ConsensusError::EmptyPartySet)?;
        let schedule = Schedule::new(&self.ctx, start);

        if &leader == self.ctx.me() {
            self.lead(leader, inbox, schedule).await
        } else {
            self.follow(leader, inbox, schedule).await
        }
    }

    fn broadcast(&self, request_type: RequestType, proposer: &Address) -> ReliableBroadcast<T> {
        ReliableBroadcast::new(
            self.ctx.session_id.clone(),
            request_type,
            self.ctx.account.clone(),
            self.ctx.parties.clone(),
            proposer.clone(),
            self.ctx.faulty(),
            self.transport.clone(),
        )
    }

    async fn lead(
        self,
        leader: Address,
        inbox: ConsensusInbox,
        schedule: Schedule,
    ) -> Result<ConsensusOutcome<M::Data>, ConsensusError> {
        let session = &self.ctx.session_id;
        let proposal = match self.mechanism.form_proposal().await {
            Ok(proposal) => proposal,
            Err(e) => {
                // peers still need a value to agree on
                warn!(%session, "failed to form a proposal: {e}");
                None
            }
        };
        let payload = proposal.as_ref().map(|d| d.to_payload()).transpose()?;

        info!(%session, has_data = proposal.is_some(), "proposing");
        let delivered = self
            .broadcast(RequestType::Proposal, &leader)
            .propose(payload, inbox.proposal, schedule.proposal)
            .await?;

        let Some(data) = delivered.map(|p| M::Data::from_payload(&p)).transpose()? else {
            debug!(%session, "nothing to sign");
            return Ok(ConsensusOutcome::no_work(leader));
        };

        let hash = data.hash_string();
        let acceptors = self
            .collect_acceptances(&hash, inbox.acceptance, schedule.acceptance)
            .await;
        // the leader plus at least `t` acceptors
        let required = self.ctx.threshold;
        if acceptors.len() < required {
            warn!(%session, acceptors = acceptors.len(), required, "too few acceptors");
            return Err(ConsensusError::TooFewAcceptors {
                acceptors: acceptors.len(),
                required,
            });
        }

        let signers = select_signers(session, &leader, &acceptors, self.ctx.threshold);
        info!(%session, ?signers, "announcing signers");
        let announcement = borsh::to_vec(&SignStart {
            data_hash: hash.clone(),
            signers,
        })
        .map_err(|e| ConsensusError::malformed("sign start", e))?;

        let delivered = self
            .broadcast(RequestType::SignStart, &leader)
            .propose(Some(announcement), inbox.sign_start, schedule.sign_start)
            .await?;
        let signers = self.check_sign_start(delivered, &hash, &leader)?;

        Ok(ConsensusOutcome {
            signers: signers.contains(self.ctx.me()).then_some(signers),
            data: Some(data),
            accepted: true,
            leader,
        })
    }

    async fn follow(
        self,
        leader: Address,
        inbox: ConsensusInbox,
        schedule: Schedule,
    ) -> Result<ConsensusOutcome<M::Data>, ConsensusError> {
        let session = &self.ctx.session_id;
        let delivered = self
            .broadcast(RequestType::Proposal, &leader)
            .receive(inbox.proposal, schedule.proposal)
            .await?;

        let Some(data) = delivered.map(|p| M::Data::from_payload(&p)).transpose()? else {
            debug!(%session, %leader, "leader has nothing to sign");
            return Ok(ConsensusOutcome::no_work(leader));
        };

        let hash = data.hash_string();
        let accepted = self.mechanism.verify_proposal(&data).await;
        info!(%session, %leader, %hash, accepted, "voting on proposal");
        self.vote(&leader, &hash, accepted).await;

        let delivered = self
            .broadcast(RequestType::SignStart, &leader)
            .receive(inbox.sign_start, schedule.sign_start)
            .await?;
        let signers = self.check_sign_start(delivered, &hash, &leader)?;
        let is_signer = accepted && signers.contains(self.ctx.me());

        Ok(ConsensusOutcome {
            signers: is_signer.then_some(signers),
            data: Some(data),
            accepted,
            leader,
        })
    }

    async fn vote(&self, leader: &Address, hash: &str, accepted: bool) {
        let vote = Acceptance {
            data_hash: hash.to_string(),
            accepted,
        };
        let payload = match borsh::to_vec(&vote) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(session = %self.ctx.session_id, "failed to encode vote: {e}");
                return;
            }
        };

        let request = self.transport.request(
            self.ctx.session_id.clone(),
            RequestType::Acceptance,
            payload,
        );
        if let Err(e) = self.transport.send(leader, request).await {
            warn!(session = %self.ctx.session_id, %leader, "failed to send vote: {e}");
        }
    }

    /// Collects the parties that accepted `hash` until `deadline` or until every party voted.
    async fn collect_acceptances(
        &self,
        hash: &str,
        mut inbox: Inbox,
        deadline: Instant,
    ) -> Vec<Address> {
        let session = &self.ctx.session_id;
        let me = self.ctx.me();
        let voters = self.ctx.parties.len().saturating_sub(1);

        let mut voted = HashSet::new();
        let mut acceptors = BTreeSet::new();
        let expired = sleep_until(deadline);
        tokio::pin!(expired);

        while voted.len() < voters {
            let request = tokio::select! {
                _ = &mut expired => break,
                request = inbox.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            let sender = request.sender;
            if request.session_id != *session || &sender == me || !self.ctx.parties.contains(&sender)
            {
                warn!(%session, %sender, "dropping vote from outside the round");
                continue;
            }
            if !voted.insert(sender.clone()) {
                warn!(%session, %sender, "dropping repeated vote");
                continue;
            }

            match borsh::from_slice::<Acceptance>(&request.payload) {
                Ok(vote) if vote.data_hash != hash => {
                    warn!(%session, %sender, voted = %vote.data_hash, "vote on another proposal");
                }
                Ok(vote) if vote.accepted => {
                    acceptors.insert(sender);
                }
                Ok(_) => debug!(%session, %sender, "proposal rejected"),
                Err(e) => warn!(%session, %sender, "dropping malformed vote: {e}"),
            }
        }

        acceptors.into_iter().collect()
    }

    fn check_sign_start(
        &self,
        delivered: Option<Vec<u8>>,
        hash: &str,
        leader: &Address,
    ) -> Result<Vec<Address>, ConsensusError> {
        let payload =
            delivered.ok_or_else(|| ConsensusError::malformed("sign start", "empty value"))?;
        let start: SignStart = borsh::from_slice(&payload)
            .map_err(|e| ConsensusError::malformed("sign start", e))?;

        if start.data_hash != hash {
            return Err(ConsensusError::malformed("sign start", "announces another proposal"));
        }

        let unique: BTreeSet<_> = start.signers.iter().collect();
        if unique.len() != start.signers.len()
            || !unique.contains(leader)
            || !start.signers.iter().all(|s| self.ctx.parties.contains(s))
        {
            return Err(ConsensusError::malformed("sign start", "invalid signer set"));
        }

        Ok(start.signers)
    }
}
