//! A single instance of the broadcast protocol.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tracing::{debug, trace, warn};
use tss_bridge_p2p::{
    transport::Transport,
    wire::{RequestType, SubmitRequest},
};
use tss_bridge_primitives::{
    party::{Account, Address, PartySet},
    session::SessionId,
};

use crate::{
    errors::{BroadcastError, InvalidMessage},
    message::{value_hash, RoundMessage},
};

/// Distinct values a party relays at most. Two suffice to expose an equivocating proposer.
const MAX_RELAYED_VALUES: usize = 2;

/// One broadcast of a value from `proposer` to the party set.
///
/// The instance runs until an absolute deadline, normally `(f + 1)` round timeouts after the
/// broadcast starts. Late messages are processed as long as they arrive before the deadline.
#[derive(Debug)]
pub struct ReliableBroadcast<T> {
    session_id: SessionId,
    request_type: RequestType,
    account: Account,
    parties: Arc<PartySet>,
    proposer: Address,
    faulty: usize,
    transport: Arc<T>,
}

#[derive(Debug, Default)]
struct State {
    /// Accumulated values keyed by their hash.
    values: BTreeMap<[u8; 32], Option<Vec<u8>>>,

    /// Values the local party has signed and relayed.
    relayed: HashSet<[u8; 32]>,

    /// `(sender, round)` pairs already processed.
    seen: HashSet<(Address, u32)>,

    /// Whether a chain of `f + 1` signatures was observed.
    complete_chain: bool,
}

impl<T: Transport> ReliableBroadcast<T> {
    /// Creates a broadcast instance tolerating `faulty` parties.
    pub fn new(
        session_id: SessionId,
        request_type: RequestType,
        account: Account,
        parties: Arc<PartySet>,
        proposer: Address,
        faulty: usize,
        transport: Arc<T>,
    ) -> Self {
        Self {
            session_id,
            request_type,
            account,
            parties,
            proposer,
            faulty,
            transport,
        }
    }

    fn last_round(&self) -> u32 {
        self.faulty as u32
    }

    /// Proposes `value` and takes part in the broadcast until `deadline`.
    pub async fn propose(
        self,
        value: Option<Vec<u8>>,
        inbox: mpsc::UnboundedReceiver<SubmitRequest>,
        deadline: Instant,
    ) -> Result<Option<Vec<u8>>, BroadcastError> {
        let mut state = State::default();
        if self.account.address() == &self.proposer {
            let initial = RoundMessage::initial(&self.account, self.session_id.clone(), value);
            self.accept(&mut state, &initial);
            self.send(&initial);
        } else {
            warn!(session = %self.session_id, "only the proposer can propose");
        }

        self.run(state, inbox, deadline).await
    }

    /// Takes part in the broadcast of someone else's value until `deadline`.
    pub async fn receive(
        self,
        inbox: mpsc::UnboundedReceiver<SubmitRequest>,
        deadline: Instant,
    ) -> Result<Option<Vec<u8>>, BroadcastError> {
        self.run(State::default(), inbox, deadline).await
    }

    async fn run(
        self,
        mut state: State,
        mut inbox: mpsc::UnboundedReceiver<SubmitRequest>,
        deadline: Instant,
    ) -> Result<Option<Vec<u8>>, BroadcastError> {
        let expired = sleep_until(deadline);
        tokio::pin!(expired);

        loop {
            tokio::select! {
                _ = &mut expired => break,
                request = inbox.recv() => {
                    let Some(request) = request else {
                        // nothing else can arrive, so the outcome is already fixed
                        sleep_until(deadline).await;
                        break;
                    };

                    if let Err(e) = self.handle(&mut state, request) {
                        warn!(
                            session = %self.session_id,
                            kind = %self.request_type,
                            "dropping malicious message: {e}"
                        );
                    }
                }
            }
        }

        self.decide(state)
    }

    fn handle(&self, state: &mut State, request: SubmitRequest) -> Result<(), InvalidMessage> {
        let msg: RoundMessage = borsh::from_slice(&request.payload)
            .map_err(|e| InvalidMessage::Malformed(e.to_string()))?;

        if msg.session_id != self.session_id || request.session_id != self.session_id {
            return Err(InvalidMessage::WrongSession(msg.session_id));
        }
        if msg.round > self.last_round() {
            return Err(InvalidMessage::RoundTooHigh(msg.round));
        }
        if !state.seen.insert((request.sender.clone(), msg.round)) {
            return Err(InvalidMessage::Duplicate {
                sender: request.sender,
                round: msg.round,
            });
        }

        msg.verify_chain(&self.parties, &self.proposer, &request.sender)?;
        trace!(
            session = %self.session_id,
            round = msg.round,
            sender = %request.sender,
            "valid round message"
        );

        self.accept(state, &msg);

        let hash = value_hash(&msg.value);
        let me = self.account.address();
        if msg.round < self.last_round()
            && !msg.signed_by(me)
            && !state.relayed.contains(&hash)
            && state.relayed.len() < MAX_RELAYED_VALUES
        {
            let next = msg.relay(&self.account);
            self.accept(state, &next);
            self.send(&next);
        }

        Ok(())
    }

    /// Records a valid message, including the ones the local party produces.
    fn accept(&self, state: &mut State, msg: &RoundMessage) {
        let hash = value_hash(&msg.value);
        let value = msg.value.clone().filter(|v| !v.is_empty());
        state.values.entry(hash).or_insert(value);

        if msg.signed_by(self.account.address()) {
            state.relayed.insert(hash);
        }
        if msg.round == self.last_round() {
            state.complete_chain = true;
        }
    }

    /// Sends `msg` to every other party without waiting for the answers.
    fn send(&self, msg: &RoundMessage) {
        let payload = match borsh::to_vec(msg) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(session = %self.session_id, "failed to encode round message: {e}");
                return;
            }
        };

        let targets = self.parties.others(self.account.address());
        let request = self
            .transport
            .request(self.session_id.clone(), self.request_type, payload);
        let transport = self.transport.clone();
        let round = msg.round;

        tokio::spawn(async move {
            for (to, res) in transport.broadcast(&targets, request).await {
                if let Err(e) = res {
                    debug!(%to, %round, "failed to relay round message: {e}");
                }
            }
        });
    }

    fn decide(&self, state: State) -> Result<Option<Vec<u8>>, BroadcastError> {
        if state.values.len() > 1 {
            warn!(
                session = %self.session_id,
                proposer = %self.proposer,
                values = state.values.len(),
                "proposer equivocated"
            );
            return Err(BroadcastError::Equivocation(state.values.len()));
        }

        match state.values.into_values().next() {
            Some(value) if state.complete_chain => Ok(value),
            _ => Err(BroadcastError::NotDelivered),
        }
    }
}
