//! Demultiplexes a session's inbox into the phases of its current round.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, trace};
use tss_bridge_consensus::{ConsensusInbox, ConsensusRoutes};
use tss_bridge_p2p::{
    manager::Inbox,
    wire::{RequestType, SubmitRequest},
};
use tss_bridge_primitives::session::SessionId;
use tss_bridge_tss::driver::wire_round;

/// Receiving ends of one round's consensus and distribution phases.
#[derive(Debug)]
pub struct RoundInbox {
    /// Proposal, acceptance and signer set messages.
    pub consensus: ConsensusInbox,

    /// Relays of the signature distribution.
    pub distribution: Inbox,
}

#[derive(Debug)]
struct RoundRoutes {
    session_id: SessionId,
    consensus: ConsensusRoutes,
    distribution: mpsc::UnboundedSender<SubmitRequest>,
    sign: HashMap<u32, mpsc::UnboundedSender<SubmitRequest>>,
    sign_inboxes: HashMap<u32, Inbox>,
}

impl RoundRoutes {
    fn sign_route(&mut self, round: u32) -> &mpsc::UnboundedSender<SubmitRequest> {
        let Self {
            sign, sign_inboxes, ..
        } = self;
        sign.entry(round).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            sign_inboxes.insert(round, rx);
            tx
        })
    }
}

/// Routes the messages of a long-lived session to whichever round is open.
///
/// The manager delivers messages for a counter only after the session has been renamed to it,
/// so opening the next round before renaming guarantees nothing is routed to a stale round.
/// Threshold signing messages are split by their signing round, and buffered until the session
/// asks for that round's inbox.
#[derive(Debug, Clone)]
pub struct SessionRouter {
    routes: Arc<Mutex<Option<RoundRoutes>>>,
}

impl SessionRouter {
    /// Spawns the task draining `inbox`.
    pub fn spawn(mut inbox: Inbox) -> (Self, JoinHandle<()>) {
        let router = Self {
            routes: Arc::new(Mutex::new(None)),
        };

        let task = {
            let router = router.clone();
            tokio::spawn(async move {
                while let Some(request) = inbox.recv().await {
                    router.route(request);
                }
            })
        };

        (router, task)
    }

    /// Opens the round `session_id`, dropping whatever the previous round left behind.
    pub fn open_round(&self, session_id: SessionId) -> RoundInbox {
        let (consensus_routes, consensus) = ConsensusInbox::channel();
        let (distribution_tx, distribution) = mpsc::unbounded_channel();

        *self.routes.lock() = Some(RoundRoutes {
            session_id,
            consensus: consensus_routes,
            distribution: distribution_tx,
            sign: HashMap::new(),
            sign_inboxes: HashMap::new(),
        });

        RoundInbox {
            consensus,
            distribution,
        }
    }

    /// The inbox of signing round `round` of the open round.
    pub fn sign_inbox(&self, round: u32) -> Inbox {
        let mut guard = self.routes.lock();
        match guard.as_mut() {
            Some(routes) => {
                routes.sign_route(round);
                routes
                    .sign_inboxes
                    .remove(&round)
                    .unwrap_or_else(|| mpsc::unbounded_channel().1)
            }
            None => mpsc::unbounded_channel().1,
        }
    }

    fn route(&self, request: SubmitRequest) {
        let mut guard = self.routes.lock();
        let Some(routes) = guard.as_mut() else {
            trace!(session = %request.session_id, "no round open, dropping message");
            return;
        };
        if routes.session_id != request.session_id {
            trace!(
                session = %request.session_id,
                open = %routes.session_id,
                "message for another round"
            );
            return;
        }

        match request.request_type {
            RequestType::Sign => match wire_round(&request.payload) {
                Some(round) => {
                    let _ = routes.sign_route(round).send(request);
                }
                None => debug!(sender = %request.sender, "malformed signing message"),
            },
            RequestType::SignatureDistribution => {
                let _ = routes.distribution.send(request);
            }
            _ => {
                if let Some(request) = routes.consensus.route(request) {
                    debug!(
                        sender = %request.sender,
                        kind = %request.request_type,
                        "unexpected message in a signing session"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tss_bridge_primitives::chain::ChainId;
    use tss_bridge_test_utils::prelude::*;
    use tss_bridge_tss::driver::TssWire;

    use super::*;

    fn request(
        session_id: &SessionId,
        request_type: RequestType,
        payload: Vec<u8>,
    ) -> SubmitRequest {
        SubmitRequest::new(
            generate_account().address().clone(),
            session_id.clone(),
            request_type,
            payload,
        )
    }

    fn sign_payload(round: u32) -> Vec<u8> {
        borsh::to_vec(&TssWire {
            round,
            broadcast: true,
            data: vec![round as u8],
        })
        .expect("must encode")
    }

    #[tokio::test]
    async fn routes_by_phase_and_signing_round() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (router, _task) = SessionRouter::spawn(rx);
        let session = SessionId::sign(&ChainId::from("1"), 3);
        let mut round = router.open_round(session.clone());

        tx.send(request(&session, RequestType::Proposal, vec![1]))
            .expect("router is running");
        tx.send(request(&session, RequestType::Sign, sign_payload(1)))
            .expect("router is running");
        tx.send(request(&session, RequestType::SignatureDistribution, vec![2]))
            .expect("router is running");
        tx.send(request(&session.next(), RequestType::Proposal, vec![3]))
            .expect("router is running");

        let proposal = round.consensus.proposal.recv().await.expect("must route");
        assert_eq!(proposal.payload, vec![1]);
        let distribution = round.distribution.recv().await.expect("must route");
        assert_eq!(distribution.payload, vec![2]);

        // buffered until asked for
        let mut second = router.sign_inbox(1);
        let signed = second.recv().await.expect("must route");
        assert_eq!(signed.payload, sign_payload(1));
        assert!(router.sign_inbox(0).try_recv().is_err());

        // the stale counter never reaches the round
        assert!(round.consensus.proposal.try_recv().is_err());
    }

    #[tokio::test]
    async fn opening_a_round_closes_the_previous_one() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (router, _task) = SessionRouter::spawn(rx);
        let first = SessionId::sign(&ChainId::from("1"), 0);
        let mut old = router.open_round(first.clone());
        let mut new = router.open_round(first.next());

        tx.send(request(&first.next(), RequestType::SignStart, vec![9]))
            .expect("router is running");
        let routed = new.consensus.sign_start.recv().await.expect("must route");
        assert_eq!(routed.payload, vec![9]);
        assert!(old.consensus.sign_start.recv().await.is_none());
    }
}
