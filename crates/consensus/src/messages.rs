//! Payloads exchanged during consensus.

use borsh::{BorshDeserialize, BorshSerialize};
use tokio::sync::mpsc;
use tss_bridge_p2p::{
    manager::Inbox,
    wire::{RequestType, SubmitRequest},
};
use tss_bridge_primitives::party::Address;

/// A party's vote on the proposal, sent to the leader only.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Acceptance {
    /// Hash of the proposal voted on.
    pub data_hash: String,

    /// ACCEPT or NACK.
    pub accepted: bool,
}

/// The signer set chosen by the leader.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SignStart {
    /// Hash of the proposal to sign.
    pub data_hash: String,

    /// Sorted signer addresses.
    pub signers: Vec<Address>,
}

/// Receiving ends of the consensus message streams of one round.
#[derive(Debug)]
pub struct ConsensusInbox {
    /// Relays of the proposal broadcast.
    pub proposal: Inbox,

    /// Votes, only read by the leader.
    pub acceptance: Inbox,

    /// Relays of the signer set broadcast.
    pub sign_start: Inbox,
}

/// Sending ends matching a [`ConsensusInbox`].
#[derive(Debug, Clone)]
pub struct ConsensusRoutes {
    proposal: mpsc::UnboundedSender<SubmitRequest>,
    acceptance: mpsc::UnboundedSender<SubmitRequest>,
    sign_start: mpsc::UnboundedSender<SubmitRequest>,
}

impl ConsensusInbox {
    /// Creates the channels of one round.
    pub fn channel() -> (ConsensusRoutes, Self) {
        let (proposal_tx, proposal) = mpsc::unbounded_channel();
        let (acceptance_tx, acceptance) = mpsc::unbounded_channel();
        let (sign_start_tx, sign_start) = mpsc::unbounded_channel();

        let routes = ConsensusRoutes {
            proposal: proposal_tx,
            acceptance: acceptance_tx,
            sign_start: sign_start_tx,
        };
        let inbox = Self {
            proposal,
            acceptance,
            sign_start,
        };

        (routes, inbox)
    }
}

impl ConsensusRoutes {
    /// Forwards a consensus message. Anything else is handed back.
    ///
    /// Messages for a round that already finished are dropped silently.
    pub fn route(&self, request: SubmitRequest) -> Option<SubmitRequest> {
        let tx = match request.request_type {
            RequestType::Proposal => &self.proposal,
            RequestType::Acceptance => &self.acceptance,
            RequestType::SignStart => &self.sign_start,
            _ => return Some(request),
        };

        let _ = tx.send(request);
        None
    }
}
