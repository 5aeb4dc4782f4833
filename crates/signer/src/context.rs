//! Everything a session needs from the node.

use std::sync::Arc;

use tss_bridge_chains::{bridge_core::BridgeCore, fetcher::DepositFetcher, registry::ChainRegistry};
use tss_bridge_consensus::RoundContext;
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_p2p::manager::SessionManager;
use tss_bridge_primitives::{
    party::{Account, PartySet},
    session::SessionId,
    timing::SessionTimings,
};
use tss_bridge_tss::{backend::ThresholdBackend, KeyShare};

/// Node-wide state shared by every session.
#[derive(Debug)]
pub struct SignerContext<T> {
    /// The local party.
    pub account: Account,

    /// The signing group.
    pub parties: Arc<PartySet>,

    /// The local share of the group key.
    pub share: Arc<KeyShare>,

    /// The threshold protocol the share belongs to.
    pub backend: Arc<dyn ThresholdBackend>,

    /// Local deposit store.
    pub db: Arc<dyn DepositStore>,

    /// Chain backends.
    pub chains: Arc<ChainRegistry>,

    /// The bridge module.
    pub core: Arc<dyn BridgeCore>,

    /// Reads deposits the node has not seen yet.
    pub fetcher: DepositFetcher,

    /// The network.
    pub transport: Arc<T>,

    /// Routes inbound messages to sessions.
    pub manager: SessionManager,

    /// Phase durations, equal on every node.
    pub timings: SessionTimings,
}

impl<T> SignerContext<T> {
    /// Size of the signer set of a signing round.
    pub fn threshold(&self) -> usize {
        self.share.threshold
    }

    /// Number of faulty parties the broadcasts tolerate.
    pub fn faulty(&self) -> usize {
        self.parties.len().saturating_sub(self.threshold())
    }

    /// Consensus parameters of the round `session_id`.
    pub fn round(&self, session_id: SessionId) -> RoundContext {
        RoundContext {
            session_id,
            account: self.account.clone(),
            parties: self.parties.clone(),
            threshold: self.threshold(),
            timings: self.timings,
        }
    }
}
