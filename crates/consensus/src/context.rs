//! Parameters shared by every phase of a round.

use std::sync::Arc;

use tss_bridge_primitives::{
    party::{Account, Address, PartySet},
    session::SessionId,
    timing::SessionTimings,
};

use crate::leader::leader;

/// Who takes part in a round and how long its phases last.
#[derive(Debug, Clone)]
pub struct RoundContext {
    /// The round's session id.
    pub session_id: SessionId,

    /// The local party.
    pub account: Account,

    /// Every party of the epoch.
    pub parties: Arc<PartySet>,

    /// Size of a signer set.
    pub threshold: usize,

    /// Phase durations.
    pub timings: SessionTimings,
}

impl RoundContext {
    /// Parties the broadcasts tolerate being faulty.
    pub fn faulty(&self) -> usize {
        self.parties.len().saturating_sub(self.threshold)
    }

    /// The round's leader.
    pub fn leader(&self) -> Option<Address> {
        leader(&self.session_id, &self.parties)
    }

    /// The local address.
    pub fn me(&self) -> &Address {
        self.account.address()
    }
}
