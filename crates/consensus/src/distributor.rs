//! Hands the signatures of a round to every party.

use std::sync::Arc;

use secp256k1::PublicKey;
use tokio::time::Instant;
use tracing::{info, warn};
use tss_bridge_broadcast::ReliableBroadcast;
use tss_bridge_p2p::{manager::Inbox, transport::Transport, wire::RequestType};
use tss_bridge_primitives::{party::Address, signature::SignatureData};

use crate::{context::RoundContext, errors::ConsensusError};

/// Reliable broadcast of the signatures produced in a round, proposed by the leader.
///
/// Signers hold the signatures already and only relay. Everyone else learns them here. In both
/// cases the delivered signatures are checked against the group key before they are returned.
#[derive(Debug)]
pub struct SignatureDistributor<T> {
    ctx: RoundContext,
    leader: Address,
    digests: Vec<[u8; 32]>,
    group_key: PublicKey,
    transport: Arc<T>,
}

impl<T: Transport> SignatureDistributor<T> {
    /// Creates the distributor of a round signing `digests` under `group_key`.
    pub fn new(
        ctx: RoundContext,
        leader: Address,
        digests: Vec<[u8; 32]>,
        group_key: PublicKey,
        transport: Arc<T>,
    ) -> Self {
        Self {
            ctx,
            leader,
            digests,
            group_key,
            transport,
        }
    }

    fn broadcast(&self) -> ReliableBroadcast<T> {
        ReliableBroadcast::new(
            self.ctx.session_id.clone(),
            RequestType::SignatureDistribution,
            self.ctx.account.clone(),
            self.ctx.parties.clone(),
            self.leader.clone(),
            self.ctx.faulty(),
            self.transport.clone(),
        )
    }

    /// Broadcasts the leader's signatures.
    pub async fn distribute(
        self,
        signatures: &[SignatureData],
        inbox: Inbox,
        deadline: Instant,
    ) -> Result<Vec<SignatureData>, ConsensusError> {
        let payload = borsh::to_vec(signatures)
            .map_err(|e| ConsensusError::malformed("signatures", e))?;

        info!(
            session = %self.ctx.session_id,
            count = signatures.len(),
            "distributing signatures"
        );
        let delivered = self
            .broadcast()
            .propose(Some(payload), inbox, deadline)
            .await?;
        self.validate(delivered)
    }

    /// Waits for the leader's signatures.
    pub async fn receive(
        self,
        inbox: Inbox,
        deadline: Instant,
    ) -> Result<Vec<SignatureData>, ConsensusError> {
        let delivered = self.broadcast().receive(inbox, deadline).await?;
        self.validate(delivered)
    }

    fn validate(&self, delivered: Option<Vec<u8>>) -> Result<Vec<SignatureData>, ConsensusError> {
        let payload = delivered.ok_or_else(|| ConsensusError::malformed("signatures", "empty"))?;
        let signatures: Vec<SignatureData> = borsh::from_slice(&payload)
            .map_err(|e| ConsensusError::malformed("signatures", e))?;

        if signatures.len() != self.digests.len() {
            return Err(ConsensusError::SignatureCount {
                expected: self.digests.len(),
                actual: signatures.len(),
            });
        }

        for (index, (signature, digest)) in signatures.iter().zip(&self.digests).enumerate() {
            if !signature.verify(*digest, &self.group_key) {
                warn!(session = %self.ctx.session_id, index, "distributed signature is invalid");
                return Err(ConsensusError::InvalidSignature { index });
            }
        }

        Ok(signatures)
    }
}
