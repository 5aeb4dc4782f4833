//! A single threshold signing round over a fixed digest and signer set.

use std::sync::Arc;

use tokio::{sync::mpsc, time::Instant};
use tracing::{info, warn};
use tss_bridge_p2p::{
    transport::Transport,
    wire::{RequestType, SubmitRequest},
};
use tss_bridge_primitives::{party::Address, session::SessionId, signature::SignatureData};

use crate::{
    backend::ThresholdBackend,
    driver::{self, RunContext},
    errors::TssError,
    share::KeyShare,
};

/// The local party's part in signing one digest.
#[derive(Debug)]
pub struct SigningParty<T> {
    backend: Arc<dyn ThresholdBackend>,
    share: Arc<KeyShare>,
    signers: Vec<Address>,
    digest: [u8; 32],
    ctx: RunContext<T>,
}

impl<T: Transport> SigningParty<T> {
    /// Prepares a signing run. `round` distinguishes consecutive runs within one session.
    pub fn new(
        backend: Arc<dyn ThresholdBackend>,
        share: Arc<KeyShare>,
        mut signers: Vec<Address>,
        digest: [u8; 32],
        session_id: SessionId,
        round: u32,
        transport: Arc<T>,
    ) -> Self {
        signers.sort();
        signers.dedup();

        let ctx = RunContext {
            session_id,
            request_type: RequestType::Sign,
            round,
            participants: signers.clone(),
            transport,
        };

        Self {
            backend,
            share,
            signers,
            digest,
            ctx,
        }
    }

    /// Runs the protocol until a signature is produced or `deadline` passes. The signature is
    /// checked against the group key before it is returned.
    pub async fn sign(
        self,
        inbox: mpsc::UnboundedReceiver<SubmitRequest>,
        deadline: Instant,
    ) -> Result<SignatureData, TssError> {
        if self.signers.len() < self.share.threshold {
            return Err(TssError::TooFewParticipants {
                required: self.share.threshold,
                actual: self.signers.len(),
            });
        }

        let machine = self
            .backend
            .signing(&self.share, &self.signers, self.digest)?;
        let signature = driver::run(machine, &self.ctx, inbox, deadline)
            .await
            .inspect_err(|e| {
                warn!(
                    session = %self.ctx.session_id,
                    round = self.ctx.round,
                    "signing failed: {e}"
                )
            })?;

        if !signature.verify(self.digest, &self.share.public_key) {
            return Err(TssError::InvalidSignature);
        }

        info!(
            session = %self.ctx.session_id,
            round = self.ctx.round,
            digest = %hex::encode(self.digest),
            "signature produced"
        );
        Ok(signature)
    }
}
