//! One-shot distributed key generation.

use std::sync::Arc;

use tokio::{sync::mpsc, time::Instant};
use tracing::info;
use tss_bridge_p2p::{
    transport::Transport,
    wire::{RequestType, SubmitRequest},
};
use tss_bridge_primitives::{party::Address, session::SessionId};

use crate::{
    backend::ThresholdBackend,
    driver::{self, RunContext},
    errors::TssError,
    share::KeyShare,
};

/// The local party's part in generating a new group key.
#[derive(Debug)]
pub struct KeygenParty<T> {
    backend: Arc<dyn ThresholdBackend>,
    threshold: usize,
    ctx: RunContext<T>,
}

impl<T: Transport> KeygenParty<T> {
    /// Prepares a key generation run among `parties`.
    pub fn new(
        backend: Arc<dyn ThresholdBackend>,
        mut parties: Vec<Address>,
        threshold: usize,
        session_id: SessionId,
        transport: Arc<T>,
    ) -> Self {
        parties.sort();
        parties.dedup();

        Self {
            backend,
            threshold,
            ctx: RunContext {
                session_id,
                request_type: RequestType::Keygen,
                round: 0,
                participants: parties,
                transport,
            },
        }
    }

    /// Runs the protocol until the local share is produced or `deadline` passes.
    pub async fn run(
        self,
        inbox: mpsc::UnboundedReceiver<SubmitRequest>,
        deadline: Instant,
    ) -> Result<KeyShare, TssError> {
        let me = self.ctx.transport.local_address();
        let machine = self
            .backend
            .keygen(me, &self.ctx.participants, self.threshold)?;

        let share = driver::run(machine, &self.ctx, inbox, deadline).await?;
        share.validate()?;

        info!(
            session = %self.ctx.session_id,
            public_key = %share.public_key,
            "key generation complete"
        );
        Ok(share)
    }
}
