//! Drives a [`StateMachine`] over the network.

use std::{collections::HashMap, sync::Arc};

use borsh::{BorshDeserialize, BorshSerialize};
use tokio::{
    sync::mpsc,
    time::{timeout_at, Instant},
};
use tracing::{debug, trace, warn};
use tss_bridge_p2p::{
    transport::Transport,
    wire::{RequestType, SubmitRequest},
};
use tss_bridge_primitives::{party::Address, session::SessionId};

use crate::{
    backend::{OutMessage, StateMachine},
    errors::TssError,
};

/// Payload of a threshold protocol message.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct TssWire {
    /// Index of the protocol run within the session, for sessions that run several.
    pub round: u32,

    /// Whether the message went to every participant.
    pub broadcast: bool,

    /// Opaque protocol bytes.
    pub data: Vec<u8>,
}

/// Extracts the run index of a threshold protocol payload.
pub fn wire_round(payload: &[u8]) -> Option<u32> {
    borsh::from_slice::<TssWire>(payload).ok().map(|w| w.round)
}

/// Where a protocol run takes place.
#[derive(Debug)]
pub struct RunContext<T> {
    /// The session the run belongs to.
    pub session_id: SessionId,

    /// Request type of the run's messages.
    pub request_type: RequestType,

    /// Index of the run within the session.
    pub round: u32,

    /// Every participant, the local party included.
    pub participants: Vec<Address>,

    /// The network.
    pub transport: Arc<T>,
}

/// Sends messages to each peer from a dedicated task, so that a slow peer does not hold up the
/// others while messages to the same peer keep their order.
#[derive(Debug)]
struct Outbox {
    queues: HashMap<Address, mpsc::UnboundedSender<SubmitRequest>>,
}

impl Outbox {
    fn new<T: Transport>(transport: &Arc<T>, peers: &[Address]) -> Self {
        let queues = peers
            .iter()
            .map(|peer| {
                let (tx, mut rx) = mpsc::unbounded_channel::<SubmitRequest>();
                let transport = transport.clone();
                let peer_addr = peer.clone();
                tokio::spawn(async move {
                    while let Some(request) = rx.recv().await {
                        if let Err(e) = transport.send(&peer_addr, request).await {
                            debug!(peer = %peer_addr, "failed to deliver protocol message: {e}");
                        }
                    }
                });
                (peer.clone(), tx)
            })
            .collect();

        Self { queues }
    }

    fn push<T: Transport>(&self, ctx: &RunContext<T>, out: OutMessage) -> Result<(), TssError> {
        let wire = TssWire {
            round: ctx.round,
            broadcast: out.is_broadcast(),
            data: out.wire,
        };
        let payload = borsh::to_vec(&wire).map_err(|e| TssError::Backend(e.to_string()))?;
        let request = ctx
            .transport
            .request(ctx.session_id.clone(), ctx.request_type, payload);

        match &out.to {
            Some(to) => match self.queues.get(to) {
                Some(queue) => {
                    let _ = queue.send(request);
                }
                None => warn!(%to, "protocol addressed a non participant"),
            },
            None => {
                for queue in self.queues.values() {
                    let _ = queue.send(request.clone());
                }
            }
        }

        Ok(())
    }
}

/// Runs `machine` until it produces its output or `deadline` passes.
pub async fn run<T, O>(
    mut machine: Box<dyn StateMachine<Output = O>>,
    ctx: &RunContext<T>,
    mut inbox: mpsc::UnboundedReceiver<SubmitRequest>,
    deadline: Instant,
) -> Result<O, TssError>
where
    T: Transport,
{
    let me = ctx.transport.local_address().clone();
    if !ctx.participants.contains(&me) {
        return Err(TssError::NotParticipant(me));
    }

    let peers: Vec<Address> = ctx
        .participants
        .iter()
        .filter(|p| *p != &me)
        .cloned()
        .collect();
    let outbox = Outbox::new(&ctx.transport, &peers);

    for out in machine.start()? {
        outbox.push(ctx, out)?;
    }

    loop {
        if let Some(output) = machine.output() {
            debug!(session = %ctx.session_id, round = ctx.round, "protocol run complete");
            return Ok(output);
        }

        let request = match timeout_at(deadline, inbox.recv()).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                return Err(TssError::Backend("inbox closed".to_string()));
            }
            Err(_) => return Err(TssError::Timeout),
        };

        if !peers.contains(&request.sender) {
            warn!(sender = %request.sender, "dropping protocol message from a non participant");
            continue;
        }
        if request.request_type != ctx.request_type || request.session_id != ctx.session_id {
            trace!(sender = %request.sender, "dropping message of another run");
            continue;
        }

        let wire: TssWire = match borsh::from_slice(&request.payload) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(sender = %request.sender, "dropping malformed protocol message: {e}");
                continue;
            }
        };
        if wire.round != ctx.round {
            trace!(
                sender = %request.sender,
                round = wire.round,
                "dropping message of another run"
            );
            continue;
        }

        for out in machine.handle(&request.sender, &wire.data, wire.broadcast)? {
            outbox.push(ctx, out)?;
        }
    }
}
