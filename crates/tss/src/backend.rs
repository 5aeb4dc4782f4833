//! The seam to the threshold ECDSA implementation.

use std::{fmt::Debug, sync::Arc};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tss_bridge_primitives::{party::Address, signature::SignatureData};

use crate::{dealer::DealerBackend, errors::TssError, share::KeyShare};

/// A wire message emitted by a protocol.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct OutMessage {
    /// Recipient of a point-to-point message. `None` sends it to every other participant.
    pub to: Option<Address>,

    /// Opaque protocol bytes.
    pub wire: Vec<u8>,
}

impl OutMessage {
    /// A message for every other participant.
    pub fn broadcast(wire: Vec<u8>) -> Self {
        Self { to: None, wire }
    }

    /// A message for a single participant.
    pub fn p2p(to: Address, wire: Vec<u8>) -> Self {
        Self { to: Some(to), wire }
    }

    /// Whether the message goes to every other participant.
    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }
}

/// A message-driven protocol run.
///
/// Messages from a given sender must be handed over in the order they were emitted.
pub trait StateMachine: Send + Debug {
    /// What a completed run yields.
    type Output;

    /// Messages to send before anything is received.
    fn start(&mut self) -> Result<Vec<OutMessage>, TssError>;

    /// Processes a message from `from` and returns the messages it triggers.
    fn handle(
        &mut self,
        from: &Address,
        wire: &[u8],
        broadcast: bool,
    ) -> Result<Vec<OutMessage>, TssError>;

    /// The result, once the run is complete.
    fn output(&mut self) -> Option<Self::Output>;
}

/// A signing run.
pub type SigningMachine = Box<dyn StateMachine<Output = SignatureData>>;

/// A key generation run.
pub type KeygenMachine = Box<dyn StateMachine<Output = KeyShare>>;

/// Creates protocol runs.
pub trait ThresholdBackend: Debug + Send + Sync + 'static {
    /// Which kind of shares this backend works with.
    fn kind(&self) -> BackendKind;

    /// A run signing `digest` with `share` among `signers`, the local party included.
    fn signing(
        &self,
        share: &KeyShare,
        signers: &[Address],
        digest: [u8; 32],
    ) -> Result<SigningMachine, TssError>;

    /// A run producing the local share of a new key among `parties`, the local party included.
    fn keygen(
        &self,
        me: &Address,
        parties: &[Address],
        threshold: usize,
    ) -> Result<KeygenMachine, TssError>;
}

/// Available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// [`DealerBackend`].
    Dealer,
}

impl BackendKind {
    /// Whether shares of this backend expose the whole group key to every party.
    pub const fn is_insecure(self) -> bool {
        match self {
            Self::Dealer => true,
        }
    }

    /// Instantiates the backend.
    pub fn build(self) -> Arc<dyn ThresholdBackend> {
        match self {
            Self::Dealer => Arc::new(DealerBackend::new()),
        }
    }
}
