//! The chain-specific half of consensus.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::{data::SigningData, errors::ConsensusError};

/// Decides what a round signs.
///
/// The leader asks its mechanism for a proposal, every other party asks its own mechanism
/// whether to accept it.
#[async_trait]
pub trait Mechanism: Debug + Send + Sync + 'static {
    /// What the mechanism proposes.
    type Data: SigningData;

    /// Forms the leader's proposal. `None` means there is nothing to sign this round.
    async fn form_proposal(&self) -> Result<Option<Self::Data>, ConsensusError>;

    /// Whether the local party agrees to sign `data`.
    ///
    /// Implementations may record side effects of the check, e.g. persisting a deposit they
    /// had not seen yet or marking an invalid one.
    async fn verify_proposal(&self, data: &Self::Data) -> bool;
}
