//! Errors of signing sessions and finalizers.

use thiserror::Error;
use tss_bridge_chains::errors::ChainError;
use tss_bridge_consensus::ConsensusError;
use tss_bridge_db::errors::DbError;
use tss_bridge_p2p::manager::ManagerError;
use tss_bridge_tss::TssError;

/// Why a session round ended without a finalized withdrawal.
///
/// Round errors never leave the session: they are logged and the next round starts on schedule.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Consensus or signature distribution failed.
    #[error("consensus: {0}")]
    Consensus(#[from] ConsensusError),

    /// A threshold protocol run failed.
    #[error("threshold signing: {0}")]
    Tss(#[from] TssError),

    /// The deposit store failed.
    #[error("deposit store: {0}")]
    Db(#[from] DbError),

    /// A chain backend failed.
    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    /// The session could not register with the session manager.
    #[error("session manager: {0}")]
    Manager(#[from] ManagerError),

    /// The signed artifact could not be completed or stored.
    #[error("finalize: {0}")]
    Finalize(#[from] FinalizeError),
}

/// Errors of the two finalization steps.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// The signatures do not complete the artifact.
    #[error("cannot assemble the signed artifact: {0}")]
    Assemble(String),

    /// The deposit store refused the result.
    #[error("deposit store: {0}")]
    Db(#[from] DbError),

    /// The chain or bridge module refused the artifact.
    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    /// The deposit is no longer processing.
    #[error("deposit {0} is not processing")]
    NotProcessing(String),
}
