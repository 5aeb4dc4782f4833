//! Turning distributed signatures into a withdrawal.
//!
//! Finalization has two steps. Every party that accepted the round assembles the signed artifact
//! and records it in its store; a failure there marks the deposit failed. Only the round's leader
//! then publishes the artifact, and a failure there is only logged since the deposit is already
//! processed everywhere.

mod claim;
mod utxo;
mod zano;

use std::fmt::Debug;

use async_trait::async_trait;
use tracing::{error, info, warn};
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::{
    deposit::{DepositIdentifier, WithdrawalStatus},
    signature::SignatureData,
};

pub use self::{claim::ClaimFinalizer, utxo::UtxoFinalizer, zano::ZanoFinalizer};
use crate::{data::WithdrawalData, errors::FinalizeError};

/// Completes the withdrawal of one chain family.
#[async_trait]
pub trait Finalizer: Debug + Send + Sync + 'static {
    /// What the round signed.
    type Data: WithdrawalData;

    /// The signed artifact handed from the first step to the second.
    type Artifact: Send + Sync;

    /// Assembles the artifact and records it locally.
    async fn persist(
        &self,
        data: &Self::Data,
        signatures: &[SignatureData],
    ) -> Result<Self::Artifact, FinalizeError>;

    /// Publishes the artifact. Only run by the leader.
    async fn submit(&self, data: &Self::Data, artifact: Self::Artifact)
        -> Result<(), FinalizeError>;
}

/// Runs both finalization steps of a round.
pub async fn finalize<F: Finalizer>(
    finalizer: &F,
    db: &dyn DepositStore,
    data: &F::Data,
    signatures: &[SignatureData],
    is_leader: bool,
) -> Result<(), FinalizeError> {
    let artifact = match finalizer.persist(data, signatures).await {
        Ok(artifact) => artifact,
        Err(e) => {
            if let Some(deposit) = data.deposit() {
                mark_failed(db, &deposit.identifier).await;
            }
            return Err(e);
        }
    };

    if is_leader {
        if let Err(e) = finalizer.submit(data, artifact).await {
            error!("failed to publish the signed withdrawal: {e}");
        } else {
            info!("signed withdrawal published");
        }
    }

    Ok(())
}

/// Marks a processing deposit failed.
pub(crate) async fn mark_failed(db: &dyn DepositStore, id: &DepositIdentifier) {
    match db
        .transition(id, WithdrawalStatus::Processing, WithdrawalStatus::Failed)
        .await
    {
        Ok(true) => warn!(deposit = %id, "withdrawal failed"),
        Ok(false) => {}
        Err(e) => error!(deposit = %id, "failed to mark withdrawal failed: {e}"),
    }
}

/// Records the result of a processing deposit.
pub(crate) async fn mark_processed(
    db: &dyn DepositStore,
    id: &DepositIdentifier,
    signature: Option<String>,
    tx_hash: Option<String>,
) -> Result<(), FinalizeError> {
    if db.mark_processed(id, signature, tx_hash).await? {
        info!(deposit = %id, "withdrawal processed");
        Ok(())
    } else {
        Err(FinalizeError::NotProcessing(id.to_string()))
    }
}
