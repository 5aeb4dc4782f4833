//! Zano emissions: the signature authorizes the prepared transaction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use tss_bridge_chains::{bridge_core::BridgeCore, client::ZanoClient};
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::signature::SignatureData;

use super::{mark_processed, Finalizer};
use crate::{data::ZanoData, errors::FinalizeError};

/// Records the emission and, on the leader, hands the signed emission to the wallet.
#[derive(Debug)]
pub struct ZanoFinalizer {
    client: Arc<dyn ZanoClient>,
    db: Arc<dyn DepositStore>,
    core: Arc<dyn BridgeCore>,
}

impl ZanoFinalizer {
    /// Creates a finalizer emitting through `client`.
    pub fn new(
        client: Arc<dyn ZanoClient>,
        db: Arc<dyn DepositStore>,
        core: Arc<dyn BridgeCore>,
    ) -> Self {
        Self { client, db, core }
    }
}

#[async_trait]
impl Finalizer for ZanoFinalizer {
    type Data = ZanoData;
    type Artifact = SignatureData;

    async fn persist(
        &self,
        data: &ZanoData,
        signatures: &[SignatureData],
    ) -> Result<SignatureData, FinalizeError> {
        let [signature] = signatures else {
            return Err(FinalizeError::Assemble(format!(
                "emission needs one signature, got {}",
                signatures.len()
            )));
        };

        mark_processed(
            self.db.as_ref(),
            &data.deposit.identifier,
            Some(signature.to_hex()),
            Some(data.emission.verified_tx_id.clone()),
        )
        .await?;

        Ok(*signature)
    }

    async fn submit(&self, data: &ZanoData, signature: SignatureData) -> Result<(), FinalizeError> {
        let tx_id = self
            .client
            .send_signed_emission(&data.emission, &signature)
            .await?;
        info!(%tx_id, deposit = %data.deposit.identifier, "emission sent");

        if let Some(stored) = self.db.get_deposit(&data.deposit.identifier).await? {
            self.core.submit_deposit(&stored).await?;
        }

        Ok(())
    }
}
