//! Asset emissions of the Zano bridge wallet.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use tss_bridge_chains::{client::ZanoClient, fetcher::DepositFetcher};
use tss_bridge_consensus::{ConsensusError, Mechanism};
use tss_bridge_db::deposits::DepositStore;

use super::{check_deposit, PENDING_BATCH};
use crate::data::ZanoData;

/// The leader prepares the emission in its wallet, followers decrypt and check it in theirs.
#[derive(Debug)]
pub struct ZanoMechanism {
    client: Arc<dyn ZanoClient>,
    db: Arc<dyn DepositStore>,
    fetcher: DepositFetcher,
}

impl ZanoMechanism {
    /// Creates the mechanism emitting through `client`.
    pub fn new(
        client: Arc<dyn ZanoClient>,
        db: Arc<dyn DepositStore>,
        fetcher: DepositFetcher,
    ) -> Self {
        Self {
            client,
            db,
            fetcher,
        }
    }
}

#[async_trait]
impl Mechanism for ZanoMechanism {
    type Data = ZanoData;

    async fn form_proposal(&self) -> Result<Option<ZanoData>, ConsensusError> {
        let pending = self
            .db
            .pending_deposits(self.client.chain_id(), PENDING_BATCH)
            .await
            .map_err(|e| ConsensusError::Mechanism(e.to_string()))?;
        let Some(deposit) = pending.into_iter().next() else {
            return Ok(None);
        };

        let emission = self
            .client
            .emit_asset(
                &deposit.withdrawal_token,
                &deposit.destination_address,
                &deposit.withdrawal_amount,
            )
            .await
            .map_err(|e| ConsensusError::Mechanism(e.to_string()))?;
        debug!(
            deposit = %deposit.identifier,
            tx_id = %emission.verified_tx_id,
            "proposing emission"
        );

        Ok(Some(ZanoData { deposit, emission }))
    }

    async fn verify_proposal(&self, data: &ZanoData) -> bool {
        let deposit = &data.deposit;
        if &deposit.destination_chain_id != self.client.chain_id() {
            warn!(deposit = %deposit.identifier, "emission proposed for another chain");
            return false;
        }
        if data.emission.digest().is_err() {
            return false;
        }
        if !check_deposit(self.db.as_ref(), &self.fetcher, deposit).await {
            return false;
        }

        match self
            .client
            .verify_emission(
                &data.emission,
                &deposit.withdrawal_token,
                &deposit.destination_address,
                &deposit.withdrawal_amount,
            )
            .await
        {
            Ok(valid) => valid,
            Err(e) => {
                warn!(deposit = %deposit.identifier, "cannot verify emission: {e}");
                false
            }
        }
    }
}
