//! Withdrawals to chains where the receiver claims with the bridge signature.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use tss_bridge_chains::{claim::claim_digest, fetcher::DepositFetcher};
use tss_bridge_consensus::{ConsensusError, Mechanism, SigningData};
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::chain::{ChainId, ChainType};

use super::{check_deposit, reject_pending, PENDING_BATCH};
use crate::data::ClaimData;

/// Proposes one pending deposit per round for an EVM, TON or Solana chain.
#[derive(Debug)]
pub struct ClaimMechanism {
    chain_id: ChainId,
    family: ChainType,
    db: Arc<dyn DepositStore>,
    fetcher: DepositFetcher,
}

impl ClaimMechanism {
    /// Creates the mechanism of `chain_id`.
    pub fn new(
        chain_id: ChainId,
        family: ChainType,
        db: Arc<dyn DepositStore>,
        fetcher: DepositFetcher,
    ) -> Self {
        Self {
            chain_id,
            family,
            db,
            fetcher,
        }
    }
}

#[async_trait]
impl Mechanism for ClaimMechanism {
    type Data = ClaimData;

    async fn form_proposal(&self) -> Result<Option<ClaimData>, ConsensusError> {
        let pending = self
            .db
            .pending_deposits(&self.chain_id, PENDING_BATCH)
            .await
            .map_err(|e| ConsensusError::Mechanism(e.to_string()))?;

        for deposit in pending {
            match claim_digest(self.family, &deposit) {
                Ok(_) => {
                    debug!(deposit = %deposit.identifier, "proposing claim");
                    return Ok(Some(ClaimData {
                        family: self.family,
                        deposit,
                    }));
                }
                Err(e) => reject_pending(self.db.as_ref(), &deposit, &e.to_string()).await,
            }
        }

        Ok(None)
    }

    async fn verify_proposal(&self, data: &ClaimData) -> bool {
        if data.family != self.family || data.deposit.destination_chain_id != self.chain_id {
            warn!(deposit = %data.deposit.identifier, "claim proposed for another chain");
            return false;
        }
        if data.digests().is_empty() {
            return false;
        }

        check_deposit(self.db.as_ref(), &self.fetcher, &data.deposit).await
    }
}

#[cfg(test)]
mod tests {
    use tss_bridge_chains::registry::ChainRegistry;
    use tss_bridge_db::inmemory::InMemoryDepositStore;
    use tss_bridge_primitives::deposit::WithdrawalStatus;
    use tss_bridge_test_utils::prelude::*;

    use super::*;

    fn mechanism(db: Arc<InMemoryDepositStore>) -> ClaimMechanism {
        let fetcher = DepositFetcher::new(
            Arc::new(ChainRegistry::new()),
            Arc::new(MockBridgeCore::new()),
        );
        ClaimMechanism::new(ChainId::from("1"), ChainType::Evm, db, fetcher)
    }

    #[tokio::test]
    async fn leader_skips_unclaimable_deposits() {
        let db = Arc::new(InMemoryDepositStore::new());
        let mut broken = generate_deposit("56", "1");
        broken.destination_address = "not an address".into();
        let good = generate_deposit("56", "1");
        db.insert_deposit(&broken).await.expect("must insert");
        db.insert_deposit(&good).await.expect("must insert");

        let mechanism = mechanism(db.clone());
        let proposal = mechanism
            .form_proposal()
            .await
            .expect("must form")
            .expect("a deposit is pending");
        assert_eq!(proposal.deposit, good);
        assert_eq!(proposal.digests().len(), 1);

        let broken = db
            .get_deposit(&broken.identifier)
            .await
            .expect("must read")
            .expect("must exist");
        assert_eq!(broken.status, WithdrawalStatus::Invalid);
    }

    #[tokio::test]
    async fn followers_accept_only_pending_local_deposits() {
        let db = Arc::new(InMemoryDepositStore::new());
        let deposit = generate_deposit("56", "1");
        db.insert_deposit(&deposit).await.expect("must insert");
        let mechanism = mechanism(db.clone());

        let data = ClaimData {
            family: ChainType::Evm,
            deposit: deposit.clone(),
        };
        assert!(mechanism.verify_proposal(&data).await);

        let wrong_family = ClaimData {
            family: ChainType::Ton,
            deposit: deposit.clone(),
        };
        assert!(!mechanism.verify_proposal(&wrong_family).await);

        db.transition(
            &deposit.identifier,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Processing,
        )
        .await
        .expect("must transition");
        assert!(!mechanism.verify_proposal(&data).await);
    }
}
