//! Claims: the signature is the withdrawal.

use std::sync::Arc;

use async_trait::async_trait;
use tss_bridge_chains::bridge_core::BridgeCore;
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::{chain::ChainType, deposit::Deposit, signature::SignatureData};

use super::{mark_processed, Finalizer};
use crate::{data::ClaimData, errors::FinalizeError};

/// Stores the claim signature and hands the deposit to the bridge module, from which the
/// receiver or an aggregator picks the claim up.
#[derive(Debug)]
pub struct ClaimFinalizer {
    db: Arc<dyn DepositStore>,
    core: Arc<dyn BridgeCore>,
}

impl ClaimFinalizer {
    /// Creates a finalizer recording into `db` and submitting to `core`.
    pub fn new(db: Arc<dyn DepositStore>, core: Arc<dyn BridgeCore>) -> Self {
        Self { db, core }
    }
}

#[async_trait]
impl Finalizer for ClaimFinalizer {
    type Data = ClaimData;
    type Artifact = Deposit;

    async fn persist(
        &self,
        data: &ClaimData,
        signatures: &[SignatureData],
    ) -> Result<Deposit, FinalizeError> {
        let [signature] = signatures else {
            return Err(FinalizeError::Assemble(format!(
                "claim needs one signature, got {}",
                signatures.len()
            )));
        };
        let encoded = match data.family {
            ChainType::Evm => signature.to_evm_hex(),
            _ => signature.to_hex(),
        };

        let id = &data.deposit.identifier;
        mark_processed(self.db.as_ref(), id, Some(encoded), None).await?;
        self.db
            .get_deposit(id)
            .await?
            .ok_or_else(|| FinalizeError::NotProcessing(id.to_string()))
    }

    async fn submit(&self, _data: &ClaimData, deposit: Deposit) -> Result<(), FinalizeError> {
        self.core.submit_deposit(&deposit).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secp256k1::{Message, SECP256K1};
    use tss_bridge_consensus::SigningData;
    use tss_bridge_db::inmemory::InMemoryDepositStore;
    use tss_bridge_primitives::deposit::WithdrawalStatus;
    use tss_bridge_test_utils::prelude::*;

    use super::*;
    use crate::finalizer::finalize;

    #[tokio::test]
    async fn leader_records_and_submits_the_claim() {
        let db = Arc::new(InMemoryDepositStore::new());
        let core = Arc::new(MockBridgeCore::new());
        let deposit = generate_deposit("56", "1");
        db.insert_deposit(&deposit).await.expect("must insert");
        db.transition(
            &deposit.identifier,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Processing,
        )
        .await
        .expect("must transition");

        let data = ClaimData {
            family: ChainType::Evm,
            deposit: deposit.clone(),
        };
        let key = generate_secret_key();
        let digest = data.digests()[0];
        let signature = SignatureData::from_recoverable(
            &SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(digest), &key),
        );

        let finalizer = ClaimFinalizer::new(db.clone(), core.clone());
        finalize(&finalizer, db.as_ref(), &data, &[signature], true)
            .await
            .expect("must finalize");

        let stored = db
            .get_deposit(&deposit.identifier)
            .await
            .expect("must read")
            .expect("must exist");
        assert_eq!(stored.status, WithdrawalStatus::Processed);
        assert_eq!(stored.signature, Some(signature.to_evm_hex()));
        assert_eq!(core.submitted(), vec![stored]);
    }

    #[tokio::test]
    async fn missing_signature_fails_the_deposit() {
        let db = Arc::new(InMemoryDepositStore::new());
        let core = Arc::new(MockBridgeCore::new());
        let deposit = generate_deposit("56", "1");
        db.insert_deposit(&deposit).await.expect("must insert");
        db.transition(
            &deposit.identifier,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Processing,
        )
        .await
        .expect("must transition");

        let data = ClaimData {
            family: ChainType::Evm,
            deposit: deposit.clone(),
        };
        let finalizer = ClaimFinalizer::new(db.clone(), core.clone());
        let result = finalize(&finalizer, db.as_ref(), &data, &[], false).await;
        assert!(matches!(result, Err(FinalizeError::Assemble(_))));

        let stored = db
            .get_deposit(&deposit.identifier)
            .await
            .expect("must read")
            .expect("must exist");
        assert_eq!(stored.status, WithdrawalStatus::Failed);
        assert!(core.submitted().is_empty());
    }
}
