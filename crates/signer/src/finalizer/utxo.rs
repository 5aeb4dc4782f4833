//! Bitcoin transactions: the signatures complete the witnesses.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Transaction;
use secp256k1::PublicKey;
use tracing::info;
use tss_bridge_chains::{bridge_core::BridgeCore, client::UtxoClient};
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::signature::SignatureData;

use super::{mark_processed, Finalizer};
use crate::{
    data::{UtxoData, UtxoPurpose},
    errors::FinalizeError,
};

/// Signs every input, locks the spent outputs and, on the leader, broadcasts the transaction.
#[derive(Debug)]
pub struct UtxoFinalizer {
    client: Arc<dyn UtxoClient>,
    group_key: PublicKey,
    db: Arc<dyn DepositStore>,
    core: Arc<dyn BridgeCore>,
}

impl UtxoFinalizer {
    /// Creates a finalizer for the outputs of `group_key` held by `client`.
    pub fn new(
        client: Arc<dyn UtxoClient>,
        group_key: PublicKey,
        db: Arc<dyn DepositStore>,
        core: Arc<dyn BridgeCore>,
    ) -> Self {
        Self {
            client,
            group_key,
            db,
            core,
        }
    }
}

#[async_trait]
impl Finalizer for UtxoFinalizer {
    type Data = UtxoData;
    type Artifact = Transaction;

    async fn persist(
        &self,
        data: &UtxoData,
        signatures: &[SignatureData],
    ) -> Result<Transaction, FinalizeError> {
        let tx = data
            .tx
            .sign(signatures, &self.group_key)
            .map_err(|e| FinalizeError::Assemble(e.to_string()))?;
        let txid = tx.compute_txid();

        // spent outputs must not be proposed again while the transaction confirms
        self.client.lock_outputs(&data.tx.outpoints()).await?;

        if let UtxoPurpose::Withdrawal(deposit) = &data.purpose {
            // one signature per input, in input order
            let encoded = signatures
                .iter()
                .map(SignatureData::to_hex)
                .collect::<Vec<_>>()
                .join(",");
            mark_processed(
                self.db.as_ref(),
                &deposit.identifier,
                Some(encoded),
                Some(txid.to_string()),
            )
            .await?;
        }

        Ok(tx)
    }

    async fn submit(&self, data: &UtxoData, tx: Transaction) -> Result<(), FinalizeError> {
        let txid = self.client.send_signed_transaction(&tx).await?;
        info!(%txid, inputs = tx.input.len(), "transaction broadcast");

        if let UtxoPurpose::Withdrawal(deposit) = &data.purpose {
            if let Some(stored) = self.db.get_deposit(&deposit.identifier).await? {
                self.core.submit_deposit(&stored).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{hashes::Hash, Amount as BtcAmount, OutPoint, Txid};
    use secp256k1::{Message, SecretKey, SECP256K1};
    use tss_bridge_chains::utxo::{build_consolidation, build_withdrawal, group_script, Utxo};
    use tss_bridge_consensus::SigningData;
    use tss_bridge_db::inmemory::InMemoryDepositStore;
    use tss_bridge_primitives::deposit::WithdrawalStatus;
    use tss_bridge_test_utils::prelude::*;

    use super::*;
    use crate::finalizer::finalize;

    fn sign_all(data: &UtxoData, key: &SecretKey) -> Vec<SignatureData> {
        data.digests()
            .into_iter()
            .map(|digest| {
                SignatureData::from_recoverable(
                    &SECP256K1.sign_ecdsa_recoverable(&Message::from_digest(digest), key),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn consolidation_locks_and_broadcasts() {
        let key = generate_secret_key();
        let group_key = key.public_key(SECP256K1);
        let utxos: Vec<_> = (0..3u8)
            .map(|i| Utxo {
                outpoint: OutPoint {
                    txid: Txid::from_byte_array([i + 1; 32]),
                    vout: 1,
                },
                amount: BtcAmount::from_sat(20_000),
                script_pubkey: group_script(&group_key),
            })
            .collect();
        let client = Arc::new(MockUtxoClient::new("bitcoin", 2, utxos.clone()));
        let db = Arc::new(InMemoryDepositStore::new());
        let core = Arc::new(MockBridgeCore::new());

        let data = UtxoData {
            purpose: UtxoPurpose::Consolidation,
            tx: build_consolidation(&utxos, group_script(&group_key), 2).expect("must build"),
        };
        let signatures = sign_all(&data, &key);

        let finalizer = UtxoFinalizer::new(client.clone(), group_key, db.clone(), core.clone());
        finalize(&finalizer, db.as_ref(), &data, &signatures, true)
            .await
            .expect("must finalize");

        assert_eq!(client.locked().len(), 3);
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].compute_txid(), data.tx.txid());
        assert!(sent[0].input.iter().all(|i| i.witness.len() == 2));
        assert!(core.submitted().is_empty());
    }

    #[tokio::test]
    async fn withdrawal_records_the_hash_and_every_input_signature() {
        let key = generate_secret_key();
        let group_key = key.public_key(SECP256K1);
        let utxos: Vec<_> = (0..2u8)
            .map(|i| Utxo {
                outpoint: OutPoint {
                    txid: Txid::from_byte_array([i + 1; 32]),
                    vout: 0,
                },
                amount: BtcAmount::from_sat(30_000),
                script_pubkey: group_script(&group_key),
            })
            .collect();
        let client = Arc::new(MockUtxoClient::new("bitcoin", 2, utxos.clone()));
        let db = Arc::new(InMemoryDepositStore::new());
        let core = Arc::new(MockBridgeCore::new());

        let deposit = generate_deposit("1", "bitcoin");
        db.insert_deposit(&deposit).await.expect("must insert");
        db.transition(
            &deposit.identifier,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Processing,
        )
        .await
        .expect("must start processing");

        let recipient = group_script(&generate_secret_key().public_key(SECP256K1));
        let tx = build_withdrawal(&utxos, recipient, 40_000, group_script(&group_key), 2)
            .expect("must build");
        assert_eq!(tx.tx.input.len(), 2);
        let data = UtxoData {
            purpose: UtxoPurpose::Withdrawal(deposit.clone()),
            tx,
        };
        let signatures = sign_all(&data, &key);

        let finalizer = UtxoFinalizer::new(client.clone(), group_key, db.clone(), core.clone());
        finalize(&finalizer, db.as_ref(), &data, &signatures, false)
            .await
            .expect("must finalize");

        let stored = db
            .get_deposit(&deposit.identifier)
            .await
            .expect("must read")
            .expect("must be stored");
        assert_eq!(stored.status, WithdrawalStatus::Processed);
        assert_eq!(stored.withdrawal_tx_hash, Some(data.tx.txid().to_string()));
        let expected: Vec<_> = signatures.iter().map(SignatureData::to_hex).collect();
        assert_eq!(stored.signature, Some(expected.join(",")));
        assert!(client.sent().is_empty(), "only the leader broadcasts");
    }
}
