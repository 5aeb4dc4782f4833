//! Withdrawals and consolidations on bitcoin-family chains.

use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::{address::NetworkUnchecked, Address, ScriptBuf};
use secp256k1::PublicKey;
use tracing::{debug, info, warn};
use tss_bridge_chains::{
    client::UtxoClient,
    errors::ChainError,
    fetcher::DepositFetcher,
    utxo::{
        build_consolidation, build_withdrawal, check_proposed_tx, group_script, ExpectedOutputs,
        Utxo, CONSOLIDATION_MAX_INPUTS, CONSOLIDATION_THRESHOLD, MAX_WITHDRAWAL_INPUTS,
    },
};
use tss_bridge_consensus::{ConsensusError, Mechanism};
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::deposit::Deposit;

use super::{check_deposit, reject_pending, PENDING_BATCH};
use crate::data::{UtxoData, UtxoPurpose};

/// Proposes a withdrawal transaction spending the bridge outputs, or a consolidation once they
/// pile up.
#[derive(Debug)]
pub struct UtxoMechanism {
    client: Arc<dyn UtxoClient>,
    group_key: PublicKey,
    db: Arc<dyn DepositStore>,
    fetcher: DepositFetcher,
}

impl UtxoMechanism {
    /// Creates the mechanism spending outputs of `group_key` through `client`.
    pub fn new(
        client: Arc<dyn UtxoClient>,
        group_key: PublicKey,
        db: Arc<dyn DepositStore>,
        fetcher: DepositFetcher,
    ) -> Self {
        Self {
            client,
            group_key,
            db,
            fetcher,
        }
    }

    /// Unspent outputs paying the group script, and the current fee rate.
    async fn wallet(&self) -> Result<(Vec<Utxo>, u64), ChainError> {
        let script = group_script(&self.group_key);
        let spendable = self
            .client
            .list_unspent()
            .await?
            .into_iter()
            .filter(|u| u.script_pubkey == script)
            .collect();
        let fee_rate = self.client.fee_rate().await?;
        Ok((spendable, fee_rate))
    }

    fn recipient(&self, deposit: &Deposit) -> Option<(ScriptBuf, u64)> {
        let address = deposit
            .destination_address
            .parse::<Address<NetworkUnchecked>>()
            .ok()?
            .require_network(self.client.network())
            .ok()?;
        let amount = deposit.withdrawal_amount.to_u64()?;
        Some((address.script_pubkey(), amount))
    }
}

fn mechanism_err(e: ChainError) -> ConsensusError {
    ConsensusError::Mechanism(e.to_string())
}

#[async_trait]
impl Mechanism for UtxoMechanism {
    type Data = UtxoData;

    async fn form_proposal(&self) -> Result<Option<UtxoData>, ConsensusError> {
        let (spendable, fee_rate) = self.wallet().await.map_err(mechanism_err)?;
        let change = group_script(&self.group_key);

        if spendable.len() > CONSOLIDATION_THRESHOLD {
            let tx = build_consolidation(&spendable, change, fee_rate)
                .map_err(mechanism_err)?;
            info!(
                spendable = spendable.len(),
                inputs = tx.input_count(),
                "proposing consolidation"
            );
            return Ok(Some(UtxoData {
                purpose: UtxoPurpose::Consolidation,
                tx,
            }));
        }

        let chain_id = self.client.chain_id().clone();
        let pending = self
            .db
            .pending_deposits(&chain_id, PENDING_BATCH)
            .await
            .map_err(|e| ConsensusError::Mechanism(e.to_string()))?;

        for deposit in pending {
            let Some((recipient, amount)) = self.recipient(&deposit) else {
                reject_pending(self.db.as_ref(), &deposit, "receiver or amount").await;
                continue;
            };

            match build_withdrawal(&spendable, recipient, amount, change.clone(), fee_rate) {
                Ok(tx) => {
                    debug!(
                        deposit = %deposit.identifier,
                        inputs = tx.input_count(),
                        "proposing withdrawal"
                    );
                    return Ok(Some(UtxoData {
                        purpose: UtxoPurpose::Withdrawal(deposit),
                        tx,
                    }));
                }
                // later deposits may be smaller, but withdrawals stay in arrival order
                Err(e @ ChainError::InsufficientFunds { .. }) => {
                    warn!(deposit = %deposit.identifier, "cannot fund withdrawal: {e}");
                    return Ok(None);
                }
                Err(e) => return Err(mechanism_err(e)),
            }
        }

        Ok(None)
    }

    async fn verify_proposal(&self, data: &UtxoData) -> bool {
        let (payment, max_inputs) = match &data.purpose {
            UtxoPurpose::Withdrawal(deposit) => {
                if &deposit.destination_chain_id != self.client.chain_id() {
                    warn!(deposit = %deposit.identifier, "withdrawal proposed for another chain");
                    return false;
                }
                if !check_deposit(self.db.as_ref(), &self.fetcher, deposit).await {
                    return false;
                }
                let Some(payment) = self.recipient(deposit) else {
                    return false;
                };
                (Some(payment), MAX_WITHDRAWAL_INPUTS)
            }
            UtxoPurpose::Consolidation => (None, CONSOLIDATION_MAX_INPUTS),
        };

        if data.tx.input_count() == 0 || data.tx.input_count() > max_inputs {
            warn!(inputs = data.tx.input_count(), "proposed transaction has too many inputs");
            return false;
        }

        let (spendable, fee_rate) = match self.wallet().await {
            Ok(wallet) => wallet,
            Err(e) => {
                warn!("cannot read the bridge wallet: {e}");
                return false;
            }
        };
        let expected = ExpectedOutputs {
            payment,
            change: group_script(&self.group_key),
        };

        match check_proposed_tx(&data.tx, &spendable, &expected, fee_rate) {
            Ok(()) => true,
            Err(e) => {
                warn!(txid = %data.tx.txid(), "refusing proposed transaction: {e}");
                false
            }
        }
    }
}
