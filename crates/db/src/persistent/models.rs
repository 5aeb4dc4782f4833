//! This module contains the models for the database tables.
//!
//! These models rely on the column types in [`super::types`].

use tss_bridge_primitives::{
    chain::ChainId,
    deposit::{Deposit, DepositIdentifier},
};

use super::{
    errors::StorageError,
    types::{DbAmount, DbWithdrawalStatus},
};

/// A row of the `deposits` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct DepositRecord {
    pub(super) tx_hash: String,
    pub(super) tx_nonce: i64,
    pub(super) chain_id: String,
    pub(super) source_address: String,
    pub(super) deposit_amount: DbAmount,
    pub(super) deposit_token: String,
    pub(super) deposit_block: i64,
    pub(super) destination_address: String,
    pub(super) destination_chain_id: String,
    pub(super) withdrawal_amount: DbAmount,
    pub(super) withdrawal_token: String,
    pub(super) is_wrapped_token: bool,
    pub(super) referral_id: i64,
    pub(super) withdrawal_status: DbWithdrawalStatus,
    pub(super) withdrawal_tx_hash: Option<String>,
    pub(super) signature: Option<String>,
    pub(super) distributed: bool,
}

impl DepositRecord {
    /// Converts the row into a [`Deposit`].
    pub(super) fn into_typed(self) -> Result<Deposit, StorageError> {
        let mismatch = |field: &str, value: i64| {
            StorageError::MismatchedTypes(format!("{field} out of range: {value}"))
        };

        Ok(Deposit {
            identifier: DepositIdentifier {
                tx_hash: self.tx_hash,
                tx_nonce: u64::try_from(self.tx_nonce)
                    .map_err(|_| mismatch("tx_nonce", self.tx_nonce))?,
                chain_id: ChainId::from(self.chain_id),
            },
            source_address: self.source_address,
            deposit_amount: *self.deposit_amount,
            deposit_token: self.deposit_token,
            deposit_block: u64::try_from(self.deposit_block)
                .map_err(|_| mismatch("deposit_block", self.deposit_block))?,
            destination_address: self.destination_address,
            destination_chain_id: ChainId::from(self.destination_chain_id),
            withdrawal_amount: *self.withdrawal_amount,
            withdrawal_token: self.withdrawal_token,
            is_wrapped_token: self.is_wrapped_token,
            referral_id: u16::try_from(self.referral_id)
                .map_err(|_| mismatch("referral_id", self.referral_id))?,
            status: *self.withdrawal_status,
            signature: self.signature,
            withdrawal_tx_hash: self.withdrawal_tx_hash,
            distributed: self.distributed,
        })
    }
}
