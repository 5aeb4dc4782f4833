//! The deposit store interface.

use std::fmt::Debug;

use async_trait::async_trait;
use tss_bridge_primitives::{
    chain::ChainId,
    deposit::{Deposit, DepositIdentifier, WithdrawalStatus},
};

use crate::errors::DbResult;

/// Persistent map from deposit identifier to deposit record.
///
/// Every mutation is atomic. Status changes are compare-and-set: they only apply when the stored
/// status matches the expected one, which is how concurrent sessions avoid double-processing a
/// deposit.
#[async_trait]
pub trait DepositStore: Debug + Send + Sync {
    /// Inserts a deposit unless one with the same identifier exists.
    ///
    /// Returns whether the row was inserted.
    async fn insert_deposit(&self, deposit: &Deposit) -> DbResult<bool>;

    /// Looks up a deposit.
    async fn get_deposit(&self, id: &DepositIdentifier) -> DbResult<Option<Deposit>>;

    /// Pending deposits withdrawing to `destination`, oldest first.
    async fn pending_deposits(&self, destination: &ChainId, limit: u32) -> DbResult<Vec<Deposit>>;

    /// Pending deposits this node has not yet announced to its peers, oldest first.
    async fn undistributed_deposits(&self, limit: u32) -> DbResult<Vec<DepositIdentifier>>;

    /// Marks every deposit in `ids` as distributed in a single transaction.
    async fn mark_distributed(&self, ids: &[DepositIdentifier]) -> DbResult<()>;

    /// Moves a deposit from `from` to `to` if it is currently in `from`.
    ///
    /// Returns whether the status changed. Fails if the transition is not legal.
    async fn transition(
        &self,
        id: &DepositIdentifier,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> DbResult<bool>;

    /// Marks a processing deposit as processed, recording the signature and/or the withdrawal
    /// transaction hash.
    ///
    /// Returns whether the status changed.
    async fn mark_processed(
        &self,
        id: &DepositIdentifier,
        signature: Option<String>,
        withdrawal_tx_hash: Option<String>,
    ) -> DbResult<bool>;
}

pub(crate) fn check_transition(from: WithdrawalStatus, to: WithdrawalStatus) -> DbResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(crate::errors::DbError::IllegalTransition(format!(
            "{from} -> {to}"
        )))
    }
}
