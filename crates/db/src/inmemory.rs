//! In-memory deposit store.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;
use tss_bridge_primitives::{
    chain::ChainId,
    deposit::{Deposit, DepositIdentifier, WithdrawalStatus},
};

use crate::{
    deposits::{check_transition, DepositStore},
    errors::DbResult,
};

#[derive(Debug, Default)]
struct Table {
    /// insertion order, mirrors the autoincrement key of the persistent table
    order: Vec<DepositIdentifier>,

    rows: HashMap<DepositIdentifier, Deposit>,
}

/// Deposit store that keeps everything in memory. Cloning shares the same table.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDepositStore {
    table: Arc<RwLock<Table>>,
}

impl InMemoryDepositStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DepositStore for InMemoryDepositStore {
    async fn insert_deposit(&self, deposit: &Deposit) -> DbResult<bool> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(&deposit.identifier) {
            trace!(id = %deposit.identifier, "deposit already stored");
            return Ok(false);
        }

        table.order.push(deposit.identifier.clone());
        table
            .rows
            .insert(deposit.identifier.clone(), deposit.clone());

        Ok(true)
    }

    async fn get_deposit(&self, id: &DepositIdentifier) -> DbResult<Option<Deposit>> {
        Ok(self.table.read().await.rows.get(id).cloned())
    }

    async fn pending_deposits(&self, destination: &ChainId, limit: u32) -> DbResult<Vec<Deposit>> {
        let table = self.table.read().await;

        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|d| {
                d.status == WithdrawalStatus::Pending && &d.destination_chain_id == destination
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn undistributed_deposits(&self, limit: u32) -> DbResult<Vec<DepositIdentifier>> {
        let table = self.table.read().await;

        Ok(table
            .order
            .iter()
            .filter_map(|id| table.rows.get(id))
            .filter(|d| d.status == WithdrawalStatus::Pending && !d.distributed)
            .take(limit as usize)
            .map(|d| d.identifier.clone())
            .collect())
    }

    async fn mark_distributed(&self, ids: &[DepositIdentifier]) -> DbResult<()> {
        let mut table = self.table.write().await;
        for id in ids {
            if let Some(row) = table.rows.get_mut(id) {
                row.distributed = true;
            }
        }

        Ok(())
    }

    async fn transition(
        &self,
        id: &DepositIdentifier,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> DbResult<bool> {
        check_transition(from, to)?;

        let mut table = self.table.write().await;
        match table.rows.get_mut(id) {
            Some(row) if row.status == from => {
                row.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_processed(
        &self,
        id: &DepositIdentifier,
        signature: Option<String>,
        withdrawal_tx_hash: Option<String>,
    ) -> DbResult<bool> {
        let mut table = self.table.write().await;
        match table.rows.get_mut(id) {
            Some(row) if row.status == WithdrawalStatus::Processing => {
                row.status = WithdrawalStatus::Processed;
                if signature.is_some() {
                    row.signature = signature;
                }
                if withdrawal_tx_hash.is_some() {
                    row.withdrawal_tx_hash = withdrawal_tx_hash;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
