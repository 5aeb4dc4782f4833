//! Proposal forming and checking, per chain family.
//!
//! Leaders pick the oldest pending deposit to the session's chain. Followers accept a proposal
//! only if the deposit it withdraws is pending in their own store with identical terms; a deposit
//! they have not heard of yet is fetched from its source chain first.

mod claim;
mod utxo;
mod zano;

use tracing::{debug, warn};
use tss_bridge_chains::fetcher::DepositFetcher;
use tss_bridge_db::deposits::DepositStore;
use tss_bridge_primitives::deposit::{Deposit, WithdrawalStatus};

pub use self::{claim::ClaimMechanism, utxo::UtxoMechanism, zano::ZanoMechanism};

/// How many pending deposits a leader looks at when forming a proposal.
pub const PENDING_BATCH: u32 = 16;

/// Whether `proposed` matches a pending deposit of the local store.
///
/// Unknown deposits are fetched and stored. Deposits the fetcher finds invalid are stored as
/// invalid so that no later round selects them.
pub(crate) async fn check_deposit(
    db: &dyn DepositStore,
    fetcher: &DepositFetcher,
    proposed: &Deposit,
) -> bool {
    let id = &proposed.identifier;
    let local = match db.get_deposit(id).await {
        Ok(Some(local)) => local,
        Ok(None) => match fetcher.fetch(id).await {
            Ok(mut fetched) => {
                fetched.distributed = true;
                if let Err(e) = db.insert_deposit(&fetched).await {
                    warn!(deposit = %id, "failed to store fetched deposit: {e}");
                }
                fetched
            }
            Err(e) if e.is_invalid() => {
                warn!(deposit = %id, "proposed deposit is invalid: {e}");
                if let Err(e) = db.insert_deposit(&Deposit::invalid(id.clone())).await {
                    warn!(deposit = %id, "failed to store invalid deposit: {e}");
                }
                return false;
            }
            Err(e) => {
                debug!(deposit = %id, "cannot verify proposed deposit yet: {e}");
                return false;
            }
        },
        Err(e) => {
            warn!(deposit = %id, "failed to read deposit: {e}");
            return false;
        }
    };

    if local.status != WithdrawalStatus::Pending {
        debug!(deposit = %id, status = %local.status, "proposed deposit is not pending");
        return false;
    }
    if !local.same_withdrawal(proposed) {
        warn!(deposit = %id, "proposed deposit differs from the local one");
        return false;
    }

    true
}

/// Marks a pending deposit the leader cannot withdraw as invalid.
pub(crate) async fn reject_pending(db: &dyn DepositStore, deposit: &Deposit, reason: &str) {
    warn!(deposit = %deposit.identifier, %reason, "pending deposit cannot be withdrawn");
    if let Err(e) = db
        .transition(
            &deposit.identifier,
            WithdrawalStatus::Pending,
            WithdrawalStatus::Invalid,
        )
        .await
    {
        warn!(deposit = %deposit.identifier, "failed to mark deposit invalid: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tss_bridge_chains::{bridge_core::TokenPair, client::RawDeposit, registry::ChainRegistry};
    use tss_bridge_db::inmemory::InMemoryDepositStore;
    use tss_bridge_primitives::{amount::Amount, chain::ChainType};
    use tss_bridge_test_utils::prelude::*;

    use super::*;

    const RECEIVER: &str = "0xbeefD475A76Ec312502ba7B566a9B4CEA91ab030";

    fn fetcher(source: MockChainClient) -> DepositFetcher {
        let core = MockBridgeCore::new();
        core.add_pair(
            "56",
            "0x00000000000000000000000000000000000000cc",
            "1",
            TokenPair {
                destination_token: "0x00000000000000000000000000000000000000aa".into(),
                source_decimals: 18,
                destination_decimals: 18,
                is_wrapped: false,
                commission_rate: "0".into(),
            },
        );

        let mut chains = ChainRegistry::new();
        chains.register(Arc::new(source));
        chains.register(Arc::new(MockChainClient::new("1", ChainType::Evm)));
        DepositFetcher::new(Arc::new(chains), Arc::new(core))
    }

    #[tokio::test]
    async fn unknown_deposits_are_fetched_before_voting() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.add_deposit(RawDeposit {
            identifier: id.clone(),
            source_address: RECEIVER.into(),
            token: "0x00000000000000000000000000000000000000cc".into(),
            amount: Amount::from(5_000),
            block: 10,
            memo: format!("{RECEIVER}#1").into_bytes(),
        });
        let fetcher = fetcher(source);
        let db = InMemoryDepositStore::new();

        let proposed = fetcher.fetch(&id).await.expect("must fetch");
        assert!(check_deposit(&db, &fetcher, &proposed).await);
        let stored = db.get_deposit(&id).await.expect("must read");
        assert!(stored.is_some_and(|d| d.distributed));

        let mut tampered = proposed.clone();
        tampered.withdrawal_amount = Amount::from(5_001);
        assert!(!check_deposit(&db, &fetcher, &tampered).await);
    }

    #[tokio::test]
    async fn invalid_deposits_are_recorded() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.add_deposit(RawDeposit {
            identifier: id.clone(),
            source_address: RECEIVER.into(),
            token: "0x00000000000000000000000000000000000000cc".into(),
            amount: Amount::from(5_000),
            block: 10,
            memo: b"not a memo".to_vec(),
        });
        let fetcher = fetcher(source);
        let db = InMemoryDepositStore::new();

        let mut proposed = generate_deposit("56", "1");
        proposed.identifier = id.clone();
        assert!(!check_deposit(&db, &fetcher, &proposed).await);

        let stored = db.get_deposit(&id).await.expect("must read");
        assert_eq!(stored.map(|d| d.status), Some(WithdrawalStatus::Invalid));
    }

    #[tokio::test]
    async fn pending_errors_leave_no_trace() {
        let id = generate_deposit_identifier("56");
        let source = MockChainClient::new("56", ChainType::Evm);
        source.fail_deposit(id.clone(), tss_bridge_chains::errors::FetchError::TxPending);
        let fetcher = fetcher(source);
        let db = InMemoryDepositStore::new();

        let mut proposed = generate_deposit("56", "1");
        proposed.identifier = id.clone();
        assert!(!check_deposit(&db, &fetcher, &proposed).await);
        assert!(db.get_deposit(&id).await.is_ok_and(|d| d.is_none()));
    }
}
