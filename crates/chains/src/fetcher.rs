//! Resolves deposit identifiers into normalized deposits.

use std::sync::Arc;

use tracing::{debug, warn};
use tss_bridge_primitives::{
    amount::{rescale, CommissionRate},
    deposit::{Deposit, DepositIdentifier, WithdrawalStatus},
    memo,
};

use crate::{
    bridge_core::BridgeCore,
    errors::{ChainError, FetchError, InvalidDeposit},
    registry::ChainRegistry,
};

/// Reads deposits from their source chain and applies the bridge rules to them.
#[derive(Debug, Clone)]
pub struct DepositFetcher {
    chains: Arc<ChainRegistry>,
    core: Arc<dyn BridgeCore>,
}

impl DepositFetcher {
    /// Creates a fetcher over the given chains and bridge module.
    pub fn new(chains: Arc<ChainRegistry>, core: Arc<dyn BridgeCore>) -> Self {
        Self { chains, core }
    }

    /// The chains the fetcher reads from.
    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// Fetches the deposit `id` as a pending, undistributed record.
    ///
    /// The withdrawal amount is the deposit rescaled to the destination token's decimals, less
    /// the truncated commission.
    pub async fn fetch(&self, id: &DepositIdentifier) -> Result<Deposit, FetchError> {
        let source = self
            .chains
            .get(&id.chain_id)
            .ok_or_else(|| FetchError::UnknownChain(id.chain_id.clone()))?;
        if !source.transaction_hash_valid(&id.tx_hash) {
            return Err(FetchError::TxNotFound(id.tx_hash.clone()));
        }

        let raw = source.deposit_data(id).await?;
        let memo = memo::decode(&raw.memo).map_err(InvalidDeposit::from)?;
        debug!(deposit = %id, ?memo, "decoded destination memo");

        let destination = self
            .chains
            .get(&memo.chain_id)
            .filter(|_| memo.chain_id != id.chain_id)
            .ok_or_else(|| InvalidDeposit::Destination(memo.chain_id.clone()))?;
        if !destination.address_valid(&memo.address) {
            return Err(InvalidDeposit::Receiver(memo.address).into());
        }

        let pair = self
            .core
            .token_pair(&id.chain_id, &raw.token, &memo.chain_id)
            .await?
            .ok_or_else(|| InvalidDeposit::TokenPair {
                token: raw.token.clone(),
                source_chain: id.chain_id.clone(),
                destination_chain: memo.chain_id.clone(),
            })?;

        let rescaled = rescale(raw.amount, pair.source_decimals, pair.destination_decimals)
            .ok_or_else(|| InvalidDeposit::Amount(format!("{} does not rescale", raw.amount)))?;
        let rate: CommissionRate = pair.commission_rate.parse().map_err(|_| {
            ChainError::InvalidResponse(format!("commission rate {}", pair.commission_rate))
        })?;
        let (commission, withdrawal_amount) = rate
            .apply(rescaled)
            .ok_or_else(|| InvalidDeposit::Amount(format!("commission on {rescaled}")))?;

        if !destination.withdrawal_amount_valid(&withdrawal_amount) {
            warn!(deposit = %id, %withdrawal_amount, "withdrawal amount is below the minimum");
            return Err(InvalidDeposit::Amount(withdrawal_amount.to_string()).into());
        }

        debug!(deposit = %id, %rescaled, %commission, %withdrawal_amount, "deposit fetched");
        Ok(Deposit {
            identifier: id.clone(),
            source_address: raw.source_address,
            deposit_amount: raw.amount,
            deposit_token: raw.token,
            deposit_block: raw.block,
            destination_address: memo.address,
            destination_chain_id: memo.chain_id,
            withdrawal_amount,
            withdrawal_token: pair.destination_token,
            is_wrapped_token: pair.is_wrapped,
            referral_id: memo.referral_id,
            status: WithdrawalStatus::Pending,
            signature: None,
            withdrawal_tx_hash: None,
            distributed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tss_bridge_primitives::{
        amount::Amount,
        chain::{ChainId, ChainType},
        constants::BITCOIN_DUST_THRESHOLD,
    };

    use super::*;
    use crate::{
        bridge_core::TokenPair,
        client::{ChainClient, RawDeposit},
    };

    const RECEIVER: &str = "0xbeefD475A76Ec312502ba7B566a9B4CEA91ab030";

    #[derive(Debug)]
    struct Chain {
        id: ChainId,
        ty: ChainType,
        deposits: HashMap<DepositIdentifier, Result<RawDeposit, FetchError>>,
    }

    #[async_trait]
    impl ChainClient for Chain {
        fn chain_id(&self) -> &ChainId {
            &self.id
        }

        fn chain_type(&self) -> ChainType {
            self.ty
        }

        async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
            self.deposits
                .get(id)
                .cloned()
                .unwrap_or_else(|| Err(FetchError::TxNotFound(id.tx_hash.clone())))
        }

        fn address_valid(&self, address: &str) -> bool {
            address.starts_with("0x")
        }

        fn transaction_hash_valid(&self, hash: &str) -> bool {
            !hash.is_empty()
        }

        fn withdrawal_amount_valid(&self, amount: &Amount) -> bool {
            match self.ty {
                ChainType::Bitcoin => *amount >= Amount::from(BITCOIN_DUST_THRESHOLD),
                _ => *amount > Amount::ZERO,
            }
        }
    }

    #[derive(Debug)]
    struct Core(Option<TokenPair>);

    #[async_trait]
    impl BridgeCore for Core {
        async fn token_pair(
            &self,
            _: &ChainId,
            _: &str,
            _: &ChainId,
        ) -> Result<Option<TokenPair>, ChainError> {
            Ok(self.0.clone())
        }

        async fn submit_deposit(&self, _: &Deposit) -> Result<(), ChainError> {
            Ok(())
        }
    }

    fn pair(source_decimals: u8, destination_decimals: u8, rate: &str) -> TokenPair {
        TokenPair {
            destination_token: "0x00000000000000000000000000000000000000aa".into(),
            source_decimals,
            destination_decimals,
            is_wrapped: true,
            commission_rate: rate.into(),
        }
    }

    fn fetcher(
        raw: Result<RawDeposit, FetchError>,
        id: &DepositIdentifier,
        pair: Option<TokenPair>,
    ) -> DepositFetcher {
        let mut chains = ChainRegistry::new();
        chains.register(Arc::new(Chain {
            id: ChainId::from("bitcoin"),
            ty: ChainType::Bitcoin,
            deposits: [(id.clone(), raw)].into_iter().collect(),
        }));
        chains.register(Arc::new(Chain {
            id: ChainId::from("1"),
            ty: ChainType::Evm,
            deposits: HashMap::new(),
        }));

        DepositFetcher::new(Arc::new(chains), Arc::new(Core(pair)))
    }

    fn raw(id: &DepositIdentifier, amount: u64, memo: &str) -> RawDeposit {
        RawDeposit {
            identifier: id.clone(),
            source_address: "bc1qsource".into(),
            token: "BTC".into(),
            amount: Amount::from(amount),
            block: 800_000,
            memo: memo.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn fetch_rescales_and_takes_commission() {
        let id = DepositIdentifier::new("aa", 1, ChainId::from("bitcoin"));
        let memo = format!("{RECEIVER}#1");
        let fetcher = fetcher(Ok(raw(&id, 100_000_000, &memo)), &id, Some(pair(8, 18, "0.001")));

        let deposit = fetcher.fetch(&id).await.expect("must fetch");
        assert_eq!(deposit.status, WithdrawalStatus::Pending);
        assert!(!deposit.distributed);
        assert_eq!(deposit.destination_address, RECEIVER);
        assert_eq!(deposit.destination_chain_id, ChainId::from("1"));
        assert_eq!(deposit.deposit_amount, Amount::from(100_000_000));
        // one coin at 18 decimals, less 0.1%
        assert_eq!(deposit.withdrawal_amount.to_string(), "999000000000000000");
        assert!(deposit.is_wrapped_token);
    }

    #[tokio::test]
    async fn retryable_errors_pass_through() {
        let id = DepositIdentifier::new("bb", 0, ChainId::from("bitcoin"));
        let fetcher = fetcher(Err(FetchError::TxPending), &id, Some(pair(8, 8, "0")));

        let err = fetcher.fetch(&id).await.expect_err("must fail");
        assert!(err.is_retryable());
        assert!(!err.is_invalid());
    }

    #[tokio::test]
    async fn rule_violations_are_invalid() {
        let id = DepositIdentifier::new("cc", 0, ChainId::from("bitcoin"));

        // destination is the source chain
        let memo = format!("{RECEIVER}#bitcoin");
        let f = fetcher(Ok(raw(&id, 1_000, &memo)), &id, Some(pair(8, 8, "0")));
        assert!(f.fetch(&id).await.expect_err("must fail").is_invalid());

        // no token pair
        let memo = format!("{RECEIVER}#1");
        let f = fetcher(Ok(raw(&id, 1_000, &memo)), &id, None);
        assert!(matches!(
            f.fetch(&id).await,
            Err(FetchError::InvalidDeposit(InvalidDeposit::TokenPair { .. }))
        ));

        // garbage memo
        let f = fetcher(Ok(raw(&id, 1_000, "garbage")), &id, Some(pair(8, 8, "0")));
        assert!(matches!(
            f.fetch(&id).await,
            Err(FetchError::InvalidDeposit(InvalidDeposit::Memo(_)))
        ));

        // commission eats everything
        let f = fetcher(Ok(raw(&id, 1_000, &memo)), &id, Some(pair(8, 8, "1")));
        assert!(matches!(
            f.fetch(&id).await,
            Err(FetchError::InvalidDeposit(InvalidDeposit::Amount(_)))
        ));

        // unknown source chain
        let other = DepositIdentifier::new("cc", 0, ChainId::from("56"));
        assert!(matches!(
            f.fetch(&other).await,
            Err(FetchError::UnknownChain(_))
        ));
    }
}
