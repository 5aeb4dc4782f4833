//! In-memory chain backends and bridge module.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bitcoin::{address::NetworkUnchecked, Address, Network, OutPoint, Transaction, Txid};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tss_bridge_chains::{
    bridge_core::{BridgeCore, TokenPair},
    client::{ChainClient, RawDeposit, UtxoClient, ZanoClient, ZanoEmission},
    errors::{ChainError, FetchError},
    utxo::Utxo,
};
use tss_bridge_primitives::{
    amount::Amount,
    chain::{ChainId, ChainType},
    constants::BITCOIN_DUST_THRESHOLD,
    deposit::{Deposit, DepositIdentifier},
    evm::parse_address,
    signature::SignatureData,
};

type PairKey = (ChainId, String, ChainId);

/// A bridge module holding token pairs in memory and recording submitted deposits.
#[derive(Debug, Default)]
pub struct MockBridgeCore {
    pairs: Mutex<HashMap<PairKey, TokenPair>>,
    submitted: Mutex<Vec<Deposit>>,
}

impl MockBridgeCore {
    /// A bridge module without token pairs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects `source_token` on `source_chain` to `destination_chain`.
    pub fn add_pair(
        &self,
        source_chain: &str,
        source_token: &str,
        destination_chain: &str,
        pair: TokenPair,
    ) {
        self.pairs.lock().insert(
            (
                ChainId::from(source_chain),
                source_token.to_string(),
                ChainId::from(destination_chain),
            ),
            pair,
        );
    }

    /// Deposits submitted so far, in order.
    pub fn submitted(&self) -> Vec<Deposit> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl BridgeCore for MockBridgeCore {
    async fn token_pair(
        &self,
        source_chain: &ChainId,
        source_token: &str,
        destination_chain: &ChainId,
    ) -> Result<Option<TokenPair>, ChainError> {
        let key = (
            source_chain.clone(),
            source_token.to_string(),
            destination_chain.clone(),
        );
        Ok(self.pairs.lock().get(&key).cloned())
    }

    async fn submit_deposit(&self, deposit: &Deposit) -> Result<(), ChainError> {
        self.submitted.lock().push(deposit.clone());
        Ok(())
    }
}

/// Deposits of a mock chain, keyed by identifier.
#[derive(Debug, Default)]
struct Deposits(Mutex<HashMap<DepositIdentifier, Result<RawDeposit, FetchError>>>);

impl Deposits {
    fn get(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        self.0
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Err(FetchError::TxNotFound(id.tx_hash.clone())))
    }
}

/// A chain of any family whose deposits are set by the test.
///
/// Receivers are valid when they are EVM addresses, whatever the family.
#[derive(Debug)]
pub struct MockChainClient {
    chain_id: ChainId,
    chain_type: ChainType,
    deposits: Deposits,
}

impl MockChainClient {
    /// An empty chain.
    pub fn new(chain_id: &str, chain_type: ChainType) -> Self {
        Self {
            chain_id: ChainId::from(chain_id),
            chain_type,
            deposits: Deposits::default(),
        }
    }

    /// Makes a deposit readable.
    pub fn add_deposit(&self, raw: RawDeposit) {
        self.deposits.0.lock().insert(raw.identifier.clone(), Ok(raw));
    }

    /// Makes reading `id` fail with `error`.
    pub fn fail_deposit(&self, id: DepositIdentifier, error: FetchError) {
        self.deposits.0.lock().insert(id, Err(error));
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        self.chain_type
    }

    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        self.deposits.get(id)
    }

    fn address_valid(&self, address: &str) -> bool {
        parse_address(address).is_ok()
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        !hash.is_empty()
    }
}

/// A bitcoin-family chain with an in-memory wallet.
#[derive(Debug)]
pub struct MockUtxoClient {
    chain_id: ChainId,
    network: Network,
    fee_rate: u64,
    deposits: Deposits,
    utxos: Mutex<Vec<Utxo>>,
    locked: Mutex<HashSet<OutPoint>>,
    sent: Mutex<Vec<Transaction>>,
}

impl MockUtxoClient {
    /// A regtest wallet paying `fee_rate` sat/vB and owning `utxos`.
    pub fn new(chain_id: &str, fee_rate: u64, utxos: Vec<Utxo>) -> Self {
        Self {
            chain_id: ChainId::from(chain_id),
            network: Network::Regtest,
            fee_rate,
            deposits: Deposits::default(),
            utxos: Mutex::new(utxos),
            locked: Mutex::default(),
            sent: Mutex::default(),
        }
    }

    /// Makes a deposit readable.
    pub fn add_deposit(&self, raw: RawDeposit) {
        self.deposits.0.lock().insert(raw.identifier.clone(), Ok(raw));
    }

    /// Outputs locked so far.
    pub fn locked(&self) -> HashSet<OutPoint> {
        self.locked.lock().clone()
    }

    /// Transactions broadcast so far, in order.
    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl ChainClient for MockUtxoClient {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Bitcoin
    }

    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        self.deposits.get(id)
    }

    fn address_valid(&self, address: &str) -> bool {
        address
            .parse::<Address<NetworkUnchecked>>()
            .ok()
            .and_then(|a| a.require_network(self.network).ok())
            .is_some()
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        hash.parse::<Txid>().is_ok()
    }

    fn withdrawal_amount_valid(&self, amount: &Amount) -> bool {
        *amount >= Amount::from(BITCOIN_DUST_THRESHOLD)
    }
}

#[async_trait]
impl UtxoClient for MockUtxoClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn list_unspent(&self) -> Result<Vec<Utxo>, ChainError> {
        let locked = self.locked.lock().clone();
        Ok(self
            .utxos
            .lock()
            .iter()
            .filter(|u| !locked.contains(&u.outpoint))
            .cloned()
            .collect())
    }

    async fn fee_rate(&self) -> Result<u64, ChainError> {
        Ok(self.fee_rate)
    }

    async fn lock_outputs(&self, outpoints: &[OutPoint]) -> Result<(), ChainError> {
        self.locked.lock().extend(outpoints.iter().copied());
        Ok(())
    }

    async fn send_signed_transaction(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        self.sent.lock().push(tx.clone());
        Ok(tx.compute_txid())
    }
}

/// A Zano wallet whose emissions are deterministic in their parameters.
#[derive(Debug)]
pub struct MockZanoClient {
    chain_id: ChainId,
    deposits: Deposits,
    sent: Mutex<Vec<(ZanoEmission, SignatureData)>>,
}

impl MockZanoClient {
    /// A wallet without deposits.
    pub fn new(chain_id: &str) -> Self {
        Self {
            chain_id: ChainId::from(chain_id),
            deposits: Deposits::default(),
            sent: Mutex::default(),
        }
    }

    /// Emissions sent so far with their signatures.
    pub fn sent(&self) -> Vec<(ZanoEmission, SignatureData)> {
        self.sent.lock().clone()
    }

    fn emission(asset_id: &str, receiver: &str, amount: &Amount) -> ZanoEmission {
        let mut hasher = Sha256::new();
        hasher.update(asset_id.as_bytes());
        hasher.update(receiver.as_bytes());
        hasher.update(amount.to_be_bytes());
        let tx_id = hex::encode(hasher.finalize());

        ZanoEmission {
            verified_tx_id: tx_id.clone(),
            unsigned_tx: format!("unsigned-{tx_id}"),
            finalized_tx: format!("finalized-{tx_id}"),
            tx_secret_key: "00".repeat(32),
            outputs_addresses: vec![receiver.to_string()],
        }
    }
}

#[async_trait]
impl ChainClient for MockZanoClient {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Zano
    }

    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        self.deposits.get(id)
    }

    fn address_valid(&self, address: &str) -> bool {
        parse_address(address).is_ok()
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        !hash.is_empty()
    }
}

#[async_trait]
impl ZanoClient for MockZanoClient {
    async fn emit_asset(
        &self,
        asset_id: &str,
        receiver: &str,
        amount: &Amount,
    ) -> Result<ZanoEmission, ChainError> {
        Ok(Self::emission(asset_id, receiver, amount))
    }

    async fn verify_emission(
        &self,
        emission: &ZanoEmission,
        asset_id: &str,
        receiver: &str,
        amount: &Amount,
    ) -> Result<bool, ChainError> {
        Ok(*emission == Self::emission(asset_id, receiver, amount))
    }

    async fn send_signed_emission(
        &self,
        emission: &ZanoEmission,
        signature: &SignatureData,
    ) -> Result<String, ChainError> {
        self.sent.lock().push((emission.clone(), *signature));
        Ok(emission.verified_tx_id.clone())
    }
}
