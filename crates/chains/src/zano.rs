//! Zano over the wallet JSON-RPC.
//!
//! Wrapped assets on Zano are emitted by the bridge wallet with an external ECDSA owner key: the
//! wallet prepares the emission, the group signs its transaction id and the wallet finalizes it.

use async_trait::async_trait;
use jsonrpsee::{
    core::{client::ClientT, params::ObjectParams},
    http_client::{HttpClient, HttpClientBuilder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use tss_bridge_primitives::{
    amount::Amount,
    chain::{ChainId, ChainType},
    deposit::DepositIdentifier,
    memo::infer_address_family,
    signature::SignatureData,
};

use crate::{
    client::{ChainClient, RawDeposit, ZanoClient, ZanoEmission},
    errors::{ChainError, FetchError, InvalidDeposit},
};

const TX_ID_HEX_LEN: usize = 64;

/// Connection settings of a [`ZanoWallet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZanoConfig {
    /// Wallet JSON-RPC endpoint.
    pub url: String,

    /// Confirmations a deposit needs.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

fn default_confirmations() -> u64 {
    10
}

/// The bridge wallet on a Zano chain.
#[derive(Debug, Clone)]
pub struct ZanoWallet {
    chain_id: ChainId,
    client: HttpClient,
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct Subtransfer {
    asset_id: String,
    amount: u64,
    is_income: bool,
}

#[derive(Debug, Deserialize)]
struct Transfer {
    height: u64,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    remote_addresses: Vec<String>,
    #[serde(default)]
    subtransfers: Vec<Subtransfer>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default, rename = "in")]
    incoming: Vec<Transfer>,
    #[serde(default)]
    pool: Vec<Transfer>,
}

#[derive(Debug, Deserialize)]
struct Height {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct ExternalSigningData {
    unsigned_tx: String,
    finalized_tx: String,
    tx_secret_key: String,
    outputs_addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmitResult {
    tx_id: String,
    data_for_external_signing: ExternalSigningData,
}

#[derive(Debug, Deserialize)]
struct DecodedOutput {
    address: String,
    amount: u64,
    asset_id: String,
}

#[derive(Debug, Deserialize)]
struct DecryptResult {
    verified_tx_id: String,
    decoded_outputs: Vec<DecodedOutput>,
}

#[derive(Debug, Deserialize)]
struct StatusResult {
    status: String,
}

fn params(value: serde_json::Value) -> Result<ObjectParams, ChainError> {
    let mut params = ObjectParams::new();
    if let serde_json::Value::Object(map) = value {
        for (key, value) in map {
            params
                .insert(&key, value)
                .map_err(|e| ChainError::Rpc(e.to_string()))?;
        }
    }
    Ok(params)
}

impl ZanoWallet {
    /// Creates a client. Nothing is sent until the first call.
    pub fn new(chain_id: ChainId, config: &ZanoConfig) -> Result<Self, ChainError> {
        Ok(Self {
            chain_id,
            client: HttpClientBuilder::default().build(&config.url)?,
            confirmations: config.confirmations,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<T, ChainError> {
        Ok(self.client.request(method, params(args)?).await?)
    }
}

/// Whether a decrypted emission pays exactly `amount` of `asset_id` to `receiver` and nothing else
/// of that asset to anyone.
fn emission_matches(outputs: &[DecodedOutput], asset_id: &str, receiver: &str, amount: u64) -> bool {
    let mut emitted = outputs.iter().filter(|o| o.asset_id == asset_id);
    match (emitted.next(), emitted.next()) {
        (Some(o), None) => o.address == receiver && o.amount == amount,
        _ => false,
    }
}

#[async_trait]
impl ChainClient for ZanoWallet {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Zano
    }

    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        let found: SearchResult = self
            .call(
                "search_for_transactions",
                json!({
                    "tx_id": id.tx_hash,
                    "in": true,
                    "out": false,
                    "pool": true,
                    "filter_by_height": false,
                }),
            )
            .await?;

        if !found.pool.is_empty() && found.incoming.is_empty() {
            return Err(FetchError::TxPending);
        }
        let transfer = found
            .incoming
            .first()
            .ok_or_else(|| FetchError::TxNotFound(id.tx_hash.clone()))?;

        let head: Height = self.call("getheight", json!({})).await?;
        let confirmations = head.height.saturating_sub(transfer.height);
        if confirmations < self.confirmations {
            return Err(FetchError::TxNotConfirmed {
                confirmations,
                required: self.confirmations,
            });
        }

        let nonce = usize::try_from(id.tx_nonce)
            .map_err(|_| InvalidDeposit::Script(format!("no transfer {}", id.tx_nonce)))?;
        let sub = transfer
            .subtransfers
            .iter()
            .filter(|s| s.is_income)
            .nth(nonce)
            .ok_or_else(|| InvalidDeposit::Script(format!("no transfer {}", id.tx_nonce)))?;

        Ok(RawDeposit {
            identifier: id.clone(),
            source_address: transfer.remote_addresses.first().cloned().unwrap_or_default(),
            token: sub.asset_id.clone(),
            amount: Amount::from(sub.amount),
            block: transfer.height,
            memo: transfer.comment.clone().into_bytes(),
        })
    }

    fn address_valid(&self, address: &str) -> bool {
        infer_address_family(address).is_ok_and(|family| family == ChainType::Zano)
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        hash.len() == TX_ID_HEX_LEN && hex::decode(hash).is_ok()
    }
}

#[async_trait]
impl ZanoClient for ZanoWallet {
    async fn emit_asset(
        &self,
        asset_id: &str,
        receiver: &str,
        amount: &Amount,
    ) -> Result<ZanoEmission, ChainError> {
        let amount = amount
            .to_u64()
            .ok_or_else(|| ChainError::InvalidResponse(format!("{amount} overflows")))?;
        let result: EmitResult = self
            .call(
                "emit_asset",
                json!({
                    "asset_id": asset_id,
                    "destinations": [{
                        "address": receiver,
                        "amount": amount,
                        "asset_id": asset_id,
                    }],
                    "do_not_split_destinations": false,
                }),
            )
            .await?;
        debug!(chain = %self.chain_id, tx_id = %result.tx_id, "emission prepared");

        let data = result.data_for_external_signing;
        Ok(ZanoEmission {
            verified_tx_id: result.tx_id,
            unsigned_tx: data.unsigned_tx,
            finalized_tx: data.finalized_tx,
            tx_secret_key: data.tx_secret_key,
            outputs_addresses: data.outputs_addresses,
        })
    }

    async fn verify_emission(
        &self,
        emission: &ZanoEmission,
        asset_id: &str,
        receiver: &str,
        amount: &Amount,
    ) -> Result<bool, ChainError> {
        let Some(amount) = amount.to_u64() else {
            return Ok(false);
        };
        let decrypted: DecryptResult = self
            .call(
                "decrypt_tx_details",
                json!({
                    "tx_id": emission.verified_tx_id,
                    "tx_blob": emission.unsigned_tx,
                    "tx_secret_key": emission.tx_secret_key,
                    "outputs_addresses": emission.outputs_addresses,
                }),
            )
            .await?;

        if decrypted.verified_tx_id != emission.verified_tx_id {
            warn!(
                chain = %self.chain_id,
                claimed = %emission.verified_tx_id,
                actual = %decrypted.verified_tx_id,
                "emission tx id mismatch"
            );
            return Ok(false);
        }

        Ok(emission_matches(
            &decrypted.decoded_outputs,
            asset_id,
            receiver,
            amount,
        ))
    }

    async fn send_signed_emission(
        &self,
        emission: &ZanoEmission,
        signature: &SignatureData,
    ) -> Result<String, ChainError> {
        let result: StatusResult = self
            .call(
                "send_ext_signed_asset_tx",
                json!({
                    "eth_sig": hex::encode(signature.compact()),
                    "expected_tx_id": emission.verified_tx_id,
                    "finalized_tx": emission.finalized_tx,
                    "unsigned_tx": emission.unsigned_tx,
                    "unlock_transfers_on_fail": false,
                }),
            )
            .await?;
        if result.status != "OK" {
            return Err(ChainError::Rpc(format!("emission refused: {}", result.status)));
        }
        info!(chain = %self.chain_id, tx_id = %emission.verified_tx_id, "emission sent");

        Ok(emission.verified_tx_id.clone())
    }
}
