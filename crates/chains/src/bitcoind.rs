//! Bitcoin Core over JSON-RPC.
//!
//! The node's wallet must watch the bridge address so that `listunspent` reports its outputs,
//! and `txindex` must be enabled for deposits outside the wallet to be readable.

use std::str::FromStr;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bitcoin::{
    address::NetworkUnchecked, consensus, script::Instruction, Address, Network, OutPoint,
    ScriptBuf, Transaction, Txid,
};
use jsonrpsee::{
    core::{client::ClientT, ClientError},
    http_client::{HeaderMap, HeaderValue, HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use tss_bridge_primitives::{
    amount::Amount,
    chain::{ChainId, ChainType},
    constants::BITCOIN_DUST_THRESHOLD,
    deposit::DepositIdentifier,
};

use crate::{
    client::{ChainClient, RawDeposit, UtxoClient},
    errors::{ChainError, FetchError, InvalidDeposit},
    utxo::Utxo,
};

/// Token name of native bitcoin in token pairs.
pub const NATIVE_TOKEN: &str = "BTC";

/// Error code of Bitcoin Core for unknown transactions.
const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;

/// Confirmation target of fee estimates, in blocks.
const FEE_ESTIMATE_TARGET: u32 = 6;

/// Fee rate used when the node has no estimate, in sat/vB.
const FALLBACK_FEE_RATE: u64 = 2;

/// Connection settings of a [`BitcoindClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindConfig {
    /// RPC endpoint, including the wallet path if the node has several wallets.
    pub url: String,

    /// RPC user.
    pub user: String,

    /// RPC password.
    pub password: String,

    /// The network of the node.
    pub network: Network,

    /// The bridge address deposits must pay to.
    pub bridge_address: Address<NetworkUnchecked>,

    /// Confirmations a deposit needs.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

fn default_confirmations() -> u64 {
    6
}

/// A bitcoin-family chain served by Bitcoin Core.
#[derive(Debug, Clone)]
pub struct BitcoindClient {
    chain_id: ChainId,
    client: HttpClient,
    network: Network,
    bridge_address: Address,
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    hex: String,
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerboseOutput {
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    value: bitcoin::Amount,
    n: u32,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct Prevout {
    #[serde(rename = "scriptPubKey")]
    script_pubkey: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct VerboseInput {
    prevout: Option<Prevout>,
}

#[derive(Debug, Deserialize)]
struct VerboseTransaction {
    vin: Vec<VerboseInput>,
    vout: Vec<VerboseOutput>,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct ListUnspentEntry {
    txid: Txid,
    vout: u32,
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    amount: bitcoin::Amount,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
}

#[derive(Debug, Deserialize)]
struct FeeEstimate {
    feerate: Option<f64>,
}

impl BitcoindClient {
    /// Creates a client. Nothing is sent until the first call.
    pub fn new(chain_id: ChainId, config: &BitcoindConfig) -> Result<Self, ChainError> {
        let credentials = STANDARD.encode(format!("{}:{}", config.user, config.password));
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|e| ChainError::Rpc(e.to_string()))?,
        );

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .build(&config.url)?;
        let bridge_address = config
            .bridge_address
            .clone()
            .require_network(config.network)
            .map_err(|e| ChainError::InvalidResponse(format!("bridge address: {e}")))?;

        Ok(Self {
            chain_id,
            client,
            network: config.network,
            bridge_address,
            confirmations: config.confirmations,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: jsonrpsee::core::params::ArrayParams,
    ) -> Result<T, ClientError> {
        self.client.request(method, params).await
    }

    fn parse_script(hex_script: &str) -> Result<ScriptBuf, ChainError> {
        ScriptBuf::from_hex(hex_script)
            .map_err(|e| ChainError::InvalidResponse(format!("script: {e}")))
    }
}

/// Extracts the memo carried by the first `OP_RETURN` output.
fn op_return_memo(outputs: &[VerboseOutput]) -> Option<Vec<u8>> {
    outputs.iter().find_map(|o| {
        let script = ScriptBuf::from_hex(&o.script_pubkey.hex).ok()?;
        if !script.is_op_return() {
            return None;
        }

        let mut memo = Vec::new();
        for instruction in script.instructions().skip(1) {
            if let Ok(Instruction::PushBytes(bytes)) = instruction {
                memo.extend_from_slice(bytes.as_bytes());
            }
        }
        Some(memo)
    })
}

#[async_trait]
impl ChainClient for BitcoindClient {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Bitcoin
    }

    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        let tx: VerboseTransaction = match self
            .call("getrawtransaction", rpc_params![&id.tx_hash, 2])
            .await
        {
            Ok(tx) => tx,
            Err(ClientError::Call(e)) if e.code() == RPC_INVALID_ADDRESS_OR_KEY => {
                return Err(FetchError::TxNotFound(id.tx_hash.clone()));
            }
            Err(e) => return Err(ChainError::from(e).into()),
        };

        if tx.confirmations == 0 {
            return Err(FetchError::TxPending);
        }
        if tx.confirmations < self.confirmations {
            return Err(FetchError::TxNotConfirmed {
                confirmations: tx.confirmations,
                required: self.confirmations,
            });
        }

        let output = tx
            .vout
            .iter()
            .find(|o| u64::from(o.n) == id.tx_nonce)
            .ok_or_else(|| InvalidDeposit::Script(format!("no output {}", id.tx_nonce)))?;
        let script = Self::parse_script(&output.script_pubkey.hex)?;
        if script != self.bridge_address.script_pubkey() {
            return Err(InvalidDeposit::Script("output does not pay the bridge".into()).into());
        }

        let memo = op_return_memo(&tx.vout)
            .ok_or_else(|| InvalidDeposit::Script("no OP_RETURN memo".into()))?;
        let source_address = tx
            .vin
            .first()
            .and_then(|i| i.prevout.as_ref())
            .and_then(|p| p.script_pubkey.address.clone())
            .unwrap_or_default();

        let height: u64 = self
            .call("getblockcount", rpc_params![])
            .await
            .map_err(ChainError::from)?;

        Ok(RawDeposit {
            identifier: id.clone(),
            source_address,
            token: NATIVE_TOKEN.to_string(),
            amount: Amount::from(output.value.to_sat()),
            block: (height + 1).saturating_sub(tx.confirmations),
            memo,
        })
    }

    fn address_valid(&self, address: &str) -> bool {
        Address::from_str(address)
            .ok()
            .and_then(|a| a.require_network(self.network).ok())
            .is_some()
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        Txid::from_str(hash).is_ok()
    }

    fn withdrawal_amount_valid(&self, amount: &Amount) -> bool {
        *amount >= Amount::from(BITCOIN_DUST_THRESHOLD)
    }
}

#[async_trait]
impl UtxoClient for BitcoindClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn list_unspent(&self) -> Result<Vec<Utxo>, ChainError> {
        let entries: Vec<ListUnspentEntry> = self
            .call(
                "listunspent",
                rpc_params![1, 9_999_999, [self.bridge_address.to_string()]],
            )
            .await?;

        entries
            .into_iter()
            .map(|e| {
                Ok(Utxo {
                    outpoint: OutPoint::new(e.txid, e.vout),
                    amount: e.amount,
                    script_pubkey: Self::parse_script(&e.script_pubkey)?,
                })
            })
            .collect()
    }

    async fn fee_rate(&self) -> Result<u64, ChainError> {
        let estimate: FeeEstimate = self
            .call("estimatesmartfee", rpc_params![FEE_ESTIMATE_TARGET])
            .await?;

        // BTC/kvB to sat/vB
        let rate = estimate
            .feerate
            .map(|btc_per_kvb| (btc_per_kvb * 100_000.0).round() as u64)
            .filter(|rate| *rate > 0)
            .unwrap_or(FALLBACK_FEE_RATE);
        debug!(chain = %self.chain_id, rate, "fee rate estimated");

        Ok(rate)
    }

    async fn lock_outputs(&self, outpoints: &[OutPoint]) -> Result<(), ChainError> {
        let outputs: Vec<_> = outpoints
            .iter()
            .map(|o| json!({ "txid": o.txid.to_string(), "vout": o.vout }))
            .collect();

        let locked: bool = self
            .call("lockunspent", rpc_params![false, outputs])
            .await?;
        if !locked {
            return Err(ChainError::Rpc("lockunspent refused".into()));
        }

        Ok(())
    }

    async fn send_signed_transaction(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        let raw = consensus::encode::serialize_hex(tx);
        let txid: Txid = self.call("sendrawtransaction", rpc_params![raw]).await?;
        info!(chain = %self.chain_id, %txid, "transaction broadcast");

        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memo_is_read_from_op_return() {
        let memo = b"0xbeefD475A76Ec312502ba7B566a9B4CEA91ab030#1";
        let script = ScriptBuf::new_op_return(
            <&bitcoin::script::PushBytes>::try_from(&memo[..]).expect("short enough"),
        );
        let outputs = vec![
            VerboseOutput {
                value: bitcoin::Amount::from_sat(10_000),
                n: 0,
                script_pubkey: ScriptPubKey {
                    hex: "0014".to_string() + &"00".repeat(20),
                    address: None,
                },
            },
            VerboseOutput {
                value: bitcoin::Amount::ZERO,
                n: 1,
                script_pubkey: ScriptPubKey {
                    hex: script.to_hex_string(),
                    address: None,
                },
            },
        ];

        assert_eq!(op_return_memo(&outputs), Some(memo.to_vec()));
        assert_eq!(op_return_memo(&outputs[..1]), None);
    }

    #[test]
    fn verbose_transactions_parse() {
        let json = r#"{
            "txid": "aa",
            "vin": [{"prevout": {"scriptPubKey": {"hex": "00", "address": "bc1qsender"}}}],
            "vout": [{"value": 0.0005, "n": 0, "scriptPubKey": {"hex": "0014"}}],
            "confirmations": 3
        }"#;
        let tx: VerboseTransaction = serde_json::from_str(json).expect("must parse");

        assert_eq!(tx.confirmations, 3);
        assert_eq!(tx.vout[0].value.to_sat(), 50_000);
        assert_eq!(
            tx.vin[0]
                .prevout
                .as_ref()
                .and_then(|p| p.script_pubkey.address.as_deref()),
            Some("bc1qsender")
        );
    }
}
