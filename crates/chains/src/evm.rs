//! EVM chains over Ethereum JSON-RPC.
//!
//! Deposits are `Deposit` events of the bridge contract. A deposit's nonce is the index of the
//! event among the bridge events of its transaction.

use async_trait::async_trait;
use jsonrpsee::{
    core::client::ClientT,
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use tss_bridge_primitives::{
    amount::Amount,
    chain::{ChainId, ChainType},
    deposit::DepositIdentifier,
    evm::{keccak256, parse_address, to_checksum_address, EVM_ADDRESS_LEN},
};

use crate::{
    client::{ChainClient, RawDeposit},
    errors::{ChainError, FetchError, InvalidDeposit},
};

/// Signature of the bridge deposit event.
pub const DEPOSIT_EVENT: &str = "Deposit(address,address,uint256,bytes)";

const WORD: usize = 32;
const TX_HASH_HEX_LEN: usize = 64;

/// Connection settings of an [`EvmClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmConfig {
    /// JSON-RPC endpoint.
    pub url: String,

    /// Address of the bridge contract.
    pub bridge_contract: String,

    /// Confirmations a deposit needs.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

fn default_confirmations() -> u64 {
    12
}

/// An EVM chain.
#[derive(Debug, Clone)]
pub struct EvmClient {
    chain_id: ChainId,
    client: HttpClient,
    bridge_contract: [u8; EVM_ADDRESS_LEN],
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Log {
    address: String,
    topics: Vec<String>,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<String>,
    block_number: Option<String>,
    logs: Vec<Log>,
}

/// A decoded bridge deposit event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DepositEvent {
    sender: [u8; EVM_ADDRESS_LEN],
    token: [u8; EVM_ADDRESS_LEN],
    amount: Amount,
    memo: Vec<u8>,
}

fn decode_hex(value: &str) -> Result<Vec<u8>, InvalidDeposit> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| InvalidDeposit::Script(format!("bad hex: {e}")))
}

fn parse_quantity(value: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|_| ChainError::InvalidResponse(format!("quantity {value}")))
}

fn topic_address(topic: &str) -> Result<[u8; EVM_ADDRESS_LEN], InvalidDeposit> {
    let word = decode_hex(topic)?;
    if word.len() != WORD {
        return Err(InvalidDeposit::Script("topic is not a word".into()));
    }

    let mut address = [0u8; EVM_ADDRESS_LEN];
    address.copy_from_slice(&word[WORD - EVM_ADDRESS_LEN..]);
    Ok(address)
}

fn word_to_usize(word: &[u8]) -> Option<usize> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return None;
    }

    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(tail)).ok()
}

impl DepositEvent {
    /// Decodes `Deposit(address indexed sender, address indexed token, uint256 amount, bytes memo)`.
    fn decode(log: &Log) -> Result<Self, InvalidDeposit> {
        let truncated = || InvalidDeposit::Script("truncated deposit event".into());

        let [_, sender, token] = log.topics.as_slice() else {
            return Err(InvalidDeposit::Script("unexpected topics".into()));
        };
        let data = decode_hex(&log.data)?;
        if data.len() < 3 * WORD {
            return Err(truncated());
        }

        let mut amount = [0u8; WORD];
        amount.copy_from_slice(&data[..WORD]);
        let offset = word_to_usize(&data[WORD..2 * WORD]).ok_or_else(truncated)?;
        let len_end = offset.checked_add(WORD).ok_or_else(truncated)?;
        let len = word_to_usize(data.get(offset..len_end).ok_or_else(truncated)?)
            .ok_or_else(truncated)?;
        let memo = data
            .get(len_end..len_end.checked_add(len).ok_or_else(truncated)?)
            .ok_or_else(truncated)?;

        Ok(Self {
            sender: topic_address(sender)?,
            token: topic_address(token)?,
            amount: Amount::new(ethnum::U256::from_be_bytes(amount)),
            memo: memo.to_vec(),
        })
    }
}

impl EvmClient {
    /// Creates a client. Nothing is sent until the first call.
    pub fn new(chain_id: ChainId, config: &EvmConfig) -> Result<Self, ChainError> {
        let bridge_contract = parse_address(&config.bridge_contract)
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        Ok(Self {
            chain_id,
            client: HttpClientBuilder::default().build(&config.url)?,
            bridge_contract,
            confirmations: config.confirmations,
        })
    }

    fn bridge_logs<'a>(&self, receipt: &'a Receipt) -> impl Iterator<Item = &'a Log> {
        let topic = format!("0x{}", hex::encode(keccak256(DEPOSIT_EVENT.as_bytes())));
        let contract = self.bridge_contract;

        receipt.logs.iter().filter(move |log| {
            parse_address(&log.address).is_ok_and(|a| a == contract)
                && log
                    .topics
                    .first()
                    .is_some_and(|t| t.eq_ignore_ascii_case(&topic))
        })
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    async fn deposit_data(&self, id: &DepositIdentifier) -> Result<RawDeposit, FetchError> {
        let receipt: Option<Receipt> = self
            .client
            .request("eth_getTransactionReceipt", rpc_params![&id.tx_hash])
            .await
            .map_err(ChainError::from)?;

        let Some(receipt) = receipt else {
            let tx: Option<serde_json::Value> = self
                .client
                .request("eth_getTransactionByHash", rpc_params![&id.tx_hash])
                .await
                .map_err(ChainError::from)?;
            return Err(match tx {
                Some(_) => FetchError::TxPending,
                None => FetchError::TxNotFound(id.tx_hash.clone()),
            });
        };

        let Some(block) = receipt.block_number.as_deref() else {
            return Err(FetchError::TxPending);
        };
        if receipt.status.as_deref() != Some("0x1") {
            return Err(InvalidDeposit::Script("transaction reverted".into()).into());
        }

        let block = parse_quantity(block)?;
        let head: String = self
            .client
            .request("eth_blockNumber", rpc_params![])
            .await
            .map_err(ChainError::from)?;
        let confirmations = (parse_quantity(&head)? + 1).saturating_sub(block);
        if confirmations < self.confirmations {
            return Err(FetchError::TxNotConfirmed {
                confirmations,
                required: self.confirmations,
            });
        }

        let nonce = usize::try_from(id.tx_nonce)
            .map_err(|_| InvalidDeposit::Script(format!("no deposit event {}", id.tx_nonce)))?;
        let log = self
            .bridge_logs(&receipt)
            .nth(nonce)
            .ok_or_else(|| InvalidDeposit::Script(format!("no deposit event {}", id.tx_nonce)))?;
        let event = DepositEvent::decode(log)?;
        debug!(deposit = %id, block, ?event, "read deposit event");

        Ok(RawDeposit {
            identifier: id.clone(),
            source_address: to_checksum_address(&event.sender),
            token: to_checksum_address(&event.token),
            amount: event.amount,
            block,
            memo: event.memo,
        })
    }

    fn address_valid(&self, address: &str) -> bool {
        parse_address(address).is_ok()
    }

    fn transaction_hash_valid(&self, hash: &str) -> bool {
        hash.strip_prefix("0x")
            .is_some_and(|h| h.len() == TX_HASH_HEX_LEN && hex::decode(h).is_ok())
    }
}
