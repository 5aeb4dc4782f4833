//! Hashing of withdrawals claimed on EVM chains.
//!
//! A withdrawal is claimed on the destination chain by presenting a bridge signature over
//! `keccak256(dstToken || amount || receiver || txHash || nonce || chainId || isWrapped)`,
//! wrapped in the `personal_sign` prefix. Integers are 32-byte big-endian words, the token is
//! left-padded to a word, the receiver is packed as 20 bytes and the flag as a single byte. The
//! source transaction hash enters as the bytes of its textual form, since source chains differ
//! in how they represent hashes.

use ethnum::U256;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::{constants::EIP191_PREFIX, deposit::Deposit};

/// Length of an EVM address.
pub const EVM_ADDRESS_LEN: usize = 20;

/// Errors that occur while hashing a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvmError {
    /// Not a `0x`-prefixed 20-byte hex address.
    #[error("invalid evm address: {0}")]
    InvalidAddress(String),

    /// The destination chain id is not a decimal integer.
    #[error("invalid evm chain id: {0}")]
    InvalidChainId(String),
}

/// Keccak-256.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Parses a `0x`-prefixed hex address. Checksums are not enforced.
pub fn parse_address(address: &str) -> Result<[u8; EVM_ADDRESS_LEN], EvmError> {
    let invalid = || EvmError::InvalidAddress(address.to_string());

    let hex_part = address.strip_prefix("0x").ok_or_else(invalid)?;
    let bytes = hex::decode(hex_part).map_err(|_| invalid())?;
    bytes.try_into().map_err(|_| invalid())
}

/// Renders an address with the mixed-case checksum of EIP-55.
pub fn to_checksum_address(address: &[u8; EVM_ADDRESS_LEN]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }

    out
}

fn word(value: U256) -> [u8; 32] {
    value.to_be_bytes()
}

fn padded_address(address: &[u8; EVM_ADDRESS_LEN]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[32 - EVM_ADDRESS_LEN..].copy_from_slice(address);
    out
}

/// The packed preimage of a withdrawal.
pub fn withdrawal_preimage(deposit: &Deposit) -> Result<Vec<u8>, EvmError> {
    let token = parse_address(&deposit.withdrawal_token)?;
    let receiver = parse_address(&deposit.destination_address)?;
    let chain_id = U256::from_str_radix(deposit.destination_chain_id.as_str(), 10)
        .map_err(|_| EvmError::InvalidChainId(deposit.destination_chain_id.to_string()))?;
    let tx_hash = deposit.identifier.tx_hash.as_bytes();

    let mut out = Vec::with_capacity(32 * 4 + EVM_ADDRESS_LEN + tx_hash.len() + 1);
    out.extend_from_slice(&padded_address(&token));
    out.extend_from_slice(&deposit.withdrawal_amount.to_be_bytes());
    out.extend_from_slice(&receiver);
    out.extend_from_slice(tx_hash);
    out.extend_from_slice(&word(U256::from(deposit.identifier.tx_nonce)));
    out.extend_from_slice(&word(chain_id));
    out.push(u8::from(deposit.is_wrapped_token));

    Ok(out)
}

/// Applies the `personal_sign` prefix to a 32-byte hash.
pub fn eth_signed_message_hash(hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(EIP191_PREFIX);
    hasher.update(hash);
    hasher.finalize().into()
}

/// The digest the signing group signs for an EVM withdrawal.
pub fn withdrawal_digest(deposit: &Deposit) -> Result<[u8; 32], EvmError> {
    let preimage = withdrawal_preimage(deposit)?;
    Ok(eth_signed_message_hash(&keccak256(&preimage)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        amount::Amount,
        chain::ChainId,
        deposit::{DepositIdentifier, WithdrawalStatus},
    };

    fn deposit() -> Deposit {
        let mut d = Deposit::invalid(DepositIdentifier::new("0xfeed", 3, ChainId::from("bitcoin")));
        d.status = WithdrawalStatus::Pending;
        d.withdrawal_token = "0x00000000000000000000000000000000000000aa".into();
        d.destination_address = "0xbeefD475A76Ec312502ba7B566a9B4CEA91ab030".into();
        d.destination_chain_id = ChainId::from("11155111");
        d.withdrawal_amount = Amount::from(1_000);
        d.is_wrapped_token = true;
        d
    }

    #[test]
    fn checksum_matches_known_vectors() {
        // vectors from EIP-55
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        ] {
            let raw = parse_address(&expected.to_lowercase()).expect("must parse");
            assert_eq!(to_checksum_address(&raw), expected);
        }
    }

    #[test]
    fn preimage_layout() {
        let d = deposit();
        let pre = withdrawal_preimage(&d).expect("must build");

        assert_eq!(pre.len(), 32 + 32 + 20 + "0xfeed".len() + 32 + 32 + 1);
        assert_eq!(pre[31], 0xaa);
        assert_eq!(&pre[62..64], &1_000u16.to_be_bytes());
        assert_eq!(&pre[84..90], b"0xfeed");
        assert_eq!(pre[90 + 31], 3);
        assert_eq!(*pre.last().expect("non-empty"), 1);
    }

    #[test]
    fn digest_depends_on_every_field() {
        let base = withdrawal_digest(&deposit()).expect("must hash");

        let mut d = deposit();
        d.is_wrapped_token = false;
        assert_ne!(withdrawal_digest(&d).expect("must hash"), base);

        let mut d = deposit();
        d.identifier.tx_nonce = 4;
        assert_ne!(withdrawal_digest(&d).expect("must hash"), base);
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let mut d = deposit();
        d.destination_address = "beef".into();
        assert!(matches!(
            withdrawal_preimage(&d),
            Err(EvmError::InvalidAddress(_))
        ));

        let mut d = deposit();
        d.destination_chain_id = ChainId::from("sepolia");
        assert!(matches!(
            withdrawal_preimage(&d),
            Err(EvmError::InvalidChainId(_))
        ));
    }
}
