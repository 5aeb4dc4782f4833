//! Destination memos attached to deposits.
//!
//! Two layouts are in use:
//!
//! - V1 is plain text: `<destination address>#<destination chain id>`. The address family is
//!   inferred from its length and validated accordingly.
//! - V2 is binary: `len(chain id) || chain id || u16be(referral id) || encoding || raw address`.
//!   The encoding byte tells how the raw address bytes are rendered as text.
//!
//! V2 memos always start with a chain id length below `0x20`, which no printable V1 memo does,
//! so [`decode`] tells them apart by their first byte.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine,
};
use thiserror::Error;

use crate::{
    chain::{ChainId, ChainType},
    evm::{parse_address, to_checksum_address},
};

const V1_SEPARATOR: char = '#';
const V2_MAX_CHAIN_ID_LEN: u8 = 0x1f;

const EVM_ADDRESS_TEXT_LEN: usize = 42;
const ZANO_ADDRESS_TEXT_LEN: usize = 71;
const TON_ADDRESS_TEXT_LEN: usize = 48;
const TON_ADDRESS_RAW_LEN: usize = 36;
const SOLANA_ADDRESS_RAW_LEN: usize = 32;

/// Errors that occur while decoding or encoding a memo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoError {
    /// The memo is empty.
    #[error("empty memo")]
    Empty,

    /// A V1 memo without the `#` separator.
    #[error("memo has no chain id separator")]
    MissingSeparator,

    /// The chain id is empty or too long.
    #[error("invalid chain id in memo")]
    InvalidChainId,

    /// A V2 memo that ends before all of its fields.
    #[error("memo is truncated")]
    Truncated,

    /// The V2 encoding byte is not known.
    #[error("unknown address encoding {0:#04x}")]
    UnknownEncoding(u8),

    /// The address does not match the encoding or family it claims.
    #[error("invalid destination address: {0}")]
    InvalidAddress(String),

    /// The memo is not valid text.
    #[error("memo is not valid utf-8")]
    NotUtf8,
}

/// How the raw address bytes of a V2 memo are rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AddressEncoding {
    /// The raw bytes are the address text.
    Utf8 = 0x01,

    /// `0x`-prefixed hex with the EIP-55 checksum.
    HexChecksum = 0x02,

    /// Base58 with the bitcoin alphabet.
    Base58 = 0x03,

    /// Standard base64 with padding.
    Base64 = 0x04,

    /// URL-safe base64 with padding.
    Base64Url = 0x05,
}

impl TryFrom<u8> for AddressEncoding {
    type Error = MemoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Utf8),
            0x02 => Ok(Self::HexChecksum),
            0x03 => Ok(Self::Base58),
            0x04 => Ok(Self::Base64),
            0x05 => Ok(Self::Base64Url),
            other => Err(MemoError::UnknownEncoding(other)),
        }
    }
}

impl AddressEncoding {
    fn render(self, raw: &[u8]) -> Result<String, MemoError> {
        Ok(match self {
            Self::Utf8 => String::from_utf8(raw.to_vec()).map_err(|_| MemoError::NotUtf8)?,
            Self::HexChecksum => {
                let raw = raw
                    .try_into()
                    .map_err(|_| MemoError::InvalidAddress(hex::encode(raw)))?;
                to_checksum_address(&raw)
            }
            Self::Base58 => bs58::encode(raw).into_string(),
            Self::Base64 => STANDARD.encode(raw),
            Self::Base64Url => URL_SAFE.encode(raw),
        })
    }

    fn parse(self, address: &str) -> Result<Vec<u8>, MemoError> {
        let invalid = || MemoError::InvalidAddress(address.to_string());

        match self {
            Self::Utf8 => Ok(address.as_bytes().to_vec()),
            Self::HexChecksum => {
                let raw = parse_address(address).map_err(|_| invalid())?;
                // only the canonical rendering survives a roundtrip
                if to_checksum_address(&raw) != address {
                    return Err(invalid());
                }
                Ok(raw.to_vec())
            }
            Self::Base58 => bs58::decode(address).into_vec().map_err(|_| invalid()),
            Self::Base64 => STANDARD.decode(address).map_err(|_| invalid()),
            Self::Base64Url => URL_SAFE.decode(address).map_err(|_| invalid()),
        }
    }
}

/// Where a deposit should be withdrawn to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationMemo {
    /// Receiver on the destination chain.
    pub address: String,

    /// The destination chain.
    pub chain_id: ChainId,

    /// Referral that brought the deposit in, zero if none.
    pub referral_id: u16,
}

/// Infers the chain family of a V1 memo address from its textual form.
pub fn infer_address_family(address: &str) -> Result<ChainType, MemoError> {
    let invalid = || MemoError::InvalidAddress(address.to_string());

    // base58 has no `0`, so a 42 character solana address never looks like an EVM one
    match address.len() {
        EVM_ADDRESS_TEXT_LEN if address.starts_with("0x") => {
            parse_address(address).map_err(|_| invalid())?;
            Ok(ChainType::Evm)
        }
        ZANO_ADDRESS_TEXT_LEN => {
            bs58::decode(address).into_vec().map_err(|_| invalid())?;
            Ok(ChainType::Zano)
        }
        TON_ADDRESS_TEXT_LEN => {
            let raw = URL_SAFE.decode(address).map_err(|_| invalid())?;
            if raw.len() != TON_ADDRESS_RAW_LEN {
                return Err(invalid());
            }
            Ok(ChainType::Ton)
        }
        _ => {
            let raw = bs58::decode(address).into_vec().map_err(|_| invalid())?;
            if raw.len() != SOLANA_ADDRESS_RAW_LEN {
                return Err(invalid());
            }
            Ok(ChainType::Solana)
        }
    }
}

/// Decodes a V1 memo.
pub fn decode_v1(memo: &str) -> Result<DestinationMemo, MemoError> {
    if memo.is_empty() {
        return Err(MemoError::Empty);
    }

    let (address, chain_id) = memo
        .rsplit_once(V1_SEPARATOR)
        .ok_or(MemoError::MissingSeparator)?;
    if chain_id.is_empty() {
        return Err(MemoError::InvalidChainId);
    }

    infer_address_family(address)?;

    Ok(DestinationMemo {
        address: address.to_string(),
        chain_id: ChainId::from(chain_id),
        referral_id: 0,
    })
}

/// Encodes a V1 memo. The referral id cannot be represented and is dropped.
pub fn encode_v1(memo: &DestinationMemo) -> String {
    format!("{}{V1_SEPARATOR}{}", memo.address, memo.chain_id)
}

/// Decodes a V2 memo, also returning the encoding its address was carried in.
pub fn decode_v2(memo: &[u8]) -> Result<(DestinationMemo, AddressEncoding), MemoError> {
    let (&chain_len, rest) = memo.split_first().ok_or(MemoError::Empty)?;
    if chain_len == 0 || chain_len > V2_MAX_CHAIN_ID_LEN {
        return Err(MemoError::InvalidChainId);
    }

    let chain_len = usize::from(chain_len);
    if rest.len() < chain_len + 3 {
        return Err(MemoError::Truncated);
    }

    let (chain_id, rest) = rest.split_at(chain_len);
    let chain_id = std::str::from_utf8(chain_id).map_err(|_| MemoError::NotUtf8)?;

    let referral_id = u16::from_be_bytes([rest[0], rest[1]]);
    let encoding = AddressEncoding::try_from(rest[2])?;
    let raw = &rest[3..];
    if raw.is_empty() {
        return Err(MemoError::Truncated);
    }

    let memo = DestinationMemo {
        address: encoding.render(raw)?,
        chain_id: ChainId::from(chain_id),
        referral_id,
    };

    Ok((memo, encoding))
}

/// Encodes a V2 memo with the address carried in `encoding`.
pub fn encode_v2(memo: &DestinationMemo, encoding: AddressEncoding) -> Result<Vec<u8>, MemoError> {
    let chain_id = memo.chain_id.as_str().as_bytes();
    let chain_len = u8::try_from(chain_id.len())
        .ok()
        .filter(|len| (1..=V2_MAX_CHAIN_ID_LEN).contains(len))
        .ok_or(MemoError::InvalidChainId)?;

    let raw = encoding.parse(&memo.address)?;
    if raw.is_empty() {
        return Err(MemoError::InvalidAddress(memo.address.clone()));
    }

    let mut out = Vec::with_capacity(1 + chain_id.len() + 3 + raw.len());
    out.push(chain_len);
    out.extend_from_slice(chain_id);
    out.extend_from_slice(&memo.referral_id.to_be_bytes());
    out.push(encoding as u8);
    out.extend_from_slice(&raw);

    Ok(out)
}

/// Decodes a memo of either version.
pub fn decode(memo: &[u8]) -> Result<DestinationMemo, MemoError> {
    match memo.first() {
        None => Err(MemoError::Empty),
        Some(&b) if b <= V2_MAX_CHAIN_ID_LEN => decode_v2(memo).map(|(m, _)| m),
        Some(_) => {
            let text = std::str::from_utf8(memo).map_err(|_| MemoError::NotUtf8)?;
            decode_v1(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const EVM_ADDR: &str = "0xbeefD475A76Ec312502ba7B566a9B4CEA91ab030";

    #[test]
    fn decodes_v1_evm_memo() {
        let memo = format!("{EVM_ADDR}#123");
        let decoded = decode(memo.as_bytes()).expect("must decode");

        assert_eq!(
            decoded,
            DestinationMemo {
                address: EVM_ADDR.to_string(),
                chain_id: ChainId::from("123"),
                referral_id: 0,
            }
        );
        assert_eq!(encode_v1(&decoded), memo);
    }

    #[test]
    fn decodes_v2_base58_memo() {
        let raw: Vec<u8> = (0u8..69).collect();
        let mut memo = vec![0x01, b'2', 0x00, 0x03, 0x03];
        memo.extend_from_slice(&raw);

        let decoded = decode(&memo).expect("must decode");
        assert_eq!(decoded.chain_id, ChainId::from("2"));
        assert_eq!(decoded.referral_id, 3);
        assert_eq!(decoded.address, bs58::encode(&raw).into_string());

        let reencoded = encode_v2(&decoded, AddressEncoding::Base58).expect("must encode");
        assert_eq!(reencoded, memo);
    }

    #[test]
    fn v1_infers_address_families() {
        let ton = URL_SAFE.encode([7u8; TON_ADDRESS_RAW_LEN]);
        assert_eq!(ton.len(), TON_ADDRESS_TEXT_LEN);
        assert_eq!(infer_address_family(&ton), Ok(ChainType::Ton));

        let sol = bs58::encode([9u8; 32]).into_string();
        assert_eq!(infer_address_family(&sol), Ok(ChainType::Solana));

        // 42 characters, like an EVM address
        let mut raw = [0xffu8; 32];
        raw[..5].fill(0);
        let short_sol = bs58::encode(raw).into_string();
        assert_eq!(short_sol.len(), EVM_ADDRESS_TEXT_LEN);
        assert_eq!(infer_address_family(&short_sol), Ok(ChainType::Solana));

        assert_eq!(infer_address_family(EVM_ADDR), Ok(ChainType::Evm));

        assert!(infer_address_family("not-an-address").is_err());
        assert!(infer_address_family("0xZZefD475A76Ec312502ba7B566a9B4CEA91ab030").is_err());
    }

    #[test]
    fn malformed_memos_are_rejected() {
        assert_eq!(decode(b""), Err(MemoError::Empty));
        assert_eq!(decode_v1(EVM_ADDR), Err(MemoError::MissingSeparator));
        assert_eq!(
            decode_v1(&format!("{EVM_ADDR}#")),
            Err(MemoError::InvalidChainId)
        );
        assert_eq!(decode(&[0x01, b'2', 0x00]), Err(MemoError::Truncated));
        assert_eq!(
            decode(&[0x01, b'2', 0x00, 0x00, 0x09, 0xaa]),
            Err(MemoError::UnknownEncoding(0x09))
        );
        assert_eq!(decode(&[0x00, 0x01]), Err(MemoError::InvalidChainId));
    }

    #[test]
    fn hex_checksum_requires_canonical_case() {
        let lower = DestinationMemo {
            address: EVM_ADDR.to_lowercase(),
            chain_id: ChainId::from("1"),
            referral_id: 0,
        };
        assert!(encode_v2(&lower, AddressEncoding::HexChecksum).is_err());

        let raw = parse_address(&lower.address).expect("must parse");
        let canonical = DestinationMemo {
            address: to_checksum_address(&raw),
            ..lower
        };
        let bytes = encode_v2(&canonical, AddressEncoding::HexChecksum).expect("must encode");
        assert_eq!(decode(&bytes), Ok(canonical));
    }

    fn encoding() -> impl Strategy<Value = AddressEncoding> {
        prop_oneof![
            Just(AddressEncoding::Utf8),
            Just(AddressEncoding::HexChecksum),
            Just(AddressEncoding::Base58),
            Just(AddressEncoding::Base64),
            Just(AddressEncoding::Base64Url),
        ]
    }

    /// V1 addresses of every family the length rule tells apart.
    fn v1_address() -> impl Strategy<Value = (String, ChainType)> {
        prop_oneof![
            any::<[u8; 20]>().prop_map(|raw| (to_checksum_address(&raw), ChainType::Evm)),
            proptest::collection::vec(any::<u8>(), TON_ADDRESS_RAW_LEN)
                .prop_map(|raw| (URL_SAFE.encode(raw), ChainType::Ton)),
            any::<[u8; SOLANA_ADDRESS_RAW_LEN]>()
                .prop_map(|raw| (bs58::encode(raw).into_string(), ChainType::Solana)),
        ]
    }

    proptest! {
        #[test]
        fn v1_decode_then_encode_is_identity(
            (address, family) in v1_address(),
            chain in "[0-9a-z]{1,31}",
        ) {
            prop_assert_eq!(infer_address_family(&address), Ok(family));

            let memo = format!("{address}#{chain}");
            let decoded = decode(memo.as_bytes()).expect("must decode");
            prop_assert_eq!(&decoded.address, &address);
            prop_assert_eq!(decoded.chain_id.clone(), ChainId::from(chain.as_str()));
            prop_assert_eq!(decoded.referral_id, 0);
            prop_assert_eq!(encode_v1(&decoded), memo);
        }

        #[test]
        fn v2_decode_then_encode_is_identity(
            enc in encoding(),
            chain in "[0-9a-z]{1,31}",
            referral in any::<u16>(),
            raw in proptest::collection::vec(any::<u8>(), 1..64),
        ) {
            let raw = match enc {
                AddressEncoding::HexChecksum => raw.iter().cycle().take(20).copied().collect(),
                AddressEncoding::Utf8 => hex::encode(&raw).into_bytes(),
                _ => raw,
            };

            let mut memo = vec![chain.len() as u8];
            memo.extend_from_slice(chain.as_bytes());
            memo.extend_from_slice(&referral.to_be_bytes());
            memo.push(enc as u8);
            memo.extend_from_slice(&raw);

            let (decoded, decoded_enc) = decode_v2(&memo).expect("must decode");
            prop_assert_eq!(decoded_enc, enc);
            prop_assert_eq!(encode_v2(&decoded, enc).expect("must encode"), memo);
        }
    }
}
